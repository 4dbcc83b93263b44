//! Invoice endpoints: issuance, folio validation, listing, public
//! verification and artifact download.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    GenerateInvoiceRequest, InvoiceResponse, ValidateFolioRequest, ValidateFolioResponse,
    VerificationResponse, VerifiedInvoice,
};
use crate::middleware::UserId;
use crate::startup::AppState;

#[instrument(skip(state, request), fields(user_id = %user_id.0))]
pub async fn generate_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<GenerateInvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let invoice = state
        .issuer
        .issue_for_subscription(user_id.0, &request.invoice_number, &request.fiscal_data)
        .await?;

    Ok((StatusCode::CREATED, Json(InvoiceResponse::from(invoice))))
}

/// Pre-flight check the frontend runs before showing the fiscal data form.
#[instrument(skip(state, request), fields(user_id = %user_id.0))]
pub async fn validate_folio(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<ValidateFolioRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let subscription = state
        .db
        .get_subscription_by_invoice_number(&request.invoice_number)
        .await?;

    let response = match subscription {
        Some(s) if s.user_id == user_id.0 => ValidateFolioResponse {
            valid: true,
            already_invoiced: s.invoice_issued,
            plan_name: Some(s.plan_name),
            amount: Some(s.plan_price),
        },
        // A token that exists but belongs to someone else reads as invalid,
        // not forbidden, so the endpoint leaks nothing.
        _ => ValidateFolioResponse {
            valid: false,
            already_invoiced: false,
            plan_name: None,
            amount: None,
        },
    };

    Ok(Json(response))
}

#[instrument(skip(state), fields(user_id = %user_id.0))]
pub async fn list_invoices(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    let invoices = state.db.list_invoices_for_user(user_id.0).await?;
    let response: Vec<InvoiceResponse> = invoices.into_iter().map(InvoiceResponse::from).collect();
    Ok(Json(response))
}

/// Public verification endpoint behind the QR code. Unknown or malformed
/// UUIDs answer `found: false` rather than an error, since this URL is
/// typed or scanned by hand.
#[instrument(skip(state))]
pub async fn verify_invoice(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let fiscal_uuid = match Uuid::parse_str(uuid.trim()) {
        Ok(u) => u,
        Err(_) => {
            return Ok(Json(VerificationResponse {
                found: false,
                invoice: None,
            }))
        }
    };

    let invoice = state.db.get_invoice_by_uuid(fiscal_uuid).await?;
    Ok(Json(VerificationResponse {
        found: invoice.is_some(),
        invoice: invoice.map(VerifiedInvoice::from),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub name: String,
}

/// Public like the verify page that links here; the folio must resolve to
/// an issued invoice before any storage read happens.
#[instrument(skip(state))]
pub async fn download_artifact(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, AppError> {
    let key = normalize_artifact_name(&query.name)?;
    let folio = folio_from_key(&key)?;

    state
        .db
        .get_invoice_by_folio(&folio)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Artifact not found: {}", key)))?;

    let object = state.storage.get(&key).await?;
    let content_type = object
        .content_type
        .unwrap_or_else(|| content_type_for(&key).to_string());
    let filename = key.rsplit('/').next().unwrap_or(&key).to_string();

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        object.bytes,
    ))
}

/// Accepts a bare key (`invoices/000001.pdf`) or a full artifact URL and
/// reduces it to the storage key.
fn normalize_artifact_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    let key = if let Some((_, rest)) = name.split_once("/invoices/") {
        format!("invoices/{}", rest)
    } else if name.starts_with("invoices/") {
        name.to_string()
    } else {
        format!("invoices/{}", name)
    };

    if key.split('/').any(|seg| seg == ".." || seg.is_empty()) || key.contains('?') {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid artifact name: {}",
            name
        )));
    }
    Ok(key)
}

fn folio_from_key(key: &str) -> Result<String, AppError> {
    let file = key.rsplit('/').next().unwrap_or(key);
    let folio = file
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file);
    if folio.is_empty() || !folio.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid artifact name: {}",
            key
        )));
    }
    Ok(folio.to_string())
}

fn content_type_for(key: &str) -> &'static str {
    if key.ends_with(".xml") {
        "application/xml"
    } else if key.ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_and_prefixed_names() {
        assert_eq!(
            normalize_artifact_name("000001.pdf").unwrap(),
            "invoices/000001.pdf"
        );
        assert_eq!(
            normalize_artifact_name("invoices/000001.xml").unwrap(),
            "invoices/000001.xml"
        );
    }

    #[test]
    fn normalizes_full_urls() {
        assert_eq!(
            normalize_artifact_name("https://bucket.s3.us-east-1.amazonaws.com/invoices/000042.pdf")
                .unwrap(),
            "invoices/000042.pdf"
        );
    }

    #[test]
    fn rejects_traversal_attempts() {
        assert!(normalize_artifact_name("../etc/passwd").is_err());
        assert!(normalize_artifact_name("invoices/../../secret").is_err());
    }

    #[test]
    fn extracts_folio_from_key() {
        assert_eq!(folio_from_key("invoices/000042.pdf").unwrap(), "000042");
        assert!(folio_from_key("invoices/evil.pdf").is_err());
    }

    #[test]
    fn content_type_falls_back_by_extension() {
        assert_eq!(content_type_for("invoices/1.xml"), "application/xml");
        assert_eq!(content_type_for("invoices/1.pdf"), "application/pdf");
        assert_eq!(content_type_for("invoices/1.bin"), "application/octet-stream");
    }
}
