use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use service_core::error::AppError;
use tracing::instrument;
use validator::Validate;

use crate::cfdi;
use crate::dtos::FiscalDataDto;
use crate::middleware::UserId;
use crate::models::FiscalProfile;
use crate::startup::AppState;

#[instrument(skip(state, fiscal), fields(user_id = %user_id.0))]
pub async fn save_fiscal_data(
    State(state): State<AppState>,
    user_id: UserId,
    Json(fiscal): Json<FiscalDataDto>,
) -> Result<impl IntoResponse, AppError> {
    fiscal.validate()?;
    let rfc = fiscal.rfc.trim().to_uppercase();
    cfdi::validate_rfc(&rfc)?;

    let profile = FiscalProfile {
        user_id: user_id.0,
        rfc,
        razon_social: fiscal.razon_social,
        regimen_fiscal: fiscal.regimen_fiscal,
        uso_cfdi: fiscal.uso_cfdi,
        codigo_postal: fiscal.codigo_postal,
        calle: fiscal.calle,
        numero_exterior: fiscal.numero_exterior,
        numero_interior: fiscal.numero_interior,
        colonia: fiscal.colonia,
        municipio: fiscal.municipio,
        estado: fiscal.estado,
        pais: fiscal.pais.unwrap_or_else(|| "México".to_string()),
        updated_utc: Utc::now(),
    };

    let saved = state.db.upsert_fiscal_profile(&profile).await?;
    Ok(Json(saved))
}

#[instrument(skip(state), fields(user_id = %user_id.0))]
pub async fn get_fiscal_data(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .db
        .get_fiscal_profile(user_id.0)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No fiscal data saved yet")))?;
    Ok(Json(profile))
}
