use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// UserId extractor for invoicing-service
///
/// Extracts user_id from the X-User-ID header sent by the authenticated
/// frontend gateway. The gateway validates the session before forwarding,
/// so a missing or malformed header means the request skipped it.
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header"))
            })?;

        let user_id = Uuid::parse_str(raw).map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("X-User-ID header is not a valid UUID"))
        })?;

        // Add to tracing span for observability
        tracing::Span::current().record("user_id", raw);

        Ok(UserId(user_id))
    }
}
