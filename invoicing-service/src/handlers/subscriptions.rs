use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{RecordSubscriptionRequest, SubscriptionSummary};
use crate::middleware::UserId;
use crate::models::{Subscription, SubscriptionStatus};
use crate::startup::AppState;

/// Records a completed payment as an invoiceable subscription. Called by
/// the payment flow once the charge settles.
#[instrument(skip(state, request), fields(user_id = %user_id.0))]
pub async fn record_subscription(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<RecordSubscriptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let plan_price = Decimal::try_from(request.amount)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid amount: {}", e)))?;

    let subscription = Subscription {
        subscription_id: Uuid::new_v4(),
        user_id: user_id.0,
        invoice_number: request.invoice_number,
        plan_name: request.plan_name,
        plan_price,
        price_includes_tax: request.price_includes_tax.unwrap_or(true),
        payment_method: request.payment_method,
        payment_reference: request.payment_reference,
        status: SubscriptionStatus::Active.as_str().to_string(),
        invoice_issued: false,
        created_utc: Utc::now(),
    };

    let saved = state.db.create_subscription(&subscription).await?;
    Ok((StatusCode::CREATED, Json(SubscriptionSummary::from(saved))))
}
