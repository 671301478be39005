//! Payment provider webhook

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use serde_json::json;

use crate::{error::ApiResult, state::AppState, webhook::SIGNATURE_HEADER};

/// Signed with HMAC-SHA512 over the raw body, so the body is taken as bytes
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let updated = state.payments.handle_webhook(signature, &body).await?;

    Ok(Json(json!({
        "received": true,
        "membership_updated": updated.is_some(),
    })))
}
