//! Quote handlers, including quote acceptance

use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{auth::Principal, error::ApiResult, models::SubmitQuoteRequest, state::AppState};

/// Quotes on a problem, oldest first
pub async fn list_quotes_for_problem(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(state.quotes.list_quotes_for_problem(id).await?))
}

pub async fn submit_quote(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SubmitQuoteRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let Json(request) = payload?;
    let quote = state.quotes.submit_quote(&principal, id, request).await?;

    Ok((StatusCode::CREATED, Json(quote)))
}

/// Mounted on both PUT and POST
pub async fn accept_quote(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path((problem_id, quote_id)) = path?;
    let acceptance = state
        .acceptance
        .accept_quote(&principal, problem_id, quote_id)
        .await?;

    Ok(Json(acceptance))
}

pub async fn list_my_quotes(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.quotes.list_quotes_by_provider(&principal).await?))
}

pub async fn withdraw_quote(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(state.quotes.withdraw_quote(&principal, id).await?))
}
