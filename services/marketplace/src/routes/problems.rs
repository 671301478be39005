//! Problem handlers

use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::{auth::Principal, error::ApiResult, models::CreateProblemRequest, state::AppState};

/// Approved problems, newest first
pub async fn list_public_problems(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.problems.list_public_problems().await?))
}

pub async fn get_public_problem(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(state.problems.get_public_problem(id).await?))
}

/// Post a new problem
pub async fn create_problem(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateProblemRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let problem = state.problems.create_problem(&principal, request).await?;

    Ok((StatusCode::CREATED, Json(problem)))
}

pub async fn list_my_problems(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.problems.list_problems_by_requester(&principal).await?))
}

pub async fn delete_problem(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    state.problems.delete_problem(&principal, id).await?;

    Ok(Json(json!({ "message": "Problem deleted successfully" })))
}

pub async fn resolve_problem(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(state.problems.mark_resolved(&principal, id).await?))
}

pub async fn approve_problem(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(state.problems.approve_problem(&principal, id).await?))
}

/// Moderation queue
pub async fn list_pending_problems(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.problems.list_pending_problems(&principal).await?))
}
