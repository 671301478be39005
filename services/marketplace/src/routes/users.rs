//! Profile and user administration handlers

use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    response::IntoResponse,
};

use crate::{auth::Principal, error::ApiResult, models::UpdateProfileRequest, state::AppState};

/// The caller's stored profile
pub async fn current_profile(Extension(principal): Extension<Principal>) -> impl IntoResponse {
    Json(principal.profile)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;

    Ok(Json(state.users.update_profile(&principal, request).await?))
}

pub async fn list_pending_providers(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.users.list_pending_providers(&principal).await?))
}

pub async fn approve_provider(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(
        state.users.set_provider_approval(&principal, &id, true).await?,
    ))
}

pub async fn revoke_provider(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(
        state.users.set_provider_approval(&principal, &id, false).await?,
    ))
}

/// Soft delete
pub async fn deactivate_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    Ok(Json(state.users.deactivate_user(&principal, &id).await?))
}
