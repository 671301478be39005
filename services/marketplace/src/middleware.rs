//! Request middleware: bearer authentication and CORS preflight responses

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::warn;

use crate::{auth::Principal, error::ApiError, state::AppState};

/// Authentication middleware for protected routes.
///
/// Verifies the bearer token, loads (or creates) the caller's profile and
/// stores the resulting [`Principal`] in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;

    let identity = state
        .verifier
        .verify(bearer.token())
        .ok_or(ApiError::Unauthorized)?;

    let profile = state.users.ensure_profile(&identity).await?;
    if profile.deactivated {
        warn!("Deactivated user {} attempted {}", profile.id, req.uri().path());
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    req.extensions_mut().insert(Principal { identity, profile });

    Ok(next.run(req).await)
}

/// Answer every `OPTIONS` request with `204 No Content`, keeping the CORS headers
pub async fn preflight_no_content(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }

    let (mut parts, _) = next.run(req).await.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_TYPE);
    Response::from_parts(parts, Body::empty())
}
