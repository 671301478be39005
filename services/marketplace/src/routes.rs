//! HTTP routes for the marketplace service

use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    middleware::{auth_middleware, preflight_no_content},
    state::AppState,
};

mod problems;
mod quotes;
mod users;
mod webhooks;

/// Create the router for the marketplace service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/problems", post(problems::create_problem))
        .route("/problems/mine", get(problems::list_my_problems))
        .route("/problems/:id", delete(problems::delete_problem))
        .route("/problems/:id/resolve", post(problems::resolve_problem))
        .route("/problems/:id/approve", post(problems::approve_problem))
        .route("/problems/:id/quotes", post(quotes::submit_quote))
        .route(
            "/problems/:id/quotes/:quote_id/accept",
            post(quotes::accept_quote).put(quotes::accept_quote),
        )
        .route("/quotes/mine", get(quotes::list_my_quotes))
        .route("/quotes/:id", delete(quotes::withdraw_quote))
        .route("/me", get(users::current_profile).put(users::update_profile))
        .route("/admin/problems/pending", get(problems::list_pending_problems))
        .route("/admin/providers/pending", get(users::list_pending_providers))
        .route("/admin/providers/:id/approve", post(users::approve_provider))
        .route("/admin/providers/:id/revoke", post(users::revoke_provider))
        .route("/admin/users/:id", delete(users::deactivate_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/problems", get(problems::list_public_problems))
        .route("/problems/:id", get(problems::get_public_problem))
        .route("/problems/:id/quotes", get(quotes::list_quotes_for_problem))
        .route("/webhooks/payments", post(webhooks::payment_webhook));

    public_routes
        .merge(protected_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(middleware::from_fn(preflight_no_content))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "marketplace"
    }))
}
