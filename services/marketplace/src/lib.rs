//! Mphakathi Online marketplace service
//!
//! Members post problems, approved providers quote on them, and the requester
//! accepts one quote, which closes the problem and rejects the competing
//! quotes in a single transaction.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod validation;
pub mod webhook;

pub use routes::create_router;
pub use state::AppState;
