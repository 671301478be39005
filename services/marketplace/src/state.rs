//! Application state shared across handlers

use std::sync::Arc;

use crate::{
    auth::TokenVerifier,
    services::{AcceptanceWorkflow, PaymentService, ProblemService, QuoteService, UserService},
    store::MarketplaceStore,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub users: UserService,
    pub problems: ProblemService,
    pub quotes: QuoteService,
    pub acceptance: AcceptanceWorkflow,
    pub payments: PaymentService,
}

impl AppState {
    /// Wire every service to the same store
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        verifier: TokenVerifier,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            verifier: Arc::new(verifier),
            users: UserService::new(store.clone()),
            problems: ProblemService::new(store.clone()),
            quotes: QuoteService::new(store.clone()),
            acceptance: AcceptanceWorkflow::new(store.clone()),
            payments: PaymentService::new(store, webhook_secret),
        }
    }
}
