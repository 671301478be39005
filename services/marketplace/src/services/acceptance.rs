//! Quote acceptance workflow
//!
//! Accepting a quote is the one operation that changes several rows at once:
//! the chosen quote becomes accepted, every other pending quote on the problem
//! is rejected and the problem closes with a reference to the accepted quote.
//!
//! The workflow checks ownership and state up front so callers get precise
//! errors, then hands over to [`MarketplaceStore::accept_quote`], which
//! re-runs the state checks against locked rows and applies all writes in one
//! transaction. Two requests racing on the same problem therefore cannot both
//! succeed: the loser sees a closed problem and gets `InvalidState`.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::Principal,
    error::{ApiError, ApiResult},
    models::Acceptance,
    store::{MarketplaceStore, problem_not_found, quote_not_found},
};

#[derive(Clone)]
pub struct AcceptanceWorkflow {
    store: Arc<dyn MarketplaceStore>,
}

impl AcceptanceWorkflow {
    pub fn new(store: Arc<dyn MarketplaceStore>) -> Self {
        Self { store }
    }

    pub async fn accept_quote(
        &self,
        principal: &Principal,
        problem_id: Uuid,
        quote_id: Uuid,
    ) -> ApiResult<Acceptance> {
        let problem = self
            .store
            .find_problem(problem_id)
            .await?
            .ok_or_else(problem_not_found)?;

        // Ownership first: a non-owner learns nothing about the problem's state
        if !problem.is_owned_by(principal.user_id()) {
            return Err(ApiError::Forbidden(
                "Only the requester can accept quotes on this problem".to_string(),
            ));
        }

        problem.ensure_open()?;

        let quote = self
            .store
            .find_quote(quote_id)
            .await?
            .filter(|q| q.problem_id == problem_id)
            .ok_or_else(quote_not_found)?;
        quote.ensure_pending()?;

        match self.store.accept_quote(problem_id, quote_id).await {
            Ok(acceptance) => {
                info!(
                    "Quote {} accepted on problem {} by {}",
                    quote_id,
                    problem_id,
                    principal.user_id()
                );
                Ok(acceptance)
            }
            Err(e) => {
                warn!(
                    "Acceptance of quote {} on problem {} failed: {}",
                    quote_id, problem_id, e
                );
                Err(e)
            }
        }
    }
}
