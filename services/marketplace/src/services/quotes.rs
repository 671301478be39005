//! Quote submission, listing and withdrawal

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    auth::Principal,
    error::{ApiError, ApiResult},
    models::{ProviderQuote, Quote, SubmitQuoteRequest},
    store::{MarketplaceStore, problem_not_found, quote_not_found},
};

#[derive(Clone)]
pub struct QuoteService {
    store: Arc<dyn MarketplaceStore>,
}

impl QuoteService {
    pub fn new(store: Arc<dyn MarketplaceStore>) -> Self {
        Self { store }
    }

    /// Submit a quote as an approved provider. The open and duplicate checks
    /// are repeated by the store when inserting.
    pub async fn submit_quote(
        &self,
        principal: &Principal,
        problem_id: Uuid,
        request: SubmitQuoteRequest,
    ) -> ApiResult<Quote> {
        let new_quote = request.validate()?;

        if !principal.profile.can_submit_quotes() {
            return Err(ApiError::Forbidden(
                "Only approved providers can submit quotes".to_string(),
            ));
        }

        self.store
            .find_problem(problem_id)
            .await?
            .ok_or_else(problem_not_found)?
            .ensure_open()?;

        let quote = self
            .store
            .insert_quote(principal.user_id(), problem_id, &new_quote)
            .await?;

        info!(
            "Quote {} submitted on problem {} by {}",
            quote.id, problem_id, quote.provider_id
        );
        Ok(quote)
    }

    pub async fn list_quotes_for_problem(&self, problem_id: Uuid) -> ApiResult<Vec<Quote>> {
        self.store.list_quotes_for_problem(problem_id).await
    }

    pub async fn list_quotes_by_provider(
        &self,
        principal: &Principal,
    ) -> ApiResult<Vec<ProviderQuote>> {
        self.store.list_quotes_by_provider(principal.user_id()).await
    }

    /// pending → withdrawn while the problem is open. The row is kept.
    pub async fn withdraw_quote(&self, principal: &Principal, quote_id: Uuid) -> ApiResult<Quote> {
        let quote = self
            .store
            .find_quote(quote_id)
            .await?
            .ok_or_else(quote_not_found)?;

        if quote.provider_id != principal.user_id() {
            return Err(ApiError::Forbidden(
                "Only the submitting provider can withdraw this quote".to_string(),
            ));
        }

        let quote = self.store.withdraw_quote(quote_id).await?;
        info!("Quote {} withdrawn", quote.id);
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{QuoteStatus, Role},
        services::{
            AcceptanceWorkflow, ProblemService,
            fixtures::{principal, problem_request, quote_request, stores},
        },
    };

    #[tokio::test]
    async fn unapproved_provider_is_forbidden_and_nothing_is_stored() {
        let (memory, store) = stores();
        let problems = ProblemService::new(store.clone());
        let quotes = QuoteService::new(store);
        let owner = principal(&memory, "owner", Role::Member, false).await;
        let pending = principal(&memory, "pending", Role::Provider, false).await;
        let member = principal(&memory, "m2", Role::Member, false).await;

        let problem = problems.create_problem(&owner, problem_request("Tap")).await.unwrap();

        for caller in [&pending, &member] {
            assert!(matches!(
                quotes.submit_quote(caller, problem.id, quote_request(100.0)).await,
                Err(ApiError::Forbidden(_))
            ));
        }
        assert_eq!(memory.quote_count().await, 0);
    }

    #[tokio::test]
    async fn submission_failures() {
        let (memory, store) = stores();
        let problems = ProblemService::new(store.clone());
        let quotes = QuoteService::new(store);
        let owner = principal(&memory, "owner", Role::Member, false).await;
        let provider = principal(&memory, "prov", Role::Provider, true).await;
        let problem = problems.create_problem(&owner, problem_request("Tap")).await.unwrap();

        assert!(matches!(
            quotes.submit_quote(&provider, problem.id, quote_request(0.0)).await,
            Err(ApiError::Validation(_))
        ));

        assert!(matches!(
            quotes.submit_quote(&provider, Uuid::new_v4(), quote_request(10.0)).await,
            Err(ApiError::NotFound(_))
        ));

        let quote = quotes
            .submit_quote(&provider, problem.id, quote_request(120.0))
            .await
            .unwrap();
        assert_eq!(quote.status, QuoteStatus::Pending);

        assert!(matches!(
            quotes.submit_quote(&provider, problem.id, quote_request(110.0)).await,
            Err(ApiError::Conflict(_))
        ));
        assert_eq!(memory.quote_count().await, 1);
    }

    #[tokio::test]
    async fn provider_may_quote_again_after_withdrawing() {
        let (memory, store) = stores();
        let problems = ProblemService::new(store.clone());
        let quotes = QuoteService::new(store);
        let owner = principal(&memory, "owner", Role::Member, false).await;
        let provider = principal(&memory, "prov", Role::Provider, true).await;
        let problem = problems.create_problem(&owner, problem_request("Tap")).await.unwrap();

        let first = quotes
            .submit_quote(&provider, problem.id, quote_request(120.0))
            .await
            .unwrap();
        quotes.withdraw_quote(&provider, first.id).await.unwrap();

        let second = quotes
            .submit_quote(&provider, problem.id, quote_request(100.0))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);

        let listed = quotes.list_quotes_for_problem(problem.id).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|q| q.id).collect();
        assert_eq!(ids, [first.id, second.id]);
        assert_eq!(listed[0].status, QuoteStatus::Withdrawn);

        let mine = quotes.list_quotes_by_provider(&provider).await.unwrap();
        assert_eq!(mine[0].quote.id, second.id);
        assert_eq!(mine[0].problem_title, "Tap");
    }

    #[tokio::test]
    async fn withdraw_rules() {
        let (memory, store) = stores();
        let problems = ProblemService::new(store.clone());
        let quotes = QuoteService::new(store.clone());
        let acceptance = AcceptanceWorkflow::new(store);
        let owner = principal(&memory, "owner", Role::Member, false).await;
        let a = principal(&memory, "prov-a", Role::Provider, true).await;
        let b = principal(&memory, "prov-b", Role::Provider, true).await;
        let problem = problems.create_problem(&owner, problem_request("Wall")).await.unwrap();

        let quote_a = quotes.submit_quote(&a, problem.id, quote_request(50.0)).await.unwrap();
        let quote_b = quotes.submit_quote(&b, problem.id, quote_request(60.0)).await.unwrap();

        assert!(matches!(
            quotes.withdraw_quote(&b, quote_a.id).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            quotes.withdraw_quote(&a, Uuid::new_v4()).await,
            Err(ApiError::NotFound(_))
        ));

        let withdrawn = quotes.withdraw_quote(&a, quote_a.id).await.unwrap();
        assert_eq!(withdrawn.status, QuoteStatus::Withdrawn);
        assert!(matches!(
            quotes.withdraw_quote(&a, quote_a.id).await,
            Err(ApiError::InvalidState(_))
        ));

        acceptance.accept_quote(&owner, problem.id, quote_b.id).await.unwrap();

        // accepted quote on a closed problem
        let before = memory.find_quote(quote_b.id).await.unwrap().unwrap();
        assert!(matches!(
            quotes.withdraw_quote(&b, quote_b.id).await,
            Err(ApiError::InvalidState(_))
        ));
        let after = memory.find_quote(quote_b.id).await.unwrap().unwrap();
        assert_eq!(before.status, after.status);
        assert_eq!(before.updated_at, after.updated_at);
    }

    #[tokio::test]
    async fn closed_problem_refuses_new_quotes() {
        let (memory, store) = stores();
        let problems = ProblemService::new(store.clone());
        let quotes = QuoteService::new(store.clone());
        let acceptance = AcceptanceWorkflow::new(store);
        let owner = principal(&memory, "owner", Role::Member, false).await;
        let a = principal(&memory, "prov-a", Role::Provider, true).await;
        let b = principal(&memory, "prov-b", Role::Provider, true).await;
        let problem = problems.create_problem(&owner, problem_request("Gate")).await.unwrap();

        let quote_a = quotes.submit_quote(&a, problem.id, quote_request(50.0)).await.unwrap();
        acceptance.accept_quote(&owner, problem.id, quote_a.id).await.unwrap();

        assert!(matches!(
            quotes.submit_quote(&b, problem.id, quote_request(40.0)).await,
            Err(ApiError::InvalidState(_))
        ));
        assert_eq!(memory.quote_count().await, 1);
    }
}
