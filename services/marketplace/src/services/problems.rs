//! Problem posting, moderation and lifecycle

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    auth::Principal,
    error::{ApiError, ApiResult},
    models::{CreateProblemRequest, Problem},
    store::{MarketplaceStore, ProblemFilter, problem_not_found},
};

#[derive(Clone)]
pub struct ProblemService {
    store: Arc<dyn MarketplaceStore>,
}

impl ProblemService {
    pub fn new(store: Arc<dyn MarketplaceStore>) -> Self {
        Self { store }
    }

    /// Post a problem. It stays invisible publicly until an admin approves it.
    pub async fn create_problem(
        &self,
        principal: &Principal,
        request: CreateProblemRequest,
    ) -> ApiResult<Problem> {
        let new_problem = request.validate()?;
        let problem = self
            .store
            .insert_problem(principal.user_id(), &new_problem)
            .await?;

        info!("Problem {} posted by {}", problem.id, problem.requester_id);
        Ok(problem)
    }

    pub async fn list_public_problems(&self) -> ApiResult<Vec<Problem>> {
        self.store.list_problems(&ProblemFilter::Approved).await
    }

    pub async fn list_problems_by_requester(&self, principal: &Principal) -> ApiResult<Vec<Problem>> {
        self.store
            .list_problems(&ProblemFilter::ByRequester(principal.user_id().to_string()))
            .await
    }

    /// Unapproved problems are reported as missing
    pub async fn get_public_problem(&self, problem_id: Uuid) -> ApiResult<Problem> {
        self.store
            .find_problem(problem_id)
            .await?
            .filter(|p| p.approved)
            .ok_or_else(problem_not_found)
    }

    pub async fn list_pending_problems(&self, principal: &Principal) -> ApiResult<Vec<Problem>> {
        principal.require_admin()?;
        self.store.list_problems(&ProblemFilter::PendingApproval).await
    }

    pub async fn approve_problem(&self, principal: &Principal, problem_id: Uuid) -> ApiResult<Problem> {
        principal.require_admin()?;

        let problem = self
            .store
            .set_problem_approval(problem_id, true)
            .await?
            .ok_or_else(problem_not_found)?;

        info!("Problem {} approved by {}", problem.id, principal.user_id());
        Ok(problem)
    }

    /// Owners may delete while the problem is open; admins at any status.
    /// Quotes go with the problem.
    pub async fn delete_problem(&self, principal: &Principal, problem_id: Uuid) -> ApiResult<()> {
        let problem = self
            .store
            .find_problem(problem_id)
            .await?
            .ok_or_else(problem_not_found)?;

        let require_open = if principal.is_admin() {
            false
        } else if problem.is_owned_by(principal.user_id()) {
            true
        } else {
            return Err(ApiError::Forbidden(
                "Only the requester or an administrator can delete this problem".to_string(),
            ));
        };

        self.store.delete_problem(problem_id, require_open).await?;
        info!("Problem {} deleted by {}", problem_id, principal.user_id());
        Ok(())
    }

    /// closed → resolved, by the requester
    pub async fn mark_resolved(&self, principal: &Principal, problem_id: Uuid) -> ApiResult<Problem> {
        let problem = self
            .store
            .find_problem(problem_id)
            .await?
            .ok_or_else(problem_not_found)?;

        if !problem.is_owned_by(principal.user_id()) {
            return Err(ApiError::Forbidden(
                "Only the requester can resolve this problem".to_string(),
            ));
        }

        let problem = self.store.resolve_problem(problem_id).await?;
        info!("Problem {} resolved", problem.id);
        Ok(problem)
    }
}
