//! In-memory backend
//!
//! Holds all rows behind one async mutex, so every operation is serialized.
//! Multi-row operations stage their writes on a copy of the state and swap it
//! in only when every step succeeded, which gives them the all-or-nothing
//! behaviour of a database transaction. A [`FaultPoint`] can be armed to fail
//! the acceptance workflow midway.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    MarketplaceStore, MemberLookup, ProblemFilter, check_acceptable, check_withdrawable,
    duplicate_quote, not_resolvable, problem_not_found, quote_not_found,
};
use crate::{
    error::{ApiError, ApiResult},
    models::{
        Acceptance, NewProblem, NewQuote, NewUser, Problem, ProblemStatus, ProviderQuote, Quote,
        QuoteStatus, Role, UpdateUser, User,
    },
};

/// Steps of the acceptance workflow at which a failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// After the target quote is marked accepted
    AfterQuoteAccepted,
    /// After competing quotes are rejected, before the problem is closed
    AfterCompetitorsRejected,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<User>,
    /// Insertion order doubles as creation order
    problems: Vec<Problem>,
    quotes: Vec<Quote>,
}

impl MemoryState {
    fn user_mut(&mut self, id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    fn problem(&self, id: Uuid) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }

    fn problem_mut(&mut self, id: Uuid) -> Option<&mut Problem> {
        self.problems.iter_mut().find(|p| p.id == id)
    }

    fn quote(&self, id: Uuid) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.id == id)
    }

    fn quote_mut(&mut self, id: Uuid) -> Option<&mut Quote> {
        self.quotes.iter_mut().find(|q| q.id == id)
    }
}

/// In-memory store used by the test suites
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fault: StdMutex<Option<FaultPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next acceptance when it reaches `point`
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut fault) = self.fault.lock() {
            *fault = Some(point);
        }
    }

    fn trip(&self, point: FaultPoint) -> ApiResult<()> {
        let mut fault = self
            .fault
            .lock()
            .map_err(|_| ApiError::Internal("fault flag poisoned".to_string()))?;
        if *fault == Some(point) {
            *fault = None;
            return Err(ApiError::Internal(format!("injected fault at {:?}", point)));
        }
        Ok(())
    }

    /// Insert or replace a user row as-is
    pub async fn put_user(&self, user: User) {
        let mut state = self.state.lock().await;
        state.users.retain(|u| u.id != user.id);
        state.users.push(user);
    }

    /// Total number of quote rows, whatever their status
    pub async fn quote_count(&self) -> usize {
        self.state.lock().await.quotes.len()
    }

    /// Total number of problem rows
    pub async fn problem_count(&self) -> usize {
        self.state.lock().await.problems.len()
    }
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
    async fn insert_user_if_absent(&self, new_user: &NewUser) -> ApiResult<User> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.iter().find(|u| u.id == new_user.id) {
            return Ok(user.clone());
        }

        let now = Utc::now();
        let user = User {
            id: new_user.id.clone(),
            display_name: new_user.display_name.clone(),
            email: new_user.email.clone(),
            role: new_user.role,
            provider_approved: false,
            paid_member: false,
            deactivated: false,
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: &str) -> ApiResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn update_user(&self, id: &str, update: &UpdateUser) -> ApiResult<Option<User>> {
        let mut state = self.state.lock().await;
        let Some(user) = state.user_mut(id) else {
            return Ok(None);
        };

        if let Some(display_name) = &update.display_name {
            user.display_name = display_name.clone();
        }
        if let Some(email) = &update.email {
            user.email = Some(email.clone());
        }
        if let Some(role) = update.role {
            if role == Role::Provider && user.role != Role::Provider {
                user.provider_approved = false;
            }
            user.role = role;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_provider_approval(&self, id: &str, approved: bool) -> ApiResult<Option<User>> {
        let mut state = self.state.lock().await;
        Ok(state.user_mut(id).map(|user| {
            user.provider_approved = approved;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn deactivate_user(&self, id: &str) -> ApiResult<Option<User>> {
        let mut state = self.state.lock().await;
        Ok(state.user_mut(id).map(|user| {
            user.deactivated = true;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn list_pending_providers(&self) -> ApiResult<Vec<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .filter(|u| u.role == Role::Provider && !u.provider_approved && !u.deactivated)
            .cloned()
            .collect())
    }

    async fn mark_paid_member(&self, lookup: &MemberLookup) -> ApiResult<Option<User>> {
        let mut state = self.state.lock().await;
        let user = state.users.iter_mut().find(|u| match lookup {
            MemberLookup::Id(id) => &u.id == id,
            MemberLookup::Email(email) => u
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email)),
        });

        Ok(user.map(|user| {
            user.paid_member = true;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn insert_problem(
        &self,
        requester_id: &str,
        new_problem: &NewProblem,
    ) -> ApiResult<Problem> {
        let mut state = self.state.lock().await;
        if !state.users.iter().any(|u| u.id == requester_id) {
            return Err(ApiError::Internal(format!(
                "requester {} has no user row",
                requester_id
            )));
        }

        let now = Utc::now();
        let problem = Problem {
            id: Uuid::new_v4(),
            title: new_problem.title.clone(),
            description: new_problem.description.clone(),
            category: new_problem.category.clone(),
            location: new_problem.location.clone(),
            estimated_budget: new_problem.estimated_budget,
            requester_id: requester_id.to_string(),
            status: ProblemStatus::Open,
            approved: false,
            accepted_quote_id: None,
            created_at: now,
            updated_at: now,
        };
        state.problems.push(problem.clone());
        Ok(problem)
    }

    async fn find_problem(&self, id: Uuid) -> ApiResult<Option<Problem>> {
        let state = self.state.lock().await;
        Ok(state.problem(id).cloned())
    }

    async fn list_problems(&self, filter: &ProblemFilter) -> ApiResult<Vec<Problem>> {
        let state = self.state.lock().await;
        Ok(state
            .problems
            .iter()
            .rev()
            .filter(|p| match filter {
                ProblemFilter::Approved => p.approved,
                ProblemFilter::PendingApproval => !p.approved,
                ProblemFilter::ByRequester(requester_id) => &p.requester_id == requester_id,
            })
            .cloned()
            .collect())
    }

    async fn set_problem_approval(&self, id: Uuid, approved: bool) -> ApiResult<Option<Problem>> {
        let mut state = self.state.lock().await;
        Ok(state.problem_mut(id).map(|problem| {
            problem.approved = approved;
            problem.updated_at = Utc::now();
            problem.clone()
        }))
    }

    async fn delete_problem(&self, id: Uuid, require_open: bool) -> ApiResult<()> {
        let mut state = self.state.lock().await;
        let problem = state.problem(id).ok_or_else(problem_not_found)?;

        if require_open && !problem.is_open() {
            return Err(ApiError::InvalidState(format!(
                "Problem is {} and can no longer be deleted by its requester",
                problem.status
            )));
        }

        state.problems.retain(|p| p.id != id);
        state.quotes.retain(|q| q.problem_id != id);
        Ok(())
    }

    async fn resolve_problem(&self, id: Uuid) -> ApiResult<Problem> {
        let mut state = self.state.lock().await;
        let problem = state.problem_mut(id).ok_or_else(problem_not_found)?;

        if problem.status != ProblemStatus::Closed || problem.accepted_quote_id.is_none() {
            return Err(not_resolvable());
        }

        problem.status = ProblemStatus::Resolved;
        problem.updated_at = Utc::now();
        Ok(problem.clone())
    }

    async fn insert_quote(
        &self,
        provider_id: &str,
        problem_id: Uuid,
        new_quote: &NewQuote,
    ) -> ApiResult<Quote> {
        let mut state = self.state.lock().await;
        state
            .problem(problem_id)
            .ok_or_else(problem_not_found)?
            .ensure_open()?;

        let has_active = state.quotes.iter().any(|q| {
            q.problem_id == problem_id
                && q.provider_id == provider_id
                && q.status != QuoteStatus::Withdrawn
        });
        if has_active {
            return Err(duplicate_quote());
        }

        let now = Utc::now();
        let quote = Quote {
            id: Uuid::new_v4(),
            problem_id,
            provider_id: provider_id.to_string(),
            amount: new_quote.amount,
            details: new_quote.details.clone(),
            start_date: new_quote.start_date,
            end_date: new_quote.end_date,
            status: QuoteStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.quotes.push(quote.clone());
        Ok(quote)
    }

    async fn find_quote(&self, id: Uuid) -> ApiResult<Option<Quote>> {
        let state = self.state.lock().await;
        Ok(state.quote(id).cloned())
    }

    async fn list_quotes_for_problem(&self, problem_id: Uuid) -> ApiResult<Vec<Quote>> {
        let state = self.state.lock().await;
        Ok(state
            .quotes
            .iter()
            .filter(|q| q.problem_id == problem_id)
            .cloned()
            .collect())
    }

    async fn list_quotes_by_provider(&self, provider_id: &str) -> ApiResult<Vec<ProviderQuote>> {
        let state = self.state.lock().await;
        Ok(state
            .quotes
            .iter()
            .rev()
            .filter(|q| q.provider_id == provider_id)
            .filter_map(|q| {
                state.problem(q.problem_id).map(|p| ProviderQuote {
                    quote: q.clone(),
                    problem_title: p.title.clone(),
                    problem_status: p.status,
                })
            })
            .collect())
    }

    async fn withdraw_quote(&self, quote_id: Uuid) -> ApiResult<Quote> {
        let mut state = self.state.lock().await;
        let quote = state.quote(quote_id).ok_or_else(quote_not_found)?;
        let problem = state.problem(quote.problem_id).ok_or_else(problem_not_found)?;
        check_withdrawable(problem, quote)?;

        let quote = state.quote_mut(quote_id).ok_or_else(quote_not_found)?;
        quote.status = QuoteStatus::Withdrawn;
        quote.updated_at = Utc::now();
        Ok(quote.clone())
    }

    async fn accept_quote(&self, problem_id: Uuid, quote_id: Uuid) -> ApiResult<Acceptance> {
        let mut state = self.state.lock().await;
        let problem = state.problem(problem_id).ok_or_else(problem_not_found)?;
        let quote = state.quote(quote_id).ok_or_else(quote_not_found)?;
        check_acceptable(problem, quote)?;

        let mut staged = state.clone();
        let now = Utc::now();

        let accepted = staged.quote_mut(quote_id).ok_or_else(quote_not_found)?;
        accepted.status = QuoteStatus::Accepted;
        accepted.updated_at = now;
        let accepted = accepted.clone();
        self.trip(FaultPoint::AfterQuoteAccepted)?;

        for quote in staged
            .quotes
            .iter_mut()
            .filter(|q| q.problem_id == problem_id && q.id != quote_id)
            .filter(|q| q.status == QuoteStatus::Pending)
        {
            quote.status = QuoteStatus::Rejected;
            quote.updated_at = now;
        }
        self.trip(FaultPoint::AfterCompetitorsRejected)?;

        let closed = staged.problem_mut(problem_id).ok_or_else(problem_not_found)?;
        closed.status = ProblemStatus::Closed;
        closed.accepted_quote_id = Some(quote_id);
        closed.updated_at = now;
        let closed = closed.clone();

        *state = staged;
        Ok(Acceptance {
            problem: closed,
            quote: accepted,
        })
    }
}
