//! Storage seam for users, problems and quotes
//!
//! Services talk to a [`MarketplaceStore`]. Production uses the PostgreSQL
//! backend in [`postgres`]; the tests use the in-memory backend in [`memory`],
//! which emulates transactions and supports fault injection.
//!
//! Every method that changes more than one row, or whose precondition must
//! still hold at write time, runs as one atomic unit and re-checks that
//! precondition itself. Callers may pre-check for better error messages but
//! must not rely on their own checks for correctness.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        Acceptance, NewProblem, NewQuote, NewUser, Problem, ProviderQuote, Quote, UpdateUser, User,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which problems a listing returns. Listings are always newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemFilter {
    /// Publicly visible problems
    Approved,
    /// Moderation queue
    PendingApproval,
    /// Everything a requester posted
    ByRequester(String),
}

/// How a payment event identifies the paying user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberLookup {
    Id(String),
    Email(String),
}

#[async_trait]
pub trait MarketplaceStore: Send + Sync + 'static {
    /// Insert the user unless one with the same id exists, then return the stored row
    async fn insert_user_if_absent(&self, new_user: &NewUser) -> ApiResult<User>;

    async fn find_user(&self, id: &str) -> ApiResult<Option<User>>;

    /// Switching the role to provider clears any previous approval
    async fn update_user(&self, id: &str, update: &UpdateUser) -> ApiResult<Option<User>>;

    async fn set_provider_approval(&self, id: &str, approved: bool) -> ApiResult<Option<User>>;

    async fn deactivate_user(&self, id: &str) -> ApiResult<Option<User>>;

    async fn list_pending_providers(&self) -> ApiResult<Vec<User>>;

    async fn mark_paid_member(&self, lookup: &MemberLookup) -> ApiResult<Option<User>>;

    async fn insert_problem(&self, requester_id: &str, new_problem: &NewProblem)
    -> ApiResult<Problem>;

    async fn find_problem(&self, id: Uuid) -> ApiResult<Option<Problem>>;

    async fn list_problems(&self, filter: &ProblemFilter) -> ApiResult<Vec<Problem>>;

    async fn set_problem_approval(&self, id: Uuid, approved: bool) -> ApiResult<Option<Problem>>;

    /// Remove a problem together with its quotes.
    ///
    /// With `require_open` the problem must still be open when the delete runs.
    async fn delete_problem(&self, id: Uuid, require_open: bool) -> ApiResult<()>;

    /// closed → resolved. Fails with InvalidState from any other status.
    async fn resolve_problem(&self, id: Uuid) -> ApiResult<Problem>;

    /// Insert a pending quote. The problem must be open and the provider must
    /// not already hold a non-withdrawn quote on it.
    async fn insert_quote(
        &self,
        provider_id: &str,
        problem_id: Uuid,
        new_quote: &NewQuote,
    ) -> ApiResult<Quote>;

    async fn find_quote(&self, id: Uuid) -> ApiResult<Option<Quote>>;

    /// Oldest first
    async fn list_quotes_for_problem(&self, problem_id: Uuid) -> ApiResult<Vec<Quote>>;

    /// Newest first
    async fn list_quotes_by_provider(&self, provider_id: &str) -> ApiResult<Vec<ProviderQuote>>;

    /// pending → withdrawn, only while the parent problem is open
    async fn withdraw_quote(&self, quote_id: Uuid) -> ApiResult<Quote>;

    /// Accept one quote, reject the other pending quotes of the problem and
    /// close the problem, all or nothing.
    async fn accept_quote(&self, problem_id: Uuid, quote_id: Uuid) -> ApiResult<Acceptance>;
}

pub(crate) fn problem_not_found() -> ApiError {
    ApiError::NotFound("Problem not found".to_string())
}

pub(crate) fn quote_not_found() -> ApiError {
    ApiError::NotFound("Quote not found".to_string())
}

pub(crate) fn duplicate_quote() -> ApiError {
    ApiError::Conflict("You already have an active quote on this problem".to_string())
}

pub(crate) fn not_resolvable() -> ApiError {
    ApiError::InvalidState("Only a closed problem with an accepted quote can be resolved".to_string())
}

/// Checks shared by both backends once the rows are loaded (and, for
/// PostgreSQL, locked).
pub(crate) fn check_acceptable(problem: &Problem, quote: &Quote) -> ApiResult<()> {
    problem.ensure_open()?;
    if quote.problem_id != problem.id {
        return Err(quote_not_found());
    }
    quote.ensure_pending()
}

pub(crate) fn check_withdrawable(problem: &Problem, quote: &Quote) -> ApiResult<()> {
    quote.ensure_pending()?;
    problem.ensure_open()
}
