//! PostgreSQL backend
//!
//! Multi-statement operations run in one transaction. Rows are locked with
//! `SELECT ... FOR UPDATE`, parent problem first and quote second, so that
//! acceptance, submission and withdrawal on the same problem serialize on the
//! problem row instead of relying on the isolation level.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, error};
use uuid::Uuid;

use super::{
    MarketplaceStore, MemberLookup, ProblemFilter, check_acceptable, check_withdrawable,
    duplicate_quote, not_resolvable, problem_not_found, quote_not_found,
};
use crate::{
    error::{ApiError, ApiResult},
    models::{
        Acceptance, NewProblem, NewQuote, NewUser, Problem, ProviderQuote, Quote, UpdateUser, User,
    },
};
use common::error::DatabaseError;

const USER_COLUMNS: &str = "id, display_name, email, role, provider_approved, paid_member, \
     deactivated, created_at, updated_at";

const PROBLEM_COLUMNS: &str = "id, title, description, category, location, \
     estimated_budget::float8 AS estimated_budget, requester_id, status, approved, \
     accepted_quote_id, created_at, updated_at";

const QUOTE_COLUMNS: &str = "id, problem_id, provider_id, amount::float8 AS amount, details, \
     start_date, end_date, status, created_at, updated_at";

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over a connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> ApiResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await.map_err(DatabaseError::Connection)?)
    }
}

/// Commit on success; roll back explicitly before handing an error back.
async fn finish<T>(tx: Transaction<'static, Postgres>, result: ApiResult<T>) -> ApiResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!("Failed to roll back transaction: {}", rollback_err);
            }
            Err(err)
        }
    }
}

async fn lock_problem(conn: &mut PgConnection, id: Uuid) -> ApiResult<Option<Problem>> {
    let problem = sqlx::query_as::<_, Problem>(&format!(
        "SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(problem)
}

async fn lock_quote(conn: &mut PgConnection, id: Uuid) -> ApiResult<Option<Quote>> {
    let quote = sqlx::query_as::<_, Quote>(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(quote)
}

async fn accept_in_tx(
    conn: &mut PgConnection,
    problem_id: Uuid,
    quote_id: Uuid,
) -> ApiResult<Acceptance> {
    let problem = lock_problem(conn, problem_id)
        .await?
        .ok_or_else(problem_not_found)?;
    let quote = lock_quote(conn, quote_id)
        .await?
        .ok_or_else(quote_not_found)?;

    check_acceptable(&problem, &quote)?;

    let quote = sqlx::query_as::<_, Quote>(&format!(
        "UPDATE quotes SET status = 'accepted', updated_at = NOW() \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {QUOTE_COLUMNS}"
    ))
    .bind(quote_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match DatabaseError::Query(e) {
        err if err.is_unique_violation() => {
            ApiError::InvalidState("Problem already has an accepted quote".to_string())
        }
        err => err.into(),
    })?;

    let rejected = sqlx::query(
        "UPDATE quotes SET status = 'rejected', updated_at = NOW() \
         WHERE problem_id = $1 AND id <> $2 AND status = 'pending'",
    )
    .bind(problem_id)
    .bind(quote_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    debug!("Rejected {} competing quotes on problem {}", rejected, problem_id);

    let problem = sqlx::query_as::<_, Problem>(&format!(
        "UPDATE problems SET status = 'closed', accepted_quote_id = $2, updated_at = NOW() \
         WHERE id = $1 AND status = 'open' \
         RETURNING {PROBLEM_COLUMNS}"
    ))
    .bind(problem_id)
    .bind(quote_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Acceptance { problem, quote })
}

async fn insert_quote_in_tx(
    conn: &mut PgConnection,
    provider_id: &str,
    problem_id: Uuid,
    new_quote: &NewQuote,
) -> ApiResult<Quote> {
    let problem = lock_problem(conn, problem_id)
        .await?
        .ok_or_else(problem_not_found)?;
    problem.ensure_open()?;

    let has_active: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM quotes \
         WHERE problem_id = $1 AND provider_id = $2 AND status <> 'withdrawn')",
    )
    .bind(problem_id)
    .bind(provider_id)
    .fetch_one(&mut *conn)
    .await?;

    if has_active {
        return Err(duplicate_quote());
    }

    let quote = sqlx::query_as::<_, Quote>(&format!(
        "INSERT INTO quotes (id, problem_id, provider_id, amount, details, start_date, end_date) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {QUOTE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(problem_id)
    .bind(provider_id)
    .bind(new_quote.amount)
    .bind(&new_quote.details)
    .bind(new_quote.start_date)
    .bind(new_quote.end_date)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match DatabaseError::Query(e) {
        err if err.is_unique_violation() => duplicate_quote(),
        err => err.into(),
    })?;

    Ok(quote)
}

async fn withdraw_in_tx(conn: &mut PgConnection, quote_id: Uuid) -> ApiResult<Quote> {
    let problem_id: Uuid = sqlx::query_scalar("SELECT problem_id FROM quotes WHERE id = $1")
        .bind(quote_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(quote_not_found)?;

    let problem = lock_problem(conn, problem_id)
        .await?
        .ok_or_else(problem_not_found)?;
    let quote = lock_quote(conn, quote_id)
        .await?
        .ok_or_else(quote_not_found)?;

    check_withdrawable(&problem, &quote)?;

    let quote = sqlx::query_as::<_, Quote>(&format!(
        "UPDATE quotes SET status = 'withdrawn', updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {QUOTE_COLUMNS}"
    ))
    .bind(quote_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(quote)
}

async fn delete_in_tx(conn: &mut PgConnection, id: Uuid, require_open: bool) -> ApiResult<()> {
    let problem = lock_problem(conn, id).await?.ok_or_else(problem_not_found)?;

    if require_open && !problem.is_open() {
        return Err(ApiError::InvalidState(format!(
            "Problem is {} and can no longer be deleted by its requester",
            problem.status
        )));
    }

    // Quotes go with the problem through ON DELETE CASCADE.
    sqlx::query("DELETE FROM problems WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[async_trait]
impl MarketplaceStore for PgStore {
    async fn insert_user_if_absent(&self, new_user: &NewUser) -> ApiResult<User> {
        sqlx::query(
            "INSERT INTO users (id, display_name, email, role) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&new_user.id)
        .bind(&new_user.display_name)
        .bind(&new_user.email)
        .bind(new_user.role.as_str())
        .execute(&self.pool)
        .await?;

        self.find_user(&new_user.id).await?.ok_or_else(|| {
            ApiError::Internal(format!("User {} vanished after insert", new_user.id))
        })
    }

    async fn find_user(&self, id: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_user(&self, id: &str, update: &UpdateUser) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                 display_name = COALESCE($2, display_name), \
                 email = COALESCE($3, email), \
                 provider_approved = CASE \
                     WHEN $4::text = 'provider' AND role <> 'provider' THEN FALSE \
                     ELSE provider_approved END, \
                 role = COALESCE($4::text, role), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(update.display_name.as_deref())
        .bind(update.email.as_deref())
        .bind(update.role.map(|role| role.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn set_provider_approval(&self, id: &str, approved: bool) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET provider_approved = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(approved)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn deactivate_user(&self, id: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET deactivated = TRUE, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn list_pending_providers(&self) -> ApiResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE role = 'provider' AND provider_approved = FALSE AND deactivated = FALSE \
             ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn mark_paid_member(&self, lookup: &MemberLookup) -> ApiResult<Option<User>> {
        let (condition, value) = match lookup {
            MemberLookup::Id(id) => ("id = $1", id.as_str()),
            MemberLookup::Email(email) => ("LOWER(email) = LOWER($1)", email.as_str()),
        };

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET paid_member = TRUE, updated_at = NOW() \
             WHERE {condition} \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn insert_problem(
        &self,
        requester_id: &str,
        new_problem: &NewProblem,
    ) -> ApiResult<Problem> {
        let problem = sqlx::query_as::<_, Problem>(&format!(
            "INSERT INTO problems \
                 (id, title, description, category, location, estimated_budget, requester_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {PROBLEM_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new_problem.title)
        .bind(&new_problem.description)
        .bind(&new_problem.category)
        .bind(&new_problem.location)
        .bind(new_problem.estimated_budget)
        .bind(requester_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(problem)
    }

    async fn find_problem(&self, id: Uuid) -> ApiResult<Option<Problem>> {
        let problem = sqlx::query_as::<_, Problem>(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(problem)
    }

    async fn list_problems(&self, filter: &ProblemFilter) -> ApiResult<Vec<Problem>> {
        let problems = match filter {
            ProblemFilter::Approved | ProblemFilter::PendingApproval => {
                sqlx::query_as::<_, Problem>(&format!(
                    "SELECT {PROBLEM_COLUMNS} FROM problems \
                     WHERE approved = $1 \
                     ORDER BY created_at DESC"
                ))
                .bind(*filter == ProblemFilter::Approved)
                .fetch_all(&self.pool)
                .await?
            }
            ProblemFilter::ByRequester(requester_id) => {
                sqlx::query_as::<_, Problem>(&format!(
                    "SELECT {PROBLEM_COLUMNS} FROM problems \
                     WHERE requester_id = $1 \
                     ORDER BY created_at DESC"
                ))
                .bind(requester_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(problems)
    }

    async fn set_problem_approval(&self, id: Uuid, approved: bool) -> ApiResult<Option<Problem>> {
        let problem = sqlx::query_as::<_, Problem>(&format!(
            "UPDATE problems SET approved = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PROBLEM_COLUMNS}"
        ))
        .bind(id)
        .bind(approved)
        .fetch_optional(&self.pool)
        .await?;

        Ok(problem)
    }

    async fn delete_problem(&self, id: Uuid, require_open: bool) -> ApiResult<()> {
        let mut tx = self.begin().await?;
        let result = delete_in_tx(&mut tx, id, require_open).await;
        finish(tx, result).await
    }

    async fn resolve_problem(&self, id: Uuid) -> ApiResult<Problem> {
        let resolved = sqlx::query_as::<_, Problem>(&format!(
            "UPDATE problems SET status = 'resolved', updated_at = NOW() \
             WHERE id = $1 AND status = 'closed' AND accepted_quote_id IS NOT NULL \
             RETURNING {PROBLEM_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match resolved {
            Some(problem) => Ok(problem),
            None => match self.find_problem(id).await? {
                Some(_) => Err(not_resolvable()),
                None => Err(problem_not_found()),
            },
        }
    }

    async fn insert_quote(
        &self,
        provider_id: &str,
        problem_id: Uuid,
        new_quote: &NewQuote,
    ) -> ApiResult<Quote> {
        let mut tx = self.begin().await?;
        let result = insert_quote_in_tx(&mut tx, provider_id, problem_id, new_quote).await;
        finish(tx, result).await
    }

    async fn find_quote(&self, id: Uuid) -> ApiResult<Option<Quote>> {
        let quote = sqlx::query_as::<_, Quote>(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quote)
    }

    async fn list_quotes_for_problem(&self, problem_id: Uuid) -> ApiResult<Vec<Quote>> {
        let quotes = sqlx::query_as::<_, Quote>(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes \
             WHERE problem_id = $1 \
             ORDER BY created_at ASC"
        ))
        .bind(problem_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(quotes)
    }

    async fn list_quotes_by_provider(&self, provider_id: &str) -> ApiResult<Vec<ProviderQuote>> {
        let quotes = sqlx::query_as::<_, ProviderQuote>(
            "SELECT q.id, q.problem_id, q.provider_id, q.amount::float8 AS amount, q.details, \
                    q.start_date, q.end_date, q.status, q.created_at, q.updated_at, \
                    p.title AS problem_title, p.status AS problem_status \
             FROM quotes q \
             JOIN problems p ON p.id = q.problem_id \
             WHERE q.provider_id = $1 \
             ORDER BY q.created_at DESC",
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(quotes)
    }

    async fn withdraw_quote(&self, quote_id: Uuid) -> ApiResult<Quote> {
        let mut tx = self.begin().await?;
        let result = withdraw_in_tx(&mut tx, quote_id).await;
        finish(tx, result).await
    }

    async fn accept_quote(&self, problem_id: Uuid, quote_id: Uuid) -> ApiResult<Acceptance> {
        let mut tx = self.begin().await?;
        let result = accept_in_tx(&mut tx, problem_id, quote_id).await;
        finish(tx, result).await
    }
}
