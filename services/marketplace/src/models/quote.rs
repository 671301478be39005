//! Quote model and related functionality

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Problem, ProblemStatus};
use crate::{
    error::ApiError,
    validation::{require_text, validate_amount, validate_date_range},
};

/// Lifecycle of a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

text_enum!(QuoteStatus, "quote status", {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    Withdrawn => "withdrawn",
});

/// Quote entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Quote {
    pub id: Uuid,
    pub problem_id: Uuid,
    pub provider_id: String,
    pub amount: f64,
    pub details: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn is_pending(&self) -> bool {
        self.status == QuoteStatus::Pending
    }

    pub fn ensure_pending(&self) -> Result<(), ApiError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(ApiError::InvalidState(format!(
                "Quote is {} and can no longer change",
                self.status
            )))
        }
    }
}

/// Quote joined with its parent problem, for the provider dashboard
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProviderQuote {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub quote: Quote,
    pub problem_title: String,
    #[sqlx(try_from = "String")]
    pub problem_status: ProblemStatus,
}

/// Outcome of the acceptance workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acceptance {
    pub problem: Problem,
    pub quote: Quote,
}

/// Validated quote submission payload
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuote {
    pub amount: f64,
    pub details: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Request body for `POST /problems/:id/quotes`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitQuoteRequest {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default, alias = "startDate")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, alias = "endDate")]
    pub end_date: Option<NaiveDate>,
}

impl SubmitQuoteRequest {
    pub fn validate(self) -> Result<NewQuote, ApiError> {
        let amount = validate_amount("amount", self.amount).map_err(ApiError::Validation)?;
        let details =
            require_text("details", self.details.as_deref(), 5000).map_err(ApiError::Validation)?;
        let (start_date, end_date) =
            validate_date_range(self.start_date, self.end_date).map_err(ApiError::Validation)?;

        Ok(NewQuote {
            amount,
            details,
            start_date,
            end_date,
        })
    }
}
