//! Problem model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    error::ApiError,
    validation::{require_text, validate_amount},
};

/// Lifecycle of a posted problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemStatus {
    /// Accepting quotes
    Open,
    /// A quote has been accepted
    Closed,
    /// Work confirmed done by the requester. Terminal.
    Resolved,
}

text_enum!(ProblemStatus, "problem status", {
    Open => "open",
    Closed => "closed",
    Resolved => "resolved",
});

/// Problem entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Problem {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub estimated_budget: f64,
    pub requester_id: String,
    #[sqlx(try_from = "String")]
    pub status: ProblemStatus,
    /// Gates public visibility
    pub approved: bool,
    /// Set exactly when the status is closed or resolved
    pub accepted_quote_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Problem {
    pub fn is_open(&self) -> bool {
        self.status == ProblemStatus::Open
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.requester_id == user_id
    }

    pub fn ensure_open(&self) -> Result<(), ApiError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ApiError::InvalidState(format!(
                "Problem is {} and no longer accepts changes to its quotes",
                self.status
            )))
        }
    }
}

/// Validated problem creation payload
#[derive(Debug, Clone, PartialEq)]
pub struct NewProblem {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub estimated_budget: f64,
}

/// Request body for `POST /problems`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProblemRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "estimatedBudget", alias = "budget")]
    pub estimated_budget: Option<f64>,
}

impl CreateProblemRequest {
    pub fn validate(self) -> Result<NewProblem, ApiError> {
        Ok(NewProblem {
            title: require_text("title", self.title.as_deref(), 200).map_err(ApiError::Validation)?,
            description: require_text("description", self.description.as_deref(), 5000)
                .map_err(ApiError::Validation)?,
            category: require_text("category", self.category.as_deref(), 100)
                .map_err(ApiError::Validation)?,
            location: require_text("location", self.location.as_deref(), 200)
                .map_err(ApiError::Validation)?,
            estimated_budget: validate_amount("estimated_budget", self.estimated_budget)
                .map_err(ApiError::Validation)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateProblemRequest {
        CreateProblemRequest {
            title: Some("Burst geyser".to_string()),
            description: Some("Geyser leaking through the ceiling".to_string()),
            category: Some("Plumbing".to_string()),
            location: Some("Soweto".to_string()),
            estimated_budget: Some(500.0),
        }
    }

    #[test]
    fn valid_request_produces_new_problem() {
        let problem = request().validate().unwrap();
        assert_eq!(problem.title, "Burst geyser");
        assert_eq!(problem.estimated_budget, 500.0);
    }

    #[test]
    fn blank_title_or_description_is_rejected() {
        let mut req = request();
        req.title = Some("   ".to_string());
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));

        let mut req = request();
        req.description = None;
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn budget_must_be_positive() {
        for budget in [Some(0.0), Some(-10.0), None] {
            let mut req = request();
            req.estimated_budget = budget;
            assert!(matches!(req.validate(), Err(ApiError::Validation(_))));
        }
    }

    #[test]
    fn camel_case_budget_is_accepted() {
        let req: CreateProblemRequest = serde_json::from_value(serde_json::json!({
            "title": "t",
            "description": "d",
            "category": "c",
            "location": "l",
            "estimatedBudget": 120.5
        }))
        .unwrap();
        assert_eq!(req.validate().unwrap().estimated_budget, 120.5);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ProblemStatus::Closed).unwrap(), "closed");
        assert_eq!("resolved".parse::<ProblemStatus>().unwrap(), ProblemStatus::Resolved);
    }
}
