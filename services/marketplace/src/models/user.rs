//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    error::ApiError,
    validation::{validate_display_name, validate_email},
};

/// Marketplace role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Provider,
    Admin,
}

text_enum!(Role, "role", {
    Member => "member",
    Provider => "provider",
    Admin => "admin",
});

/// User entity, keyed by the identity provider's subject id
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    /// Only meaningful for providers
    pub provider_approved: bool,
    /// Only meaningful for members
    pub paid_member: bool,
    pub deactivated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Providers may quote only once an admin has approved them.
    pub fn can_submit_quotes(&self) -> bool {
        self.role == Role::Provider && self.provider_approved && !self.deactivated
    }
}

/// New user creation payload
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: Role,
}

/// User update payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateUser {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.email.is_none() && self.role.is_none()
    }
}

/// Request body for `PUT /me`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl UpdateProfileRequest {
    pub fn validate(self) -> Result<UpdateUser, ApiError> {
        let display_name = match self.display_name {
            Some(name) => {
                validate_display_name(&name).map_err(ApiError::Validation)?;
                Some(name.trim().to_string())
            }
            None => None,
        };

        let email = match self.email {
            Some(email) => {
                let email = email.trim().to_lowercase();
                validate_email(&email).map_err(ApiError::Validation)?;
                Some(email)
            }
            None => None,
        };

        let role = match self.role {
            Some(role) => Some(
                role.trim()
                    .to_lowercase()
                    .parse::<Role>()
                    .map_err(|e| ApiError::Validation(e.to_string()))?,
            ),
            None => None,
        };

        let update = UpdateUser {
            display_name,
            email,
            role,
        };

        if update.is_empty() {
            return Err(ApiError::Validation(
                "At least one of display_name, email or role is required".to_string(),
            ));
        }

        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Member, Role::Provider, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("plumber".parse::<Role>().is_err());
    }

    #[test]
    fn profile_update_normalises_fields() {
        let update = UpdateProfileRequest {
            display_name: Some("  Lerato  ".to_string()),
            email: Some("Lerato@Example.com".to_string()),
            role: Some("Provider".to_string()),
        }
        .validate()
        .unwrap();

        assert_eq!(update.display_name.as_deref(), Some("Lerato"));
        assert_eq!(update.email.as_deref(), Some("lerato@example.com"));
        assert_eq!(update.role, Some(Role::Provider));
    }

    #[test]
    fn profile_update_rejects_empty_and_unknown_values() {
        assert!(matches!(
            UpdateProfileRequest::default().validate(),
            Err(ApiError::Validation(_))
        ));

        let unknown_role = UpdateProfileRequest {
            role: Some("superuser".to_string()),
            ..Default::default()
        };
        assert!(matches!(unknown_role.validate(), Err(ApiError::Validation(_))));

        let bad_email = UpdateProfileRequest {
            email: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_email.validate(), Err(ApiError::Validation(_))));
    }
}
