//! User profiles, provider approval and account deactivation

use std::sync::Arc;

use tracing::info;

use crate::{
    auth::{Principal, VerifiedIdentity},
    error::{ApiError, ApiResult},
    models::{NewUser, Role, UpdateProfileRequest, User},
    store::MarketplaceStore,
};

const MAX_DISPLAY_NAME_CHARS: usize = 100;

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

/// Display name for a profile created from a token: the email local part
fn default_display_name(email: Option<&str>) -> String {
    email
        .and_then(|e| e.split('@').next())
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .map(|local| local.chars().take(MAX_DISPLAY_NAME_CHARS).collect())
        .unwrap_or_else(|| "Member".to_string())
}

/// Initial role from the token's role claim; anything unknown means member
fn initial_role(claim: Option<&str>) -> Role {
    claim
        .and_then(|r| r.trim().to_lowercase().parse::<Role>().ok())
        .unwrap_or(Role::Member)
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn MarketplaceStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn MarketplaceStore>) -> Self {
        Self { store }
    }

    /// Return the stored profile for a verified identity, creating it on first sight
    pub async fn ensure_profile(&self, identity: &VerifiedIdentity) -> ApiResult<User> {
        if let Some(user) = self.store.find_user(&identity.subject_id).await? {
            return Ok(user);
        }

        let email = identity.email.as_deref().map(|e| e.trim().to_lowercase());
        let new_user = NewUser {
            id: identity.subject_id.clone(),
            display_name: default_display_name(email.as_deref()),
            email,
            role: initial_role(identity.role.as_deref()),
        };

        let user = self.store.insert_user_if_absent(&new_user).await?;
        info!("Created profile for user {} as {}", user.id, user.role);
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        principal: &Principal,
        request: UpdateProfileRequest,
    ) -> ApiResult<User> {
        let update = request.validate()?;

        if update.role == Some(Role::Admin) && !principal.is_admin() {
            return Err(ApiError::Forbidden(
                "The admin role cannot be self-assigned".to_string(),
            ));
        }

        self.store
            .update_user(principal.user_id(), &update)
            .await?
            .ok_or_else(user_not_found)
    }

    pub async fn list_pending_providers(&self, principal: &Principal) -> ApiResult<Vec<User>> {
        principal.require_admin()?;
        self.store.list_pending_providers().await
    }

    /// Approve or revoke a provider
    pub async fn set_provider_approval(
        &self,
        principal: &Principal,
        user_id: &str,
        approved: bool,
    ) -> ApiResult<User> {
        principal.require_admin()?;

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(user_not_found)?;
        if user.role != Role::Provider {
            return Err(ApiError::InvalidState(format!(
                "User is a {}, not a provider",
                user.role
            )));
        }

        let user = self
            .store
            .set_provider_approval(user_id, approved)
            .await?
            .ok_or_else(user_not_found)?;

        info!(
            "Provider {} {} by {}",
            user.id,
            if approved { "approved" } else { "revoked" },
            principal.user_id()
        );
        Ok(user)
    }

    /// Soft delete. The account keeps its rows but loses access.
    pub async fn deactivate_user(&self, principal: &Principal, user_id: &str) -> ApiResult<User> {
        principal.require_admin()?;

        if user_id == principal.user_id() {
            return Err(ApiError::InvalidState(
                "Administrators cannot deactivate their own account".to_string(),
            ));
        }

        let user = self
            .store
            .deactivate_user(user_id)
            .await?
            .ok_or_else(user_not_found)?;

        info!("User {} deactivated by {}", user.id, principal.user_id());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures::{principal, stores};

    fn identity(sub: &str, email: Option<&str>, role: Option<&str>) -> VerifiedIdentity {
        VerifiedIdentity {
            subject_id: sub.to_string(),
            email: email.map(str::to_string),
            role: role.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn ensure_profile_is_idempotent() {
        let (_, store) = stores();
        let users = UserService::new(store);
        let id = identity("sub-1", Some("Zanele.M@Example.com"), Some("authenticated"));

        let first = users.ensure_profile(&id).await.unwrap();
        assert_eq!(first.display_name, "zanele.m");
        assert_eq!(first.email.as_deref(), Some("zanele.m@example.com"));
        assert_eq!(first.role, Role::Member);

        let renamed = identity("sub-1", Some("other@example.com"), Some("provider"));
        let second = users.ensure_profile(&renamed).await.unwrap();
        assert_eq!(second.email, first.email);
        assert_eq!(second.role, Role::Member);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn ensure_profile_takes_known_role_claims() {
        let (_, store) = stores();
        let users = UserService::new(store);

        let provider = users
            .ensure_profile(&identity("sub-2", None, Some("Provider")))
            .await
            .unwrap();
        assert_eq!(provider.role, Role::Provider);
        assert!(!provider.provider_approved);
        assert_eq!(provider.display_name, "Member");
    }

    #[tokio::test]
    async fn members_cannot_become_admin() {
        let (memory, store) = stores();
        let users = UserService::new(store);
        let member = principal(&memory, "m1", Role::Member, false).await;

        let request = UpdateProfileRequest {
            role: Some("admin".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            users.update_profile(&member, request).await,
            Err(ApiError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn switching_to_provider_resets_approval() {
        let (memory, store) = stores();
        let users = UserService::new(store);
        let admin = principal(&memory, "admin", Role::Admin, false).await;
        let member = principal(&memory, "m1", Role::Member, false).await;

        let request = UpdateProfileRequest {
            role: Some("provider".to_string()),
            ..Default::default()
        };
        let updated = users.update_profile(&member, request).await.unwrap();
        assert_eq!(updated.role, Role::Provider);
        assert!(!updated.provider_approved);

        let pending = users.list_pending_providers(&admin).await.unwrap();
        assert_eq!(pending.len(), 1);

        let approved = users.set_provider_approval(&admin, "m1", true).await.unwrap();
        assert!(approved.provider_approved);
        assert!(users.list_pending_providers(&admin).await.unwrap().is_empty());

        let revoked = users.set_provider_approval(&admin, "m1", false).await.unwrap();
        assert!(!revoked.provider_approved);
    }

    #[tokio::test]
    async fn provider_approval_checks() {
        let (memory, store) = stores();
        let users = UserService::new(store);
        let admin = principal(&memory, "admin", Role::Admin, false).await;
        let member = principal(&memory, "m1", Role::Member, false).await;

        assert!(matches!(
            users.set_provider_approval(&member, "m1", true).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            users.set_provider_approval(&admin, "m1", true).await,
            Err(ApiError::InvalidState(_))
        ));
        assert!(matches!(
            users.set_provider_approval(&admin, "ghost", true).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deactivation() {
        let (memory, store) = stores();
        let users = UserService::new(store);
        let admin = principal(&memory, "admin", Role::Admin, false).await;
        let member = principal(&memory, "m1", Role::Member, false).await;

        assert!(matches!(
            users.deactivate_user(&member, "admin").await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            users.deactivate_user(&admin, "admin").await,
            Err(ApiError::InvalidState(_))
        ));
        assert!(matches!(
            users.deactivate_user(&admin, "ghost").await,
            Err(ApiError::NotFound(_))
        ));

        let deactivated = users.deactivate_user(&admin, "m1").await.unwrap();
        assert!(deactivated.deactivated);
    }
}
