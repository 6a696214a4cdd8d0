/// Account manager implementation
///
/// Profile reads and field updates for an already authenticated account.
/// Credentials and sessions are handled by the session coordinator.

use crate::{
    account::{PublicProfile, UpdateAccountRequest},
    error::{HubError, HubResult},
    store::{CredentialStore, ProfileUpdate},
};
use std::sync::Arc;
use validator::Validate;

/// Account manager service
pub struct AccountManager {
    accounts: Arc<dyn CredentialStore>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(accounts: Arc<dyn CredentialStore>) -> Self {
        Self { accounts }
    }

    /// Get the public profile of an account
    pub async fn current_user(&self, id: &str) -> HubResult<PublicProfile> {
        self.accounts
            .find_by_id(id)
            .await?
            .map(PublicProfile::from)
            .ok_or_else(|| HubError::NotFound("User not found".to_string()))
    }

    /// Update display name and email
    ///
    /// Both are required. An email held by another account is a conflict.
    pub async fn update_details(
        &self,
        id: &str,
        request: UpdateAccountRequest,
    ) -> HubResult<PublicProfile> {
        let full_name = request.full_name.as_deref().map(str::trim).unwrap_or_default();
        let email = request.email.as_deref().map(str::trim).unwrap_or_default();

        if full_name.is_empty() || email.is_empty() {
            return Err(HubError::InvalidInput(
                "Full name and email are required".to_string(),
            ));
        }

        let request = UpdateAccountRequest {
            full_name: Some(full_name.to_string()),
            email: Some(email.to_string()),
        };
        request
            .validate()
            .map_err(|_| HubError::InvalidInput("Invalid email format".to_string()))?;

        let update = ProfileUpdate {
            full_name: request.full_name,
            email: request.email,
            ..Default::default()
        };

        let profile = self.apply(id, &update).await?;
        tracing::info!("update_details: account {} updated", id);
        Ok(profile)
    }

    /// Replace the avatar with an uploaded media URL
    pub async fn update_avatar(&self, id: &str, avatar_url: Option<String>) -> HubResult<PublicProfile> {
        let avatar = avatar_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| HubError::InvalidInput("Avatar file is missing".to_string()))?;

        let update = ProfileUpdate {
            avatar: Some(avatar),
            ..Default::default()
        };

        self.apply(id, &update).await
    }

    /// Replace the cover image with an uploaded media URL
    pub async fn update_cover_image(
        &self,
        id: &str,
        cover_url: Option<String>,
    ) -> HubResult<PublicProfile> {
        let cover_image = cover_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| HubError::InvalidInput("Cover image file is missing".to_string()))?;

        let update = ProfileUpdate {
            cover_image: Some(cover_image),
            ..Default::default()
        };

        self.apply(id, &update).await
    }

    async fn apply(&self, id: &str, update: &ProfileUpdate) -> HubResult<PublicProfile> {
        self.accounts
            .update_profile_fields(id, update)
            .await?
            .map(PublicProfile::from)
            .ok_or_else(|| HubError::NotFound("User not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{fixture, register};

    #[tokio::test]
    async fn test_current_user() {
        let fx = fixture().await;
        let profile = register(&fx, "alice", "wonderland").await;
        let manager = AccountManager::new(fx.store.clone());

        let current = manager.current_user(&profile.id).await.unwrap();
        assert_eq!(current, profile);

        let err = manager.current_user("missing").await.unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_details() {
        let fx = fixture().await;
        let profile = register(&fx, "alice", "wonderland").await;
        let manager = AccountManager::new(fx.store.clone());

        let updated = manager
            .update_details(
                &profile.id,
                UpdateAccountRequest {
                    full_name: Some(" Alice Liddell ".to_string()),
                    email: Some("liddell@example.com".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.full_name, "Alice Liddell");
        assert_eq!(updated.email, "liddell@example.com");
        assert_eq!(updated.username, "alice");
        assert!(updated.updated_at >= profile.updated_at);

        // The new email works for login
        fx.sessions.login("liddell@example.com", "wonderland").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_details_validation() {
        let fx = fixture().await;
        let alice = register(&fx, "alice", "wonderland").await;
        register(&fx, "bob", "builder").await;
        let manager = AccountManager::new(fx.store.clone());

        let err = manager
            .update_details(
                &alice.id,
                UpdateAccountRequest {
                    full_name: Some("Alice".to_string()),
                    email: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));

        let err = manager
            .update_details(
                &alice.id,
                UpdateAccountRequest {
                    full_name: Some("Alice".to_string()),
                    email: Some("bogus".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));

        let err = manager
            .update_details(
                &alice.id,
                UpdateAccountRequest {
                    full_name: Some("Alice".to_string()),
                    email: Some("bob@example.com".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));

        let err = manager
            .update_details(
                "missing",
                UpdateAccountRequest {
                    full_name: Some("Ghost".to_string()),
                    email: Some("ghost@example.com".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_media_fields() {
        let fx = fixture().await;
        let profile = register(&fx, "alice", "wonderland").await;
        let manager = AccountManager::new(fx.store.clone());

        let updated = manager
            .update_avatar(&profile.id, Some("http://media/new.png".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.avatar, "http://media/new.png");
        assert_eq!(updated.cover_image, None);

        let updated = manager
            .update_cover_image(&profile.id, Some("http://media/cover.png".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.cover_image.as_deref(), Some("http://media/cover.png"));
        assert_eq!(updated.avatar, "http://media/new.png");

        let err = manager.update_avatar(&profile.id, None).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));

        let err = manager.update_cover_image(&profile.id, None).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));
    }
}
