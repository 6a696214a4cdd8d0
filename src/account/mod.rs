/// Account management system
///
/// Request and response shapes for account operations, plus the
/// [`AccountManager`] that handles profile reads and updates.

mod manager;

pub use manager::AccountManager;

use crate::db::account::Account;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Registration fields supplied by the caller
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub full_name: String,
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
}

impl NewAccount {
    /// Trim every field and lowercase the handle
    pub fn normalized(self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            username: self.username.trim().to_lowercase(),
            email: self.email.trim().to_string(),
            password: self.password,
        }
    }
}

/// Account view that is safe to hand to callers
///
/// Never carries the password hash or a refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for PublicProfile {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            username: account.username.clone(),
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            avatar: account.avatar.clone(),
            cover_image: account.cover_image.clone(),
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

impl From<Account> for PublicProfile {
    fn from(account: Account) -> Self {
        Self::from(&account)
    }
}

/// Result of a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedSession {
    pub user: PublicProfile,
    pub access_token: String,
    pub refresh_token: String,
}

/// Freshly rotated token pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Login request; either username or email identifies the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    /// The identifier to look the account up by, username first
    pub fn identifier(&self) -> Option<&str> {
        [self.username.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// Token refresh request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Password change request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Profile details update
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_identifier_prefers_username() {
        let req = LoginRequest {
            username: Some("  Alice ".to_string()),
            email: Some("alice@example.com".to_string()),
            password: "pw".to_string(),
        };
        assert_eq!(req.identifier(), Some("Alice"));

        let req = LoginRequest {
            username: Some("   ".to_string()),
            email: Some("alice@example.com".to_string()),
            password: "pw".to_string(),
        };
        assert_eq!(req.identifier(), Some("alice@example.com"));

        let req = LoginRequest {
            username: None,
            email: None,
            password: "pw".to_string(),
        };
        assert_eq!(req.identifier(), None);
    }

    #[test]
    fn test_new_account_normalization() {
        let account = NewAccount {
            full_name: "  Alice Liddell ".to_string(),
            username: " AliceL ".to_string(),
            email: " alice@example.com ".to_string(),
            password: " keep spaces ".to_string(),
        }
        .normalized();

        assert_eq!(account.full_name, "Alice Liddell");
        assert_eq!(account.username, "alicel");
        assert_eq!(account.email, "alice@example.com");
        assert_eq!(account.password, " keep spaces ");
    }

    #[test]
    fn test_email_validation() {
        let account = NewAccount {
            full_name: "Alice".to_string(),
            username: "alice".to_string(),
            email: "not-an-email".to_string(),
            password: "pw".to_string(),
        };
        assert!(account.validate().is_err());

        let update = UpdateAccountRequest {
            full_name: None,
            email: Some("alice@example.com".to_string()),
        };
        assert!(update.validate().is_ok());
    }
}
