/// Session coordinator
///
/// Registration, login, refresh-token rotation, logout and password changes.
/// Session state lives on the account record: one refresh token at most, and
/// a refresh is honoured only when it presents exactly that token.
use crate::{
    account::{AuthenticatedSession, NewAccount, PublicProfile, TokenPair},
    db::account::{Account, SessionState},
    error::{HubError, HubResult},
    password::PasswordVerifier,
    store::{CredentialStore, ExpectedToken},
    token::{IssuedToken, TokenClass, TokenError, TokenIssuer},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Session coordinator service
pub struct SessionCoordinator {
    accounts: Arc<dyn CredentialStore>,
    passwords: PasswordVerifier,
    tokens: Arc<TokenIssuer>,
}

impl SessionCoordinator {
    /// Create a new session coordinator
    pub fn new(
        accounts: Arc<dyn CredentialStore>,
        passwords: PasswordVerifier,
        tokens: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            accounts,
            passwords,
            tokens,
        }
    }

    /// Register a new account
    ///
    /// `avatar` and `cover_image` are URLs produced by the media uploader.
    pub async fn register(
        &self,
        fields: NewAccount,
        avatar: Option<String>,
        cover_image: Option<String>,
    ) -> HubResult<PublicProfile> {
        let fields = fields.normalized();
        self.check_normalized(&fields).await?;

        let avatar = avatar
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| HubError::InvalidInput("Avatar is required".to_string()))?;
        let cover_image = cover_image.filter(|url| !url.trim().is_empty());

        let password_hash = self.passwords.hash(&fields.password)?;

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4().to_string(),
            username: fields.username,
            email: fields.email,
            full_name: fields.full_name,
            avatar,
            cover_image,
            password_hash,
            session: SessionState::NoSession,
            created_at: now,
            updated_at: now,
        };

        self.accounts.insert(&account).await?;
        tracing::info!("register: created account {} ({})", account.username, account.id);

        Ok(PublicProfile::from(&account))
    }

    /// Run every registration check that does not need the uploaded media
    ///
    /// Lets the caller reject a request before storing any of its files.
    pub async fn check_registration(&self, fields: &NewAccount) -> HubResult<()> {
        self.check_normalized(&fields.clone().normalized()).await
    }

    async fn check_normalized(&self, fields: &NewAccount) -> HubResult<()> {
        if [&fields.full_name, &fields.username, &fields.email]
            .iter()
            .any(|f| f.is_empty())
            || fields.password.trim().is_empty()
        {
            return Err(HubError::InvalidInput("All fields are required".to_string()));
        }

        validate_handle(&fields.username)?;
        fields
            .validate()
            .map_err(|_| HubError::InvalidInput("Invalid email format".to_string()))?;

        if self
            .accounts
            .identity_taken(&fields.username, &fields.email)
            .await?
        {
            return Err(HubError::Conflict(
                "User with email or username already exists".to_string(),
            ));
        }

        Ok(())
    }

    /// Authenticate by handle or email and start a new session
    ///
    /// Any previous session's refresh token stops working.
    pub async fn login(&self, identifier: &str, secret: &str) -> HubResult<AuthenticatedSession> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(HubError::InvalidInput(
                "Username or email is required".to_string(),
            ));
        }
        if secret.is_empty() {
            return Err(HubError::InvalidInput("Password is required".to_string()));
        }

        let account = self
            .accounts
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| HubError::NotFound("User not found".to_string()))?;

        if !self.passwords.verify(secret, &account.password_hash)? {
            tracing::warn!("login: invalid credentials for {}", account.id);
            return Err(HubError::Unauthorized("Invalid user credentials".to_string()));
        }

        let (access, refresh) = self.issue_pair(&account.id)?;

        if !self
            .accounts
            .update_refresh_token(&account.id, ExpectedToken::Any, &refresh.token, refresh.issued_at)
            .await?
        {
            return Err(HubError::NotFound("User not found".to_string()));
        }

        tracing::info!("login: session started for {}", account.id);

        Ok(AuthenticatedSession {
            user: PublicProfile::from(&account),
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Exchange the current refresh token for a new token pair
    ///
    /// The presented token is retired; presenting it again fails.
    pub async fn refresh(&self, presented: Option<&str>) -> HubResult<TokenPair> {
        let presented = presented
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HubError::Unauthorized("Refresh token is required".to_string()))?;

        let subject = self
            .tokens
            .verify(presented, TokenClass::Refresh)
            .map_err(|e| match e {
                TokenError::Expired => HubError::Unauthorized("Refresh token has expired".to_string()),
                _ => HubError::Unauthorized("Invalid refresh token".to_string()),
            })?;

        let account = self
            .accounts
            .find_by_id(&subject.account_id)
            .await?
            .ok_or_else(|| HubError::Unauthorized("Invalid refresh token".to_string()))?;

        if account.session.refresh_token() != Some(presented) {
            tracing::warn!(
                "refresh: stale or replayed refresh token for {}",
                account.id
            );
            return Err(HubError::Unauthorized(
                "Refresh token is expired or used".to_string(),
            ));
        }

        let (access, refresh) = self.issue_pair(&account.id)?;

        // Lost the race against a concurrent rotation
        if !self
            .accounts
            .update_refresh_token(
                &account.id,
                ExpectedToken::Matching(presented),
                &refresh.token,
                refresh.issued_at,
            )
            .await?
        {
            tracing::warn!("refresh: concurrent rotation won for {}", account.id);
            return Err(HubError::Unauthorized(
                "Refresh token is expired or used".to_string(),
            ));
        }

        tracing::info!("refresh: rotated tokens for {}", account.id);

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// End the account's session; safe to repeat
    pub async fn logout(&self, account_id: &str) -> HubResult<()> {
        self.accounts.clear_refresh_token(account_id).await?;
        tracing::info!("logout: session cleared for {}", account_id);
        Ok(())
    }

    /// Replace the password after checking the old one
    pub async fn change_password(
        &self,
        account_id: &str,
        old_secret: &str,
        new_secret: &str,
    ) -> HubResult<()> {
        if new_secret.trim().is_empty() {
            return Err(HubError::InvalidInput("New password is required".to_string()));
        }

        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| HubError::NotFound("User not found".to_string()))?;

        if !self.passwords.verify(old_secret, &account.password_hash)? {
            tracing::warn!("change_password: wrong old password for {}", account_id);
            return Err(HubError::Unauthorized("Invalid old password".to_string()));
        }

        let password_hash = self.passwords.hash(new_secret)?;
        if !self
            .accounts
            .update_password_hash(account_id, &password_hash)
            .await?
        {
            return Err(HubError::NotFound("User not found".to_string()));
        }

        tracing::info!("change_password: password updated for {}", account_id);
        Ok(())
    }

    /// Resolve an access token to the account it was issued for
    pub async fn authenticate(&self, access_token: &str) -> HubResult<Account> {
        let subject = self
            .tokens
            .verify(access_token, TokenClass::Access)
            .map_err(|e| match e {
                TokenError::Expired => HubError::Unauthorized("Access token has expired".to_string()),
                _ => HubError::Unauthorized("Invalid access token".to_string()),
            })?;

        self.accounts
            .find_by_id(&subject.account_id)
            .await?
            .ok_or_else(|| HubError::Unauthorized("Invalid access token".to_string()))
    }

    fn issue_pair(&self, account_id: &str) -> HubResult<(IssuedToken, IssuedToken)> {
        let signing_failed =
            |e: TokenError| HubError::Internal(format!("Failed to generate tokens: {}", e));

        let access = self.tokens.issue_access(account_id).map_err(signing_failed)?;
        let refresh = self.tokens.issue_refresh(account_id).map_err(signing_failed)?;

        Ok((access, refresh))
    }
}

/// Handles share the login namespace with emails
fn validate_handle(handle: &str) -> HubResult<()> {
    if handle.len() > 64 {
        return Err(HubError::InvalidInput("Username too long".to_string()));
    }

    if handle.contains('@') || handle.chars().any(char::is_whitespace) {
        return Err(HubError::InvalidInput(
            "Username contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::{config::test_support::test_config, db, store::SqliteAccountStore};

    pub struct Fixture {
        pub store: Arc<SqliteAccountStore>,
        pub sessions: Arc<SessionCoordinator>,
    }

    pub async fn fixture() -> Fixture {
        let config = test_config();
        let pool = db::create_memory_pool().await.unwrap();
        let store = Arc::new(SqliteAccountStore::new(
            pool,
            config.storage.operation_timeout,
        ));
        let sessions = Arc::new(SessionCoordinator::new(
            store.clone(),
            PasswordVerifier::new(&config.authentication).unwrap(),
            Arc::new(TokenIssuer::new(&config.authentication)),
        ));

        Fixture { store, sessions }
    }

    pub fn new_account(username: &str, password: &str) -> NewAccount {
        NewAccount {
            full_name: format!("{} Example", username),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: password.to_string(),
        }
    }

    pub async fn register(fx: &Fixture, username: &str, password: &str) -> PublicProfile {
        fx.sessions
            .register(
                new_account(username, password),
                Some(format!("http://media/{}.png", username)),
                None,
            )
            .await
            .unwrap()
    }
}
