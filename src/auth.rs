/// Authentication extractor
use crate::{api::middleware::extract_access_token, context::AppContext, error::HubError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated caller, resolved from the access token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: String,
    pub username: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = HubError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        // Cookie first, then Authorization header
        let token = extract_access_token(&parts.headers)
            .ok_or_else(|| HubError::Unauthorized("Unauthorized request".to_string()))?;

        let account = state.sessions.authenticate(&token).await?;

        Ok(AuthContext {
            account_id: account.id,
            username: account.username,
        })
    }
}
