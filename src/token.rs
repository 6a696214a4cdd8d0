/// Access and refresh token issuance
///
/// Both classes are HS256 JWTs with their own signing secret and lifetime.
/// Every token carries a random `jti`, so two tokens minted for the same
/// account in the same second still differ.

use crate::config::AuthConfig;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Token class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

impl TokenClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenClass::Access => "access",
            TokenClass::Refresh => "refresh",
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    jti: String,
    typ: TokenClass,
}

/// Why a token was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature is good but the token is past its expiry
    #[error("token has expired")]
    Expired,

    /// Bad signature, wrong class, or not a token at all
    #[error("token signature is invalid")]
    InvalidSignature,

    /// Signing failed
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// A freshly minted token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Subject of a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub account_id: String,
    pub class: TokenClass,
    pub expires_at: i64,
}

struct ClassKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

/// Mints and verifies access and refresh tokens
pub struct TokenIssuer {
    access: ClassKeys,
    refresh: ClassKeys,
    leeway: u64,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access: ClassKeys {
                encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
                decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
                ttl: Duration::seconds(config.access_token_ttl),
            },
            refresh: ClassKeys {
                encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
                decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
                ttl: Duration::seconds(config.refresh_token_ttl),
            },
            leeway: config.token_leeway,
        }
    }

    fn keys(&self, class: TokenClass) -> &ClassKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    fn issue(&self, account_id: &str, class: TokenClass) -> Result<IssuedToken, TokenError> {
        let keys = self.keys(class);
        let issued_at = Utc::now();
        let expires_at = issued_at + keys.ttl;

        let claims = Claims {
            sub: account_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            typ: class,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            issued_at,
            expires_at,
        })
    }

    /// Mint a short-lived access token
    pub fn issue_access(&self, account_id: &str) -> Result<IssuedToken, TokenError> {
        self.issue(account_id, TokenClass::Access)
    }

    /// Mint a long-lived refresh token
    pub fn issue_refresh(&self, account_id: &str) -> Result<IssuedToken, TokenError> {
        self.issue(account_id, TokenClass::Refresh)
    }

    /// Verify signature, expiry and class of a token
    pub fn verify(&self, token: &str, class: TokenClass) -> Result<TokenSubject, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.keys(class).decoding, &validation).map_err(|e| {
            tracing::debug!("{} token rejected: {}", class.as_str(), e);
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::InvalidSignature,
            }
        })?;

        // Secrets differ per class, but the claim guards against shared secrets
        if data.claims.typ != class {
            return Err(TokenError::InvalidSignature);
        }

        Ok(TokenSubject {
            account_id: data.claims.sub,
            class,
            expires_at: data.claims.exp,
        })
    }
}
