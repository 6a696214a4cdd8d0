/// Configuration management for Channelhub
use crate::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub media: MediaConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
    /// Allowed CORS origin, `*` when unset
    pub cors_origin: Option<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub account_db: PathBuf,
    /// Deadline for a single store round-trip
    pub operation_timeout: Duration,
}

/// Authentication configuration
///
/// Signing secrets are fixed for the lifetime of the process. Changing either
/// one invalidates every outstanding token of that class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub access_token_secret: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: i64,
    pub refresh_token_secret: String,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: i64,
    /// Accepted clock skew when checking `exp`, in seconds
    pub token_leeway: u64,
    /// Argon2 memory cost in KiB
    pub password_memory_kib: u32,
    /// Argon2 iteration count
    pub password_iterations: u32,
    /// Argon2 lanes
    pub password_parallelism: u32,
}

/// Media upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Where multipart uploads are spooled before being handed to the uploader
    pub temp_directory: PathBuf,
    /// Where uploaded media is stored
    pub storage_directory: PathBuf,
    /// URL prefix under which `storage_directory` is served
    pub public_base_url: String,
    pub max_upload_bytes: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> HubResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("HUB_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("HUB_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| HubError::InvalidInput("Invalid port number".to_string()))?;
        let version = env::var("HUB_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());
        let cors_origin = env::var("HUB_CORS_ORIGIN").ok().filter(|s| s != "*");

        let data_directory: PathBuf = env::var("HUB_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let account_db = env::var("HUB_ACCOUNT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("account.sqlite"));
        let operation_timeout = Duration::from_millis(
            env::var("HUB_STORE_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
        );

        let access_token_secret = env::var("HUB_ACCESS_TOKEN_SECRET")
            .map_err(|_| HubError::InvalidInput("Access token secret required".to_string()))?;
        let access_token_ttl = env::var("HUB_ACCESS_TOKEN_TTL")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .unwrap_or(900);
        let refresh_token_secret = env::var("HUB_REFRESH_TOKEN_SECRET")
            .map_err(|_| HubError::InvalidInput("Refresh token secret required".to_string()))?;
        let refresh_token_ttl = env::var("HUB_REFRESH_TOKEN_TTL")
            .unwrap_or_else(|_| "864000".to_string())
            .parse()
            .unwrap_or(864000);
        let token_leeway = env::var("HUB_TOKEN_LEEWAY")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0);

        let password_memory_kib = env::var("HUB_PASSWORD_MEMORY_KIB")
            .unwrap_or_else(|_| "19456".to_string())
            .parse()
            .unwrap_or(19456);
        let password_iterations = env::var("HUB_PASSWORD_ITERATIONS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .unwrap_or(2);
        let password_parallelism = env::var("HUB_PASSWORD_PARALLELISM")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .unwrap_or(1);

        let temp_directory = env::var("HUB_MEDIA_TEMP_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("temp"));
        let storage_directory = env::var("HUB_MEDIA_STORAGE_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("media"));
        let public_base_url = env::var("HUB_MEDIA_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}/media", hostname, port));
        let max_upload_bytes = env::var("HUB_MEDIA_MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "10485760".to_string())
            .parse()
            .unwrap_or(10485760);

        let log_level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "channelhub=debug,tower_http=debug".to_string());
        let log_json = env::var("HUB_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
                cors_origin,
            },
            storage: StorageConfig {
                data_directory,
                account_db,
                operation_timeout,
            },
            authentication: AuthConfig {
                access_token_secret,
                access_token_ttl,
                refresh_token_secret,
                refresh_token_ttl,
                token_leeway,
                password_memory_kib,
                password_iterations,
                password_parallelism,
            },
            media: MediaConfig {
                temp_directory,
                storage_directory,
                public_base_url: public_base_url.trim_end_matches('/').to_string(),
                max_upload_bytes,
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> HubResult<()> {
        if self.service.hostname.is_empty() {
            return Err(HubError::InvalidInput("Hostname cannot be empty".to_string()));
        }

        let auth = &self.authentication;
        if auth.access_token_secret.len() < 32 || auth.refresh_token_secret.len() < 32 {
            return Err(HubError::InvalidInput(
                "Token secrets must be at least 32 characters".to_string(),
            ));
        }

        if auth.access_token_secret == auth.refresh_token_secret {
            return Err(HubError::InvalidInput(
                "Access and refresh token secrets must differ".to_string(),
            ));
        }

        if auth.access_token_ttl <= 0 || auth.refresh_token_ttl <= auth.access_token_ttl {
            return Err(HubError::InvalidInput(
                "Refresh token lifetime must exceed a positive access token lifetime".to_string(),
            ));
        }

        if self.storage.operation_timeout.is_zero() {
            return Err(HubError::InvalidInput(
                "Store operation timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::test_config;

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = test_config();
        config.authentication.access_token_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_secret_rejected() {
        let mut config = test_config();
        config.authentication.refresh_token_secret =
            config.authentication.access_token_secret.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_refresh_must_outlive_access() {
        let mut config = test_config();
        config.authentication.refresh_token_ttl = config.authentication.access_token_ttl;
        assert!(config.validate().is_err());
    }
}
