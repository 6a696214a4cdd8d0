/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    db,
    error::{HubError, HubResult},
    graph::GraphReader,
    media::{DiskMediaUploader, MediaUploader},
    password::PasswordVerifier,
    session::SessionCoordinator,
    store::{SqliteAccountStore, SqliteSubscriptionStore},
    token::TokenIssuer,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub account_db: SqlitePool,
    pub sessions: Arc<SessionCoordinator>,
    pub account_manager: Arc<AccountManager>,
    pub graph: Arc<GraphReader>,
    pub uploader: Arc<dyn MediaUploader>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> HubResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        // Initialize account database
        let account_db =
            db::create_pool(&config.storage.account_db, db::DatabaseOptions::default()).await?;

        db::run_migrations(&account_db).await?;
        db::test_connection(&account_db).await?;

        let timeout = config.storage.operation_timeout;
        let account_store = Arc::new(SqliteAccountStore::new(account_db.clone(), timeout));
        let subscription_store = Arc::new(SqliteSubscriptionStore::new(account_db.clone(), timeout));

        let passwords = PasswordVerifier::new(&config.authentication)?;
        let tokens = Arc::new(TokenIssuer::new(&config.authentication));

        let sessions = Arc::new(SessionCoordinator::new(
            account_store.clone(),
            passwords,
            tokens,
        ));
        let account_manager = Arc::new(AccountManager::new(account_store.clone()));
        let graph = Arc::new(GraphReader::new(
            account_store.clone(),
            subscription_store,
            account_store,
        ));

        let uploader: Arc<dyn MediaUploader> = Arc::new(DiskMediaUploader::new(
            config.media.storage_directory.clone(),
            config.media.public_base_url.clone(),
        ));

        tracing::info!("Application context initialized");

        Ok(Self {
            config: Arc::new(config),
            account_db,
            sessions,
            account_manager,
            graph,
            uploader,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> HubResult<()> {
        let dirs = [
            &config.storage.data_directory,
            &config.media.temp_directory,
            &config.media.storage_directory,
        ];

        for dir in dirs {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                HubError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
