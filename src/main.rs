/// Channelhub server binary
use anyhow::Context;
use channelhub::{config::ServerConfig, context::AppContext, server};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env().context("failed to load configuration")?;

    // Initialize logging
    let json = config.logging.json;
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| "channelhub=debug,tower_http=debug".into()),
        )
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();

    tracing::info!("Starting channelhub v{}", config.service.version);

    // Create application context
    let ctx = AppContext::new(config)
        .await
        .context("failed to initialize application context")?;

    // Start server
    server::serve(ctx).await.context("server terminated")?;

    Ok(())
}
