use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cloudspark::api;
use cloudspark::chat::ChatGateway;
use cloudspark::config::{Cli, Command, Config};
use cloudspark::database::Database;
use cloudspark::llm::{ProviderKind, ProviderRegistry};
use cloudspark::security::CorsMiddleware;
use cloudspark::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` may carry RUST_LOG, so it is loaded before the subscriber.
    let cli = Cli::load();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let db = Database::open(&cli.config.database)
        .with_context(|| format!("opening database {}", cli.config.database.display()))?;

    match cli.command() {
        Command::Seed => {
            let seeded = db.seed_catalog().await.context("seeding model catalog")?;
            info!(models = seeded, "catalog seeded");
            Ok(())
        }
        Command::Serve => serve(cli.config, db).await,
    }
}

async fn serve(config: Config, db: Database) -> Result<()> {
    for kind in ProviderKind::ALL {
        if config.provider_settings(kind).api_key.is_none() {
            warn!(provider = %kind, env = kind.api_key_env(), "no API key configured");
        }
    }
    let providers = ProviderRegistry::from_settings(|kind| config.provider_settings(kind))
        .context("building provider clients")?;

    let gateway = Arc::new(ChatGateway::new(db, providers));
    let cors = CorsMiddleware::new().allow_origin(config.allow_origin.clone());
    let app = Arc::new(api::app(gateway, cors));

    let server = Server::bind(&config.bind)
        .await?
        .max_request_duration(config.max_request_duration());
    info!(address = %server.local_addr(), "cloudspark ready");

    server
        .run_until(
            move |request| {
                let app = Arc::clone(&app);
                async move { app.handle(request).await }
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            },
        )
        .await?;

    info!("server stopped");
    Ok(())
}
