use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tollgate_api::{app, AppState};
use tollgate_engine::{EngineSettings, EntitlementServices, ServiceDeps};
use tollgate_store::{app_config::Config, FileOverrideStore, SandboxLedger};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tollgate_api=debug,tollgate_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tollgate on port {}", config.server.port);

    // No platform store is attached to this binary; serve the sandbox ledger
    tracing::warn!(
        offers = config.sandbox.offers.len(),
        "Using sandbox ledger"
    );
    let ledger = Arc::new(SandboxLedger::with_offers(config.sandbox.offers.clone()));
    let overrides = Arc::new(FileOverrideStore::new(&config.overrides.path));

    let deps = ServiceDeps {
        offers: ledger.clone(),
        ledger: ledger.clone(),
        platform: ledger,
        overrides,
    };
    let settings = EngineSettings {
        tracked_products: config.entitlements.tracked_products.clone(),
        catalog_products: config.catalog.product_ids.clone(),
        command_buffer: config.entitlements.command_buffer,
    };
    let services = EntitlementServices::start(deps, settings).await;

    let app = app(AppState::new(services));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
