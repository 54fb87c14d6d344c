use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

mod cli;
mod dsn;

use modelgate_core::{
    Gateway, GatewayState, RelayConfig, UpstreamClientConfig, WreqClientFactory, gateway_router,
};
use modelgate_provider_core::ProviderRegistry;
use modelgate_storage::SeaOrmStorage;

use crate::cli::Cli;
use crate::dsn::resolve_dsn;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("modelgate failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let mut patch = cli.patch();
    patch.dsn = Some(resolve_dsn(patch.dsn.as_deref(), &cli.data_dir)?);
    let config = patch.into_config()?;
    info!(
        host = %config.host,
        port = config.port,
        dsn = %config.dsn,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        default_organization_id = ?config.default_organization_id,
        provider_secret = config.provider_secret.is_some(),
        "config loaded"
    );

    let storage = Arc::new(SeaOrmStorage::connect(&config.dsn).await?);
    info!(dsn = %config.dsn, "db connected");
    storage.sync().await?;

    let registry = ProviderRegistry::new(
        storage.clone(),
        storage.clone(),
        storage.clone(),
        config.cipher(),
    );
    let clients = WreqClientFactory::new(
        &UpstreamClientConfig::from_gateway(&config),
        registry.clone(),
    )?;
    let gateway = Arc::new(Gateway::new(
        registry,
        Arc::new(clients),
        storage.clone(),
        storage,
        RelayConfig::from(&config),
    ));

    let app = gateway_router(GatewayState {
        gateway: gateway.clone(),
        admin_key: Arc::from(config.admin_key.as_str()),
        default_organization_id: config.default_organization_id,
    });

    let bind = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");

    let relays = gateway.shutdown_token().clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "ctrl-c handler unavailable");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
            // Open streams end with a `cancelled` error frame.
            relays.cancel();
        })
        .await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("modelgate=info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
