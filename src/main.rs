use std::sync::Arc;

use school_api_rust::app::App;
use school_api_rust::config::config;
use school_api_rust::server::UserServer;
use school_api_rust::store::MemoryStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up LONG_TOKEN_SECRET, SUPERADMIN_*, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(config().clone());
    tracing::info!("Starting {} in {:?} mode", config.server.service_name, config.environment);

    let app = App::build(config, Arc::new(MemoryStore::new()))?;
    app.seed().await;

    UserServer::new(app).run().await
}
