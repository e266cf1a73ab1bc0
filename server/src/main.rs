use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use eventbook_server::config::Config;
use eventbook_server::routes::{create_routes, HttpOptions};
use eventbook_server::state::AppState;
use eventbook_server::storage::PgStore;

const DEFAULT_LOG_FILTER: &str = "info,eventbook_server=debug";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env()?;

    let store = PgStore::connect(
        &config.database_url,
        config.max_connections,
        config.lock_timeout,
    )
    .await?;
    tracing::info!("Successfully connected to database");

    store.migrate().await?;
    tracing::info!("Migrations run successfully");

    let state = AppState::from_config(Arc::new(store), &config);
    let app = create_routes(state, HttpOptions::from(&config));

    let addr = config.http_address;
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
