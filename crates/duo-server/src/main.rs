use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use duo_gateway::GatewayState;
use duo_server::app::build_router;
use duo_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duo=debug,duo_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = Arc::new(duo_db::Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    let gateway = GatewayState::new(db, config.gateway.clone());
    let app = build_router(gateway);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Duo server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
