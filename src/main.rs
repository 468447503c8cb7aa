use anyhow::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber to log to stdout
    tracing_subscriber::fmt::init();

    let config = passkey_share::AppConfig::from_env()?;
    let app = passkey_share::build_router(passkey_share::build_state(&config).await?);

    let endpoint = &config.server.bind_addr;
    info!("Starting at endpoint:{}", endpoint);
    info!("Starting Passkey Share server v{}...", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(endpoint).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // ---
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => tracing::error!("Failed to listen for shutdown signal: {}", err),
    }
}
