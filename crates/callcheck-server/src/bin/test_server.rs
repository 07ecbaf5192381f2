//! Standalone test server for E2E testing
//!
//! Serves the API on localhost with the real HTTP transport. Set `PORT` to
//! change the port.

use callcheck_core::probe::transport::HttpTransport;
use callcheck_server::{AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("callcheck=debug")),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8930u16);

    let config = ServerConfig {
        port,
        bind_addr: "127.0.0.1".to_string(),
        ..ServerConfig::default()
    };
    let state = AppState::with_new_session(HttpTransport::new()?, config);

    tracing::info!(port, "Test server starting");
    callcheck_server::start_server(state).await
}
