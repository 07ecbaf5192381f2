//! Callcheck Web Server - Axum HTTP and WebSocket API
//!
//! Exposes the test orchestrator and the probes to a browser or desktop UI.
//! Every probe run goes through the orchestrator, so the guided-mode rules
//! hold no matter how many clients are connected.

pub mod api;
pub mod error;
pub mod ws;

use callcheck_core::probe::advanced::AdvancedConfig;
use callcheck_core::probe::ping::PingConfig;
use callcheck_core::probe::speed::SpeedConfig;
use callcheck_core::probe::traceroute::TracerouteConfig;
use callcheck_core::probe::transport::{HttpTransport, ProbeTransport};
use callcheck_core::session::SharedOrchestrator;
use callcheck_core::{OrchestrationMode, TestOrchestrator, DEFAULT_PROBE_HOST};
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

/// Default parameters for probes started over the API
#[derive(Clone, Debug)]
pub struct ProbeSettings {
    pub ping: PingConfig,
    pub traceroute: TracerouteConfig,
    pub speed: SpeedConfig,
    pub advanced: AdvancedConfig,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            ping: PingConfig::new(DEFAULT_PROBE_HOST),
            traceroute: TracerouteConfig::new(DEFAULT_PROBE_HOST),
            speed: SpeedConfig::default(),
            advanced: AdvancedConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind_addr: String,
    pub probes: ProbeSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8930,
            bind_addr: "0.0.0.0".to_string(),
            probes: ProbeSettings::default(),
        }
    }
}

/// Shared application state accessible from all handlers
pub struct AppState<T = HttpTransport> {
    pub session: SharedOrchestrator,
    pub transport: Arc<T>,
    pub config: ServerConfig,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
        }
    }
}

impl<T: ProbeTransport> AppState<T> {
    /// Create state around an existing session
    pub fn new(session: SharedOrchestrator, transport: T, config: ServerConfig) -> Self {
        Self {
            session,
            transport: Arc::new(transport),
            config,
        }
    }

    /// Fresh guided-mode session
    pub fn with_new_session(transport: T, config: ServerConfig) -> Self {
        let session = Arc::new(Mutex::new(TestOrchestrator::new(OrchestrationMode::Guided)));
        Self::new(session, transport, config)
    }
}

/// Build the Axum router with all routes
pub fn build_router<T: ProbeTransport + 'static>(state: AppState<T>) -> Router {
    Router::new()
        .route("/api/v1/status", get(api::get_status::<T>))
        .route("/api/v1/mode", axum::routing::put(api::set_mode::<T>))
        .route("/api/v1/tests", get(api::list_tests::<T>))
        .route("/api/v1/tests/{id}", get(api::get_test::<T>))
        .route("/api/v1/tests/{id}/start", post(api::start_test::<T>))
        .route("/api/v1/tests/{id}/complete", post(api::complete_test::<T>))
        .route("/api/v1/tests/{id}/fail", post(api::fail_test::<T>))
        .route("/api/v1/tests/{id}/reset", post(api::reset_test::<T>))
        .route("/api/v1/reset", post(api::reset_all::<T>))
        .route("/api/v1/probes/ping", post(api::run_ping::<T>))
        .route("/api/v1/probes/traceroute", post(api::run_traceroute::<T>))
        .route("/api/v1/probes/speed", post(api::run_speed::<T>))
        .route("/api/v1/probes/advanced", post(api::run_advanced::<T>))
        .route("/api/v1/probes/system", post(api::run_system::<T>))
        .route("/api/v1/probes/quick", post(api::run_quick::<T>))
        .route("/api/v1/report", get(api::get_report::<T>))
        .route("/api/v1/report.csv", get(api::get_report_csv::<T>))
        .route("/api/v1/remote-url", get(api::get_remote_url::<T>))
        // WebSocket
        .route("/api/v1/ws", get(ws::ws_handler::<T>))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

/// Start the web server
pub async fn start_server<T: ProbeTransport + 'static>(state: AppState<T>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind_addr, state.config.port);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Callcheck web server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
