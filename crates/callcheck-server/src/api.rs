//! REST API endpoints for callcheck
//!
//! All endpoints are under /api/v1/ and return JSON, except the CSV report.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json};
use callcheck_core::probe::advanced::run_advanced_tests;
use callcheck_core::probe::pacing::TokioPacer;
use callcheck_core::probe::transport::ProbeTransport;
use callcheck_core::quick::{run_quick_test, QuickTestSummary};
use callcheck_core::report::{build_report, ExportFormat, SystemClock};
use callcheck_core::session::{
    lock_session, run_tracked, OrchestratorSnapshot, ProbeResult, TestId, TestRecord,
};
use callcheck_core::system::collect_system_info;
use callcheck_core::{estimate_speed, measure_ping, trace_route, OrchestrationMode};
use serde::{Deserialize, Serialize};

/// Upper bound on attempts a client may request
const MAX_PING_COUNT: u32 = 50;

/// Upper bound on hops a client may request
const MAX_TRACE_HOPS: u32 = 30;

/// Application status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub build_date: String,
    pub mode: OrchestrationMode,
    /// Test currently holding the guided-mode slot
    pub active: Option<TestId>,
    pub running: Vec<TestId>,
}

/// Mode change request
#[derive(Deserialize)]
pub struct ModeRequest {
    pub mode: OrchestrationMode,
}

/// Failure report from a client-driven test
#[derive(Deserialize, Default)]
pub struct FailRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Optional probe overrides, e.g. `?host=example.com&count=8`
#[derive(Deserialize, Default, Debug)]
pub struct ProbeQuery {
    pub host: Option<String>,
    pub count: Option<u32>,
    pub max_hops: Option<u32>,
}

/// Remote URL response
#[derive(Serialize)]
pub struct RemoteUrlResponse {
    pub url: String,
}

fn parse_test_id(raw: &str) -> Result<TestId, ApiError> {
    Ok(raw.parse::<TestId>()?)
}

fn current_record<T>(state: &AppState<T>, id: TestId) -> TestRecord {
    lock_session(&state.session).record(id).clone()
}

/// GET /api/v1/status
pub async fn get_status<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Json<StatusResponse> {
    let session = lock_session(&state.session);
    Json(StatusResponse {
        version: callcheck_core::VERSION.to_string(),
        build_date: callcheck_core::BUILD_DATE.to_string(),
        mode: session.mode(),
        active: session.active(),
        running: session.running().collect(),
    })
}

/// PUT /api/v1/mode
pub async fn set_mode<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<OrchestratorSnapshot>, ApiError> {
    let mut session = lock_session(&state.session);
    session.set_mode(req.mode)?;
    Ok(Json(session.snapshot()))
}

/// GET /api/v1/tests
pub async fn list_tests<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Json<OrchestratorSnapshot> {
    Json(lock_session(&state.session).snapshot())
}

/// GET /api/v1/tests/{id}
pub async fn get_test<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
    Path(id): Path<String>,
) -> Result<Json<TestRecord>, ApiError> {
    let id = parse_test_id(&id)?;
    Ok(Json(current_record(&state, id)))
}

/// POST /api/v1/tests/{id}/start
pub async fn start_test<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
    Path(id): Path<String>,
) -> Result<Json<TestRecord>, ApiError> {
    let id = parse_test_id(&id)?;
    let mut session = lock_session(&state.session);
    session.start(id)?;
    Ok(Json(session.record(id).clone()))
}

/// POST /api/v1/tests/{id}/complete
///
/// Body is a tagged result, e.g. `{"kind": "media", "data": {...}}`.
pub async fn complete_test<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
    Path(id): Path<String>,
    Json(result): Json<ProbeResult>,
) -> Result<Json<TestRecord>, ApiError> {
    let id = parse_test_id(&id)?;
    let mut session = lock_session(&state.session);
    session.complete(id, result)?;
    Ok(Json(session.record(id).clone()))
}

/// POST /api/v1/tests/{id}/fail
pub async fn fail_test<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
    Path(id): Path<String>,
    Json(req): Json<FailRequest>,
) -> Result<Json<TestRecord>, ApiError> {
    let id = parse_test_id(&id)?;
    let mut session = lock_session(&state.session);
    session.fail(id, req.reason)?;
    Ok(Json(session.record(id).clone()))
}

/// POST /api/v1/tests/{id}/reset
pub async fn reset_test<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
    Path(id): Path<String>,
) -> Result<Json<TestRecord>, ApiError> {
    let id = parse_test_id(&id)?;
    let mut session = lock_session(&state.session);
    session.reset_one(id);
    Ok(Json(session.record(id).clone()))
}

/// POST /api/v1/reset
pub async fn reset_all<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Json<OrchestratorSnapshot> {
    let mut session = lock_session(&state.session);
    session.reset_all();
    Json(session.snapshot())
}

/// POST /api/v1/probes/ping
pub async fn run_ping<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
    Query(query): Query<ProbeQuery>,
) -> Result<Json<TestRecord>, ApiError> {
    let mut config = state.config.probes.ping.clone();
    if let Some(host) = query.host {
        config.target_host = host;
    }
    if let Some(count) = query.count {
        config.count = count.clamp(1, MAX_PING_COUNT);
    }

    let transport = state.transport.as_ref();
    run_tracked(&state.session, TestId::Ping, move || async move {
        let summary = measure_ping(transport, &TokioPacer, &config, |samples| {
            tracing::debug!(attempts = samples.len(), "ping_progress");
        })
        .await;
        Ok(ProbeResult::Ping(summary))
    })
    .await?;

    Ok(Json(current_record(&state, TestId::Ping)))
}

/// POST /api/v1/probes/traceroute
pub async fn run_traceroute<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
    Query(query): Query<ProbeQuery>,
) -> Result<Json<TestRecord>, ApiError> {
    let mut config = state.config.probes.traceroute.clone();
    if let Some(host) = query.host {
        config.target_host = host;
    }
    if let Some(max_hops) = query.max_hops {
        config.max_hops = max_hops.clamp(1, MAX_TRACE_HOPS);
    }

    let transport = state.transport.as_ref();
    run_tracked(&state.session, TestId::Traceroute, move || async move {
        let summary = trace_route(transport, &TokioPacer, &config, |hops| {
            tracing::debug!(hops = hops.len(), "traceroute_progress");
        })
        .await;
        Ok(ProbeResult::Traceroute(summary))
    })
    .await?;

    Ok(Json(current_record(&state, TestId::Traceroute)))
}

/// POST /api/v1/probes/speed
///
/// A run whose download fails is recorded as a failed test.
pub async fn run_speed<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<Json<TestRecord>, ApiError> {
    let config = state.config.probes.speed.clone();
    let transport = state.transport.as_ref();
    run_tracked(&state.session, TestId::Speed, move || async move {
        let measurement = estimate_speed(transport, &TokioPacer, &config, |phase| {
            tracing::debug!(phase = phase.description(), "speed_progress");
        })
        .await;
        match &measurement.error {
            Some(reason) => Err(reason.clone()),
            None => Ok(ProbeResult::Speed(measurement)),
        }
    })
    .await?;

    Ok(Json(current_record(&state, TestId::Speed)))
}

/// POST /api/v1/probes/advanced
pub async fn run_advanced<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<Json<TestRecord>, ApiError> {
    let config = state.config.probes.advanced.clone();
    let transport = state.transport.as_ref();
    run_tracked(&state.session, TestId::Advanced, move || async move {
        Ok(ProbeResult::Advanced(
            run_advanced_tests(transport, &config).await,
        ))
    })
    .await?;

    Ok(Json(current_record(&state, TestId::Advanced)))
}

/// POST /api/v1/probes/system
pub async fn run_system<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<Json<TestRecord>, ApiError> {
    let transport = state.transport.as_ref();
    run_tracked(&state.session, TestId::System, move || async move {
        Ok(ProbeResult::System(collect_system_info(transport).await))
    })
    .await?;

    Ok(Json(current_record(&state, TestId::System)))
}

/// POST /api/v1/probes/quick
pub async fn run_quick<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<Json<QuickTestSummary>, ApiError> {
    let summary = run_quick_test(
        &state.session,
        state.transport.as_ref(),
        &TokioPacer,
        &state.config.probes.speed,
    )
    .await?;
    Ok(Json(summary))
}

fn render_report<T>(state: &AppState<T>, format: ExportFormat) -> Result<impl IntoResponse, ApiError> {
    let snapshot = lock_session(&state.session).snapshot();
    let report = build_report(&snapshot, &SystemClock);
    let body = format.render(&report)?;
    let disposition = format!("attachment; filename=\"{}\"", format.file_name(&report));
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// GET /api/v1/report
pub async fn get_report<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<impl IntoResponse, ApiError> {
    render_report(&state, ExportFormat::Json)
}

/// GET /api/v1/report.csv
pub async fn get_report_csv<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<impl IntoResponse, ApiError> {
    render_report(&state, ExportFormat::Csv)
}

/// GET /api/v1/remote-url
pub async fn get_remote_url<T: ProbeTransport + 'static>(
    State(state): State<AppState<T>>,
) -> Json<RemoteUrlResponse> {
    let ip = local_ip_address::local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| "localhost".to_string());
    Json(RemoteUrlResponse {
        url: format!("http://{}:{}", ip, state.config.port),
    })
}
