//! Simulated traceroute
//!
//! Without raw socket access there is no TTL to play with. Each "hop" is the
//! same request to the destination with a deadline that grows by one second
//! per hop. Hop addresses are the destination's address, not routers.

use super::duration_to_ms;
use super::pacing::Pacer;
use super::transport::{probe_url, ProbeTransport, RESOLVE_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Default number of hops attempted before giving up
pub const DEFAULT_MAX_HOPS: u32 = 15;

/// Deadline increment per hop index
pub const HOP_TIMEOUT_STEP: Duration = Duration::from_millis(1000);

/// Gap between consecutive hop attempts
pub const HOP_PACING: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq)]
pub struct TracerouteConfig {
    pub target_host: String,
    pub max_hops: u32,
    pub hop_timeout_step: Duration,
    pub hop_pacing: Duration,
    /// Deadline for the one name lookup made per trace
    pub resolve_timeout: Duration,
}

impl TracerouteConfig {
    pub fn new(target_host: impl Into<String>) -> Self {
        Self {
            target_host: target_host.into(),
            max_hops: DEFAULT_MAX_HOPS,
            hop_timeout_step: HOP_TIMEOUT_STEP,
            hop_pacing: HOP_PACING,
            resolve_timeout: RESOLVE_TIMEOUT,
        }
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Deadline for a 1-based hop index
    pub fn hop_budget(&self, hop_index: u32) -> Duration {
        self.hop_timeout_step * hop_index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HopOutcome {
    Success,
    Timeout,
    Error,
}

impl HopOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerouteHop {
    /// 1-based
    pub hop_index: u32,
    pub target_host: String,
    /// Round trip for successes, the hop budget for timeouts, 0 for errors
    pub elapsed_ms: u64,
    pub outcome: HopOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Ordered hops plus derived counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "TracerouteSummaryWire")]
pub struct TracerouteSummary {
    target_host: String,
    hops: Vec<TracerouteHop>,
    total_hops_attempted: u32,
    successful_hop_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracerouteSummaryWire {
    target_host: String,
    #[serde(default)]
    hops: Vec<TracerouteHop>,
}

impl From<TracerouteSummaryWire> for TracerouteSummary {
    fn from(wire: TracerouteSummaryWire) -> Self {
        TracerouteSummary::from_hops(wire.target_host, wire.hops)
    }
}

impl TracerouteSummary {
    pub fn from_hops(target_host: impl Into<String>, hops: Vec<TracerouteHop>) -> Self {
        let successful_hop_count = hops
            .iter()
            .filter(|h| h.outcome == HopOutcome::Success)
            .count() as u32;
        Self {
            target_host: target_host.into(),
            total_hops_attempted: hops.len() as u32,
            successful_hop_count,
            hops,
        }
    }

    pub fn target_host(&self) -> &str {
        &self.target_host
    }

    pub fn hops(&self) -> &[TracerouteHop] {
        &self.hops
    }

    pub fn total_hops_attempted(&self) -> u32 {
        self.total_hops_attempted
    }

    pub fn successful_hop_count(&self) -> u32 {
        self.successful_hop_count
    }

    /// Whether a hop past the first reached the destination
    pub fn reached_destination(&self) -> bool {
        self.hops
            .iter()
            .any(|h| h.hop_index > 1 && h.outcome == HopOutcome::Success)
    }
}

/// Step-wise traceroute producing one hop per [`TraceRun::next`] call
///
/// Every hop targets the same host, so its address is looked up once, after
/// the first attempt, and reused for the rest of the trace.
pub struct TraceRun<'a, T, P> {
    transport: &'a T,
    pacer: &'a P,
    config: &'a TracerouteConfig,
    hops: Vec<TracerouteHop>,
    resolved: Option<Option<IpAddr>>,
    finished: bool,
}

impl<'a, T: ProbeTransport, P: Pacer> TraceRun<'a, T, P> {
    pub fn new(transport: &'a T, pacer: &'a P, config: &'a TracerouteConfig) -> Self {
        Self {
            transport,
            pacer,
            config,
            hops: Vec::new(),
            resolved: None,
            finished: config.max_hops == 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn next(&mut self) -> Option<&TracerouteHop> {
        if self.finished {
            return None;
        }
        let hop_index = self.hops.len() as u32 + 1;
        if hop_index > 1 {
            self.pacer.pause(self.config.hop_pacing).await;
        }

        let mut hop = self.attempt(hop_index).await;
        hop.resolved_address = self.address().await;

        // Hop 1 answering may just be the local edge; only a later success
        // counts as reaching the destination.
        let reached = hop.outcome == HopOutcome::Success && hop_index > 1;
        if reached || hop_index >= self.config.max_hops {
            self.finished = true;
        }

        self.hops.push(hop);
        self.hops.last()
    }

    async fn address(&mut self) -> Option<IpAddr> {
        if let Some(address) = self.resolved {
            return address;
        }
        let address = self
            .transport
            .resolve(&self.config.target_host, self.config.resolve_timeout)
            .await;
        self.resolved = Some(address);
        address
    }

    async fn attempt(&self, hop_index: u32) -> TracerouteHop {
        let host = &self.config.target_host;
        let budget = self.config.hop_budget(hop_index);
        let url = probe_url(host);
        let start = Instant::now();

        let result = self.transport.head(&url, budget).await;
        let elapsed = start.elapsed();

        let (outcome, elapsed_ms, error_detail) = match result {
            Ok(()) => (HopOutcome::Success, duration_to_ms(elapsed), None),
            Err(e) if e.is_timeout() => (HopOutcome::Timeout, duration_to_ms(budget), None),
            Err(e) => (HopOutcome::Error, 0, Some(e.to_string())),
        };

        tracing::debug!(
            host = %host,
            hop = hop_index,
            outcome = outcome.label(),
            elapsed_ms,
            "traceroute_hop"
        );

        TracerouteHop {
            hop_index,
            target_host: host.clone(),
            elapsed_ms,
            outcome,
            resolved_address: None,
            error_detail,
        }
    }

    pub fn hops(&self) -> &[TracerouteHop] {
        &self.hops
    }

    pub fn into_summary(self) -> TracerouteSummary {
        TracerouteSummary::from_hops(self.config.target_host.clone(), self.hops)
    }
}

/// Run a complete simulated traceroute
///
/// `observer` receives the hop list after every attempt.
pub async fn trace_route<T, P, F>(
    transport: &T,
    pacer: &P,
    config: &TracerouteConfig,
    mut observer: F,
) -> TracerouteSummary
where
    T: ProbeTransport,
    P: Pacer,
    F: FnMut(&[TracerouteHop]),
{
    tracing::info!(host = %config.target_host, max_hops = config.max_hops, "traceroute_started");
    let mut run = TraceRun::new(transport, pacer, config);
    while run.next().await.is_some() {
        observer(run.hops());
    }
    let summary = run.into_summary();
    tracing::info!(
        host = %summary.target_host(),
        hops = summary.total_hops_attempted(),
        successful = summary.successful_hop_count(),
        "traceroute_finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::pacing::InstantPacer;
    use crate::probe::scripted::{CallKind, ScriptStep, ScriptedTransport};
    use crate::probe::transport::ProbeTransportError;
    use std::net::Ipv4Addr;

    fn outcomes(summary: &TracerouteSummary) -> Vec<HopOutcome> {
        summary.hops().iter().map(|h| h.outcome).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_timeout_then_success() {
        let transport = ScriptedTransport::new()
            .with_head_steps([ScriptStep::hang(), ScriptStep::ok(120)])
            .with_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)));
        let pacer = InstantPacer::new();
        let config = TracerouteConfig::new("example.com").with_max_hops(5);

        let summary = trace_route(&transport, &pacer, &config, |_| {}).await;

        assert_eq!(outcomes(&summary), vec![HopOutcome::Timeout, HopOutcome::Success]);
        assert_eq!(summary.total_hops_attempted(), 2);
        assert_eq!(summary.successful_hop_count(), 1);
        assert_eq!(transport.count(CallKind::Head), 2);
        assert_eq!(summary.hops()[0].elapsed_ms, 1000);
        assert_eq!(summary.hops()[1].elapsed_ms, 120);
        assert!(summary.reached_destination());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_hop_success_does_not_stop() {
        let transport = ScriptedTransport::new()
            .with_head_steps([ScriptStep::ok(10), ScriptStep::ok(15)]);
        let pacer = InstantPacer::new();
        let config = TracerouteConfig::new("example.com").with_max_hops(5);

        let summary = trace_route(&transport, &pacer, &config, |_| {}).await;

        assert_eq!(outcomes(&summary), vec![HopOutcome::Success, HopOutcome::Success]);
        assert_eq!(summary.successful_hop_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_to_max_hops_without_success() {
        let transport = ScriptedTransport::new().with_head_fallback(ScriptStep::fail(
            ProbeTransportError::Connect("unreachable".into()),
        ));
        let pacer = InstantPacer::new();
        let config = TracerouteConfig::new("example.com").with_max_hops(4);

        let summary = trace_route(&transport, &pacer, &config, |_| {}).await;

        assert_eq!(summary.total_hops_attempted(), 4);
        assert_eq!(summary.successful_hop_count(), 0);
        assert!(summary.hops().iter().all(|h| h.elapsed_ms == 0));
        assert!(summary.hops().iter().all(|h| h.resolved_address.is_none()));
        assert_eq!(pacer.pauses(), vec![HOP_PACING; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hop_budget_grows_linearly() {
        let transport = ScriptedTransport::new().with_head_fallback(ScriptStep::hang());
        let pacer = InstantPacer::new();
        let config = TracerouteConfig::new("example.com").with_max_hops(3);

        let summary = trace_route(&transport, &pacer, &config, |_| {}).await;

        let budgets: Vec<u64> = summary.hops().iter().map(|h| h.elapsed_ms).collect();
        assert_eq!(budgets, vec![1000, 2000, 3000]);
        let timeouts: Vec<Option<Duration>> = transport
            .calls()
            .into_iter()
            .filter(|c| c.kind == CallKind::Head)
            .map(|c| c.timeout)
            .collect();
        assert_eq!(
            timeouts,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(3))
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_resolved_once_per_trace() {
        let transport = ScriptedTransport::new()
            .with_head_fallback(ScriptStep::hang())
            .with_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)));
        let pacer = InstantPacer::new();
        let config = TracerouteConfig::new("example.com").with_max_hops(3);

        let summary = trace_route(&transport, &pacer, &config, |_| {}).await;

        assert_eq!(transport.count(CallKind::Resolve), 1);
        assert!(summary
            .hops()
            .iter()
            .all(|h| h.resolved_address == Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_resolve_does_not_stall_trace() {
        let transport = ScriptedTransport::new()
            .with_head_fallback(ScriptStep::fail(ProbeTransportError::Connect(
                "unreachable".into(),
            )))
            .with_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)))
            .with_resolve_step(ScriptStep::hang());
        let pacer = InstantPacer::new();
        let config = TracerouteConfig::new("example.com").with_max_hops(3);
        let start = Instant::now();

        let summary = trace_route(&transport, &pacer, &config, |_| {}).await;

        assert_eq!(summary.total_hops_attempted(), 3);
        assert!(summary.hops().iter().all(|h| h.resolved_address.is_none()));
        assert_eq!(transport.count(CallKind::Resolve), 1);
        assert!(start.elapsed() < RESOLVE_TIMEOUT + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_and_zero_hops() {
        let transport = ScriptedTransport::new();
        let pacer = InstantPacer::new();
        let config = TracerouteConfig::new("example.com").with_max_hops(0);
        let mut calls = 0;
        let summary = trace_route(&transport, &pacer, &config, |_| calls += 1).await;
        assert_eq!(calls, 0);
        assert_eq!(summary.total_hops_attempted(), 0);
    }

    #[test]
    fn test_summary_deserialize_recomputes_counts() {
        let json = r#"{
            "targetHost": "example.com",
            "hops": [
                {"hopIndex": 1, "targetHost": "example.com", "elapsedMs": 1000, "outcome": "timeout"},
                {"hopIndex": 2, "targetHost": "example.com", "elapsedMs": 80, "outcome": "success",
                 "resolvedAddress": "192.0.2.1"}
            ],
            "totalHopsAttempted": 9,
            "successfulHopCount": 9
        }"#;
        let summary: TracerouteSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.total_hops_attempted(), 2);
        assert_eq!(summary.successful_hop_count(), 1);
    }
}
