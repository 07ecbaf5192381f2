//! Advanced network checks
//!
//! Timed requests against a DNS-over-HTTPS resolver, a plain HTTP endpoint,
//! an HTTPS endpoint and a CDN, each graded by its response time. The local
//! interface list gives a rough network type and a VPN guess.

use super::duration_to_ms;
use super::transport::{ProbeTransport, ProbeTransportError};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Default deadline for each endpoint check
pub const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interface name prefixes used by tunnels and VPN clients
const TUNNEL_PREFIXES: &[&str] = &["tun", "tap", "wg", "utun", "ppp", "ipsec", "tailscale", "zt"];

#[derive(Debug, Clone, PartialEq)]
pub struct AdvancedConfig {
    pub dns_url: String,
    pub http_url: String,
    pub https_url: String,
    pub cdn_url: String,
    pub timeout: Duration,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            dns_url: "https://dns.google/resolve?name=google.com&type=A".to_string(),
            http_url: "http://httpbin.org/get".to_string(),
            https_url: "https://httpbin.org/get".to_string(),
            cdn_url: "https://cdn.jsdelivr.net/npm/react@latest/package.json".to_string(),
            timeout: ENDPOINT_TIMEOUT,
        }
    }
}

/// Which endpoint a check targets; each has its own grading bands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Dns,
    Http,
    Https,
    Cdn,
}

impl Endpoint {
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::Dns => "DNS",
            Endpoint::Http => "HTTP",
            Endpoint::Https => "HTTPS",
            Endpoint::Cdn => "CDN",
        }
    }

    /// (excellent below, good below) in milliseconds
    fn bands(&self) -> Option<(u64, u64)> {
        match self {
            Endpoint::Dns => None,
            Endpoint::Http | Endpoint::Https => Some((100, 300)),
            Endpoint::Cdn => Some((150, 400)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointStatus {
    Excellent,
    Good,
    Poor,
    Failed,
}

impl EndpointStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EndpointStatus::Excellent => "Excellent",
            EndpointStatus::Good => "Good",
            EndpointStatus::Poor => "Poor",
            EndpointStatus::Failed => "Failed",
        }
    }
}

/// Grade one endpoint response
///
/// The resolver only has to answer: a success is excellent, an HTTP error
/// status good and no answer poor. The other endpoints are graded by
/// response time; any HTTP status counts as reached.
pub fn grade_response(
    endpoint: Endpoint,
    response_time_ms: u64,
    outcome: &Result<(), ProbeTransportError>,
) -> EndpointStatus {
    match (endpoint.bands(), outcome) {
        (None, Ok(())) => EndpointStatus::Excellent,
        (None, Err(ProbeTransportError::Http(_))) => EndpointStatus::Good,
        (None, Err(_)) => EndpointStatus::Poor,
        (Some(_), Err(e)) if !matches!(e, ProbeTransportError::Http(_)) => EndpointStatus::Failed,
        (Some((excellent, _)), _) if response_time_ms < excellent => EndpointStatus::Excellent,
        (Some((_, good)), _) if response_time_ms < good => EndpointStatus::Good,
        (Some(_), _) => EndpointStatus::Poor,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCheck {
    pub response_time_ms: u64,
    pub status: EndpointStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnDetection {
    pub is_vpn: bool,
    /// 0-100
    pub confidence: u8,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkType {
    #[serde(rename = "type")]
    pub kind: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSummary {
    pub dns_performance: EndpointCheck,
    pub http_performance: EndpointCheck,
    pub https_performance: EndpointCheck,
    pub cdn_performance: EndpointCheck,
    pub vpn_detection: VpnDetection,
    pub network_type: NetworkType,
}

/// A named local interface address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    pub name: String,
    pub address: IpAddr,
}

impl NetInterface {
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    WiFi,
    Ethernet,
    Tunnel,
    Other,
}

impl InterfaceKind {
    pub fn label(&self) -> &'static str {
        match self {
            InterfaceKind::WiFi => "Wi-Fi",
            InterfaceKind::Ethernet => "Ethernet",
            InterfaceKind::Tunnel => "VPN",
            InterfaceKind::Other => "Unknown",
        }
    }
}

/// Guess the link kind from an interface name (Linux, macOS or Windows style)
pub fn classify_interface(name: &str) -> InterfaceKind {
    let name = name.to_ascii_lowercase();
    if TUNNEL_PREFIXES.iter().any(|p| name.starts_with(p))
        || name.contains("vpn")
        || name.contains("wireguard")
    {
        InterfaceKind::Tunnel
    } else if name.starts_with("wl")
        || name.contains("wi-fi")
        || name.contains("wifi")
        || name.contains("wireless")
    {
        InterfaceKind::WiFi
    } else if name.starts_with("eth")
        || name.starts_with("en")
        || name.contains("ethernet")
        || name.contains("local area connection")
    {
        InterfaceKind::Ethernet
    } else {
        InterfaceKind::Other
    }
}

/// Non-loopback IPv4 and IPv6 interface addresses of this host
pub fn local_interfaces() -> Vec<NetInterface> {
    match local_ip_address::list_afinet_netifas() {
        Ok(list) => list
            .into_iter()
            .filter(|(_, address)| !address.is_loopback())
            .map(|(name, address)| NetInterface { name, address })
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "interface_list_unavailable");
            Vec::new()
        }
    }
}

/// Guess whether traffic leaves through a VPN
///
/// A default route over a tunnel interface is a strong sign; a tunnel that
/// is merely up is a weaker one.
pub fn detect_vpn(interfaces: &[NetInterface], primary: Option<IpAddr>) -> VpnDetection {
    if interfaces.is_empty() {
        return VpnDetection {
            is_vpn: false,
            confidence: 0,
            reason: "Detection failed".to_string(),
        };
    }
    let mut tunnels = interfaces
        .iter()
        .filter(|i| classify_interface(&i.name) == InterfaceKind::Tunnel);

    if let Some(routed) = tunnels.clone().find(|i| Some(i.address) == primary) {
        return VpnDetection {
            is_vpn: true,
            confidence: 95,
            reason: format!("Default route uses tunnel interface {}", routed.name),
        };
    }
    match tunnels.next() {
        Some(tunnel) => VpnDetection {
            is_vpn: true,
            confidence: 70,
            reason: format!("Tunnel interface {} is up", tunnel.name),
        },
        None => VpnDetection {
            is_vpn: false,
            confidence: 85,
            reason: "No VPN indicators detected".to_string(),
        },
    }
}

/// Link kind of the interface carrying the primary address
///
/// Without a primary address the first non-tunnel interface stands in.
pub fn detect_network_type(interfaces: &[NetInterface], primary: Option<IpAddr>) -> NetworkType {
    let chosen = primary
        .and_then(|ip| interfaces.iter().find(|i| i.address == ip))
        .or_else(|| {
            interfaces
                .iter()
                .find(|i| classify_interface(&i.name) != InterfaceKind::Tunnel)
        });

    match chosen {
        Some(interface) => NetworkType {
            kind: classify_interface(&interface.name).label().to_string(),
            details: format!("Interface {} ({})", interface.name, interface.address),
        },
        None => NetworkType {
            kind: InterfaceKind::Other.label().to_string(),
            details: "Network information not available".to_string(),
        },
    }
}

/// Time one request and grade it
pub async fn check_endpoint<T: ProbeTransport>(
    transport: &T,
    endpoint: Endpoint,
    url: &str,
    timeout: Duration,
) -> EndpointCheck {
    let start = Instant::now();
    let outcome = transport.get_text(url, timeout).await.map(|_| ());
    let response_time_ms = match &outcome {
        Err(e) if e.is_timeout() => duration_to_ms(timeout),
        _ => duration_to_ms(start.elapsed()),
    };
    let status = grade_response(endpoint, response_time_ms, &outcome);

    match &outcome {
        Ok(()) => tracing::debug!(
            endpoint = endpoint.label(),
            response_time_ms,
            status = status.label(),
            "endpoint_checked"
        ),
        Err(e) => tracing::debug!(
            endpoint = endpoint.label(),
            response_time_ms,
            status = status.label(),
            error = %e,
            "endpoint_check_failed"
        ),
    }
    EndpointCheck {
        response_time_ms,
        status,
    }
}

/// Run every endpoint check in turn, then classify the given interfaces
pub async fn run_advanced_checks<T: ProbeTransport>(
    transport: &T,
    config: &AdvancedConfig,
    interfaces: &[NetInterface],
    primary: Option<IpAddr>,
) -> AdvancedSummary {
    let dns_performance =
        check_endpoint(transport, Endpoint::Dns, &config.dns_url, config.timeout).await;
    let http_performance =
        check_endpoint(transport, Endpoint::Http, &config.http_url, config.timeout).await;
    let https_performance =
        check_endpoint(transport, Endpoint::Https, &config.https_url, config.timeout).await;
    let cdn_performance =
        check_endpoint(transport, Endpoint::Cdn, &config.cdn_url, config.timeout).await;

    AdvancedSummary {
        dns_performance,
        http_performance,
        https_performance,
        cdn_performance,
        vpn_detection: detect_vpn(interfaces, primary),
        network_type: detect_network_type(interfaces, primary),
    }
}

/// Advanced checks against this host's own interfaces
pub async fn run_advanced_tests<T: ProbeTransport>(
    transport: &T,
    config: &AdvancedConfig,
) -> AdvancedSummary {
    tracing::info!("advanced_tests_started");
    let interfaces = local_interfaces();
    let primary = local_ip_address::local_ip().ok();
    let summary = run_advanced_checks(transport, config, &interfaces, primary).await;
    tracing::info!(
        dns = summary.dns_performance.status.label(),
        https = summary.https_performance.status.label(),
        vpn = summary.vpn_detection.is_vpn,
        network_type = %summary.network_type.kind,
        "advanced_tests_finished"
    );
    summary
}
