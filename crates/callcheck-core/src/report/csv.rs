//! Flattened CSV export
//!
//! One row per (test type, parameter). Sections appear in a fixed order:
//! speed, advanced checks, ping and traceroute summaries, per-hop rows,
//! system, media, quick test. Absent values produce no row at all.

use super::Report;
use crate::media::MediaSummary;
use crate::probe::advanced::{AdvancedSummary, EndpointCheck};
use crate::probe::ping::PingSummary;
use crate::probe::round2;
use crate::probe::speed::{MetricSource, SpeedMeasurement};
use crate::probe::traceroute::TracerouteSummary;
use crate::quick::QuickTestSummary;
use crate::system::SystemInfo;
use chrono::SecondsFormat;

pub const CSV_HEADER: &str = "Test Type,Parameter,Value,Timestamp";

struct CsvRows {
    out: String,
    timestamp: String,
}

impl CsvRows {
    fn new(timestamp: String) -> Self {
        let mut out = String::with_capacity(4096);
        out.push_str(CSV_HEADER);
        out.push('\n');
        Self { out, timestamp }
    }

    fn row(&mut self, test_type: &str, parameter: &str, value: impl AsRef<str>) {
        for (i, field) in [test_type, parameter, value.as_ref(), self.timestamp.as_str()]
            .into_iter()
            .enumerate()
        {
            if i > 0 {
                self.out.push(',');
            }
            push_field(&mut self.out, field);
        }
        self.out.push('\n');
    }

    fn opt_row(&mut self, test_type: &str, parameter: &str, value: Option<String>) {
        if let Some(value) = value {
            self.row(test_type, parameter, value);
        }
    }
}

/// Append a field, quoting it when it holds a separator, quote or newline
fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

fn number(value: f64) -> String {
    round2(value).to_string()
}

fn with_source(value: String, source: MetricSource) -> String {
    if source.is_estimated() {
        format!("{} (estimated)", value)
    } else {
        value
    }
}

/// Flatten a report into CSV text, header first
///
/// Every row carries the report's export timestamp rather than the time its
/// measurement was taken.
pub fn to_csv(report: &Report) -> String {
    let stamp = report
        .generated_at
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut rows = CsvRows::new(stamp);

    if let Some(network) = &report.network {
        if let Some(speed) = &network.speed {
            speed_rows(&mut rows, speed);
        }
        if let Some(advanced) = &network.advanced {
            advanced_rows(&mut rows, advanced);
        }
        if let Some(ping) = &network.ping {
            ping_rows(&mut rows, ping);
        }
        if let Some(trace) = &network.traceroute {
            traceroute_rows(&mut rows, trace);
        }
    }
    if let Some(system) = &report.system {
        system_rows(&mut rows, system);
    }
    if let Some(media) = &report.media {
        media_rows(&mut rows, media);
    }
    if let Some(quick) = &report.quick_test {
        quick_test_rows(&mut rows, quick);
    }

    rows.out
}

fn speed_rows(rows: &mut CsvRows, m: &SpeedMeasurement) {
    const T: &str = "Speed Test";
    if let Some(reason) = &m.error {
        rows.row(T, "Error", reason);
    }
    rows.row(T, "Download", format!("{} Mbps", number(m.download_mbps)));
    rows.row(
        T,
        "Upload",
        with_source(format!("{} Mbps", number(m.upload_mbps)), m.upload_source),
    );
    rows.row(
        T,
        "Latency",
        with_source(format!("{}ms", number(m.latency_ms)), m.latency_source),
    );
    rows.row(
        T,
        "Jitter",
        with_source(format!("{}ms", number(m.jitter_ms)), m.jitter_source),
    );
    rows.opt_row(
        T,
        "Bandwidth Score",
        m.bandwidth_score.map(|s| format!("{}/100", number(s))),
    );
    rows.opt_row(
        T,
        "Packet Loss Rate",
        m.packet_loss_percent.map(|p| format!("{}%", number(p))),
    );
    rows.opt_row(
        T,
        "Connection Quality",
        m.connection_grade.map(|g| g.letter().to_string()),
    );
    rows.opt_row(
        T,
        "Quality Score",
        m.quality_score.map(|s| format!("{}/100", s)),
    );
    rows.row(T, "Call Readiness", m.readiness.label());
    for (i, text) in m.recommendations.iter().enumerate() {
        rows.row(T, &format!("Recommendation {}", i + 1), text);
    }
}

fn advanced_rows(rows: &mut CsvRows, a: &AdvancedSummary) {
    const T: &str = "Advanced Test";
    let mut endpoint = |name: &str, check: &EndpointCheck| {
        rows.row(
            T,
            &format!("{} Performance", name),
            format!("{}ms", check.response_time_ms),
        );
        rows.row(T, &format!("{} Status", name), check.status.label());
    };
    endpoint("DNS", &a.dns_performance);
    endpoint("HTTP", &a.http_performance);
    endpoint("HTTPS", &a.https_performance);
    endpoint("CDN", &a.cdn_performance);

    rows.row(T, "VPN Detected", a.vpn_detection.is_vpn.to_string());
    rows.row(
        T,
        "VPN Confidence",
        format!("{}%", a.vpn_detection.confidence),
    );
    rows.row(T, "VPN Reason", &a.vpn_detection.reason);
    rows.row(T, "Network Type", &a.network_type.kind);
    rows.row(T, "Network Details", &a.network_type.details);
}

fn ping_rows(rows: &mut CsvRows, s: &PingSummary) {
    const T: &str = "Ping Test";
    rows.row(T, "Host", s.target_host());
    rows.row(T, "Success Rate", format!("{}%", s.success_rate_percent()));
    rows.row(
        T,
        "Average Time",
        format!("{}ms", s.average_elapsed_ms_over_successes()),
    );
    rows.row(T, "Quality", s.quality().label());
}

fn traceroute_rows(rows: &mut CsvRows, s: &TracerouteSummary) {
    const T: &str = "Traceroute";
    rows.row(T, "Host", s.target_host());
    rows.row(T, "Total Hops", s.total_hops_attempted().to_string());
    rows.row(T, "Successful Hops", s.successful_hop_count().to_string());

    for hop in s.hops() {
        let test_type = format!("Traceroute Hop {}", hop.hop_index);
        rows.row(&test_type, "FQDN", &hop.target_host);
        rows.opt_row(
            &test_type,
            "IP Address",
            hop.resolved_address.map(|ip| ip.to_string()),
        );
        rows.row(&test_type, "Response Time", format!("{}ms", hop.elapsed_ms));
        rows.row(&test_type, "Status", hop.outcome.label());
    }
}

fn system_rows(rows: &mut CsvRows, info: &SystemInfo) {
    const T: &str = "System";
    rows.opt_row(T, "IP Address", info.ip_address());
    rows.row(T, "Platform", info.platform());
    rows.row(T, "Timezone", &info.timezone);
    rows.row(T, "CPU Cores", info.cpu_cores.to_string());
    rows.opt_row(
        T,
        "Device Memory",
        info.total_memory_gb.map(|gb| format!("{} GB", gb)),
    );
    rows.opt_row(T, "Hostname", info.hostname.clone());
    rows.row(T, "Architecture", &info.architecture);
    rows.opt_row(T, "Location", info.location.clone());
    rows.row(T, "User Agent", &info.user_agent);
}

fn media_rows(rows: &mut CsvRows, media: &MediaSummary) {
    const T: &str = "Media";
    rows.opt_row(
        T,
        "Permissions",
        media.permissions.map(|p| p.as_str().to_string()),
    );
    if let Some(devices) = &media.devices {
        rows.opt_row(T, "Microphone", devices.microphone.clone());
        rows.opt_row(T, "Camera", devices.camera.clone());
    }
    if let Some(stats) = &media.mic_stats {
        rows.row(T, "Average Volume", number(stats.average_volume));
        rows.row(T, "Peak Volume", number(stats.peak_volume));
    }
}

fn quick_test_rows(rows: &mut CsvRows, q: &QuickTestSummary) {
    const T: &str = "Quick Test";
    rows.row(T, "Network Status", &q.network_status);
    rows.row(T, "Media Status", &q.media_status);
    rows.row(T, "Overall Status", &q.overall_status);
}
