//! Plain-text output for the command line

use callcheck_core::media::MediaSummary;
use callcheck_core::probe::advanced::AdvancedSummary;
use callcheck_core::probe::speed::MetricSource;
use callcheck_core::quick::QuickTestSummary;
use callcheck_core::system::SystemInfo;
use callcheck_core::{PingSummary, SpeedMeasurement, TracerouteSummary};
use std::fmt::Write;

fn estimated(source: MetricSource) -> &'static str {
    if source.is_estimated() {
        " (estimated)"
    } else {
        ""
    }
}

pub fn ping(summary: &PingSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Ping {}", summary.target_host());
    for (i, sample) in summary.samples().iter().enumerate() {
        match &sample.error_detail {
            None => {
                let _ = writeln!(out, "  {:>2}. {} ms", i + 1, sample.elapsed_ms);
            }
            Some(detail) => {
                let _ = writeln!(out, "  {:>2}. failed: {}", i + 1, detail);
            }
        }
    }
    let _ = writeln!(
        out,
        "Success rate: {}%  Average: {} ms  Quality: {}",
        summary.success_rate_percent(),
        summary.average_elapsed_ms_over_successes(),
        summary.quality().label()
    );
    out
}

pub fn traceroute(summary: &TracerouteSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Traceroute {}", summary.target_host());
    for hop in summary.hops() {
        let address = hop
            .resolved_address
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "*".to_string());
        let _ = writeln!(
            out,
            "  {:>2}. {:<40} {:>6} ms  {}",
            hop.hop_index,
            address,
            hop.elapsed_ms,
            hop.outcome.label()
        );
    }
    let _ = writeln!(
        out,
        "Hops: {} attempted, {} successful",
        summary.total_hops_attempted(),
        summary.successful_hop_count()
    );
    out
}

pub fn speed(m: &SpeedMeasurement) -> String {
    let mut out = String::new();
    if let Some(reason) = &m.error {
        let _ = writeln!(out, "Speed test failed: {}", reason);
    } else {
        let _ = writeln!(out, "Download: {:.2} Mbps", m.download_mbps);
        let _ = writeln!(
            out,
            "Upload:   {:.2} Mbps{}",
            m.upload_mbps,
            estimated(m.upload_source)
        );
        let _ = writeln!(
            out,
            "Latency:  {:.0} ms{}",
            m.latency_ms,
            estimated(m.latency_source)
        );
        let _ = writeln!(
            out,
            "Jitter:   {:.1} ms{}",
            m.jitter_ms,
            estimated(m.jitter_source)
        );
        if let Some(loss) = m.packet_loss_percent {
            let _ = writeln!(out, "Loss:     {:.0}%", loss);
        }
    }
    if let (Some(score), Some(grade)) = (m.quality_score, m.connection_grade) {
        let _ = writeln!(out, "Quality:  {}/100 (grade {})", score, grade.letter());
    }
    let _ = writeln!(out, "Verdict:  {}", m.readiness.label());
    for text in &m.recommendations {
        let _ = writeln!(out, "  - {}", text);
    }
    out
}

pub fn advanced(summary: &AdvancedSummary) -> String {
    let mut out = String::new();
    for (name, check) in [
        ("DNS", &summary.dns_performance),
        ("HTTP", &summary.http_performance),
        ("HTTPS", &summary.https_performance),
        ("CDN", &summary.cdn_performance),
    ] {
        let _ = writeln!(
            out,
            "{:<6} {:>6} ms  {}",
            name,
            check.response_time_ms,
            check.status.label()
        );
    }
    let vpn = &summary.vpn_detection;
    let _ = writeln!(
        out,
        "VPN:    {} ({}% confidence, {})",
        if vpn.is_vpn { "detected" } else { "not detected" },
        vpn.confidence,
        vpn.reason
    );
    let _ = writeln!(
        out,
        "Network: {} - {}",
        summary.network_type.kind, summary.network_type.details
    );
    out
}

pub fn system(info: &SystemInfo) -> String {
    let mut out = String::new();
    let unknown = || "Unknown".to_string();
    let _ = writeln!(out, "Platform:   {}", info.platform());
    let _ = writeln!(out, "Hostname:   {}", info.hostname.clone().unwrap_or_else(unknown));
    let _ = writeln!(out, "CPU cores:  {}", info.cpu_cores);
    if let Some(gb) = info.total_memory_gb {
        let _ = writeln!(out, "Memory:     {} GB", gb);
    }
    let _ = writeln!(out, "IP address: {}", info.ip_address().unwrap_or_else(unknown));
    let _ = writeln!(out, "Location:   {}", info.location.clone().unwrap_or_else(unknown));
    let _ = writeln!(out, "Timezone:   UTC{}", info.timezone);
    out
}

pub fn media(summary: &MediaSummary) -> String {
    let mut out = String::new();
    if let Some(mic) = summary.devices.as_ref().and_then(|d| d.microphone.as_ref()) {
        let _ = writeln!(out, "Microphone: {}", mic);
    }
    if let Some(stats) = &summary.mic_stats {
        let _ = writeln!(
            out,
            "Samples: {}  Average: {:.1}%  Peak: {:.1}%",
            stats.samples.len(),
            stats.average_volume,
            stats.peak_volume
        );
    }
    let _ = writeln!(out, "Status: {}", summary.status());
    out
}

pub fn quick(summary: &QuickTestSummary) -> String {
    format!(
        "Network: {}\nMedia:   {}\nOverall: {}\n",
        summary.network_status, summary.media_status, summary.overall_status
    )
}
