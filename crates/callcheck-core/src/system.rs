//! Host system information
//!
//! Local facts come from `sysinfo` and the standard library. The public
//! address and rough location are looked up through the probe transport,
//! trying each service in turn until one answers.

use crate::probe::transport::ProbeTransport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Public IP lookup services with the JSON field holding the address
const PUBLIC_IP_SERVICES: &[(&str, &str)] = &[
    ("https://api.ipify.org?format=json", "ip"),
    ("https://api64.ipify.org?format=json", "ip"),
    ("https://httpbin.org/ip", "origin"),
];

/// Geolocation services with their city and country fields
const LOCATION_SERVICES: &[(&str, &str, &str)] = &[
    ("https://ipapi.co/json/", "city", "country_name"),
    ("https://ipinfo.io/json", "city", "country"),
];

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    pub architecture: String,
    pub cpu_cores: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_memory_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// UTC offset, e.g. `+02:00`
    pub timezone: String,
    pub user_agent: String,
    pub collected_at: DateTime<Utc>,
}

impl SystemInfo {
    /// Gather everything that needs no network access
    pub fn local() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let total_bytes = sys.total_memory();
        let total_memory_gb = (total_bytes > 0)
            .then(|| (total_bytes as f64 / (1024.0 * 1024.0 * 1024.0) * 10.0).round() / 10.0);

        let local_ip = match local_ip_address::local_ip() {
            Ok(ip) => Some(ip),
            Err(e) => {
                tracing::debug!(error = %e, "local_ip_unavailable");
                None
            }
        };

        Self {
            hostname: sysinfo::System::host_name(),
            os_name: sysinfo::System::name(),
            os_version: sysinfo::System::os_version(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            total_memory_gb,
            local_ip,
            public_ip: None,
            location: None,
            timezone: chrono::Local::now().offset().to_string(),
            user_agent: crate::user_agent(),
            collected_at: Utc::now(),
        }
    }

    /// `name version`, or whichever part is known
    pub fn platform(&self) -> String {
        match (&self.os_name, &self.os_version) {
            (Some(name), Some(version)) => format!("{} {}", name, version),
            (Some(name), None) => name.clone(),
            (None, Some(version)) => version.clone(),
            (None, None) => std::env::consts::OS.to_string(),
        }
    }

    /// Public address when known, otherwise the local one
    pub fn ip_address(&self) -> Option<String> {
        self.public_ip
            .clone()
            .or_else(|| self.local_ip.map(|ip| ip.to_string()))
    }
}

/// Ask each lookup service in turn for the public address
pub async fn lookup_public_ip<T: ProbeTransport>(transport: &T) -> Option<String> {
    for (url, field) in PUBLIC_IP_SERVICES {
        match transport.get_text(url, LOOKUP_TIMEOUT).await {
            Ok(body) => {
                if let Some(ip) = json_field(&body, field) {
                    tracing::debug!(service = url, "public_ip_obtained");
                    return Some(ip);
                }
            }
            Err(e) => tracing::debug!(service = url, error = %e, "public_ip_service_failed"),
        }
    }
    None
}

/// Ask each geolocation service in turn for `City, Country`
pub async fn lookup_location<T: ProbeTransport>(transport: &T) -> Option<String> {
    for (url, city_field, country_field) in LOCATION_SERVICES {
        match transport.get_text(url, LOOKUP_TIMEOUT).await {
            Ok(body) => {
                let city = json_field(&body, city_field);
                let country = json_field(&body, country_field);
                if city.is_some() || country.is_some() {
                    return Some(format!(
                        "{}, {}",
                        city.unwrap_or_else(|| "Unknown".into()),
                        country.unwrap_or_else(|| "Unknown".into())
                    ));
                }
            }
            Err(e) => tracing::debug!(service = url, error = %e, "location_service_failed"),
        }
    }
    None
}

fn json_field(body: &str, field: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Local facts plus public address and location
pub async fn collect_system_info<T: ProbeTransport>(transport: &T) -> SystemInfo {
    let mut info = SystemInfo::local();
    info.public_ip = lookup_public_ip(transport).await;
    info.location = lookup_location(transport).await;
    tracing::info!(
        platform = %info.platform(),
        cores = info.cpu_cores,
        public_ip = info.public_ip.is_some(),
        "system_info_collected"
    );
    info
}
