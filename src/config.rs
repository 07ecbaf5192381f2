//! Persistent application configuration
//!
//! Probe targets, payload sizes, sampling and server settings in a JSON file
//! at `<data_dir>/callcheck/config.json`. Every field has a default, so a
//! partial or empty file loads.

use callcheck_core::media::DEFAULT_SAMPLE_PERIOD;
use callcheck_core::probe::advanced::{AdvancedConfig, ENDPOINT_TIMEOUT};
use callcheck_core::probe::ping::{
    PingConfig, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_INTER_SAMPLE_DELAY, DEFAULT_PING_COUNT,
};
use callcheck_core::probe::speed::{
    SpeedConfig, DEFAULT_DOWNLOAD_BYTES, DEFAULT_LOSS_ATTEMPTS, DEFAULT_UPLOAD_BYTES,
};
use callcheck_core::probe::traceroute::{TracerouteConfig, DEFAULT_MAX_HOPS};
use callcheck_core::DEFAULT_PROBE_HOST;
use callcheck_server::{ProbeSettings, ServerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_host() -> String {
    DEFAULT_PROBE_HOST.to_string()
}

fn default_ping_count() -> u32 {
    DEFAULT_PING_COUNT
}

fn default_inter_sample_delay_ms() -> u64 {
    DEFAULT_INTER_SAMPLE_DELAY.as_millis() as u64
}

fn default_attempt_timeout_ms() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT.as_millis() as u64
}

fn default_max_hops() -> u32 {
    DEFAULT_MAX_HOPS
}

fn default_download_url() -> String {
    SpeedConfig::default().download_base_url
}

fn default_download_bytes() -> u64 {
    DEFAULT_DOWNLOAD_BYTES
}

fn default_upload_url() -> String {
    SpeedConfig::default().upload_url
}

fn default_upload_bytes() -> usize {
    DEFAULT_UPLOAD_BYTES
}

fn default_loss_attempts() -> u32 {
    DEFAULT_LOSS_ATTEMPTS
}

fn default_advanced_timeout_ms() -> u64 {
    ENDPOINT_TIMEOUT.as_millis() as u64
}

fn default_mic_sample_period_ms() -> u64 {
    DEFAULT_SAMPLE_PERIOD.as_millis() as u64
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8930
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host probed by ping
    #[serde(default = "default_host")]
    pub ping_host: String,
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    /// Gap between ping attempts in milliseconds
    #[serde(default = "default_inter_sample_delay_ms")]
    pub inter_sample_delay_ms: u64,
    /// Per-attempt deadline in milliseconds
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_host")]
    pub traceroute_host: String,
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    /// Payload endpoint; the size is appended as a query parameter
    #[serde(default = "default_download_url")]
    pub download_url: String,
    #[serde(default = "default_download_bytes")]
    pub download_bytes: u64,
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    #[serde(default = "default_upload_bytes")]
    pub upload_bytes: usize,
    /// HEAD requests in the packet-loss series
    #[serde(default = "default_loss_attempts")]
    pub loss_attempts: u32,
    /// Deadline for each advanced endpoint check in milliseconds
    #[serde(default = "default_advanced_timeout_ms")]
    pub advanced_timeout_ms: u64,
    #[serde(default = "default_mic_sample_period_ms")]
    pub mic_sample_period_ms: u64,
    /// Preferred capture device (None = system default)
    #[serde(default)]
    pub mic_device: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory for daily log files (None = console only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ping_host: default_host(),
            ping_count: default_ping_count(),
            inter_sample_delay_ms: default_inter_sample_delay_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            traceroute_host: default_host(),
            max_hops: default_max_hops(),
            download_url: default_download_url(),
            download_bytes: default_download_bytes(),
            upload_url: default_upload_url(),
            upload_bytes: default_upload_bytes(),
            loss_attempts: default_loss_attempts(),
            advanced_timeout_ms: default_advanced_timeout_ms(),
            mic_sample_period_ms: default_mic_sample_period_ms(),
            mic_device: None,
            bind_addr: default_bind_addr(),
            port: default_port(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Config file path: `<data_dir>/callcheck/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("callcheck")
            .join("config.json")
    }

    /// Load config from the default path
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    pub fn ping_config(&self) -> PingConfig {
        PingConfig {
            target_host: self.ping_host.clone(),
            count: self.ping_count.max(1),
            inter_sample_delay: Duration::from_millis(self.inter_sample_delay_ms),
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
        }
    }

    pub fn traceroute_config(&self) -> TracerouteConfig {
        TracerouteConfig::new(self.traceroute_host.clone()).with_max_hops(self.max_hops.max(1))
    }

    pub fn speed_config(&self) -> SpeedConfig {
        SpeedConfig {
            download_base_url: self.download_url.clone(),
            download_bytes: self.download_bytes,
            upload_url: self.upload_url.clone(),
            upload_bytes: self.upload_bytes,
            loss_attempts: self.loss_attempts.max(1),
            ..SpeedConfig::default()
        }
    }

    pub fn advanced_config(&self) -> AdvancedConfig {
        AdvancedConfig {
            timeout: Duration::from_millis(self.advanced_timeout_ms.max(1)),
            ..AdvancedConfig::default()
        }
    }

    pub fn mic_sample_period(&self) -> Duration {
        Duration::from_millis(self.mic_sample_period_ms.max(1))
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            bind_addr: self.bind_addr.clone(),
            probes: ProbeSettings {
                ping: self.ping_config(),
                traceroute: self.traceroute_config(),
                speed: self.speed_config(),
                advanced: self.advanced_config(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.ping_host, "www.microsoft.com");
        assert_eq!(config.ping_count, 4);
        assert_eq!(config.inter_sample_delay_ms, 500);
        assert_eq!(config.attempt_timeout_ms, 10_000);
        assert_eq!(config.max_hops, 15);
        assert_eq!(config.download_bytes, 25 * 1024 * 1024);
        assert_eq!(config.upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.loss_attempts, 10);
        assert_eq!(config.advanced_timeout_ms, 10_000);
        assert_eq!(config.mic_sample_period_ms, 16);
        assert_eq!(config.port, 8930);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"ping_host": "example.com", "ping_count": 8}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ping_host, "example.com");
        assert_eq!(config.ping_count, 8);
        assert_eq!(config.traceroute_host, "www.microsoft.com");
        assert_eq!(config.max_hops, 15);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = AppConfig {
            ping_host: "example.org".to_string(),
            log_dir: Some(dir.path().join("logs")),
            ..AppConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path), config);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn test_probe_configs_follow_settings() {
        let config = AppConfig {
            ping_count: 0,
            inter_sample_delay_ms: 100,
            download_bytes: 1_000_000,
            max_hops: 5,
            advanced_timeout_ms: 0,
            ..AppConfig::default()
        };
        let ping = config.ping_config();
        assert_eq!(ping.count, 1);
        assert_eq!(ping.inter_sample_delay, Duration::from_millis(100));
        assert_eq!(config.traceroute_config().max_hops, 5);
        assert_eq!(
            config.speed_config().download_url(),
            "https://speed.cloudflare.com/__down?bytes=1000000"
        );
        assert_eq!(config.server_config().probes.traceroute.max_hops, 5);
        assert_eq!(config.advanced_config().timeout, Duration::from_millis(1));
    }
}
