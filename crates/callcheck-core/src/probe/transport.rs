//! Transport seam for timed network requests
//!
//! Every probe talks to the network through [`ProbeTransport`]. Each call
//! carries its own deadline; when the deadline expires the in-flight request
//! future is dropped (which cancels it) and the call resolves to
//! [`ProbeTransportError::Timeout`]. Nothing here ever waits unbounded.

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single timed request
///
/// These never escape a probe: ping and traceroute turn them into
/// per-attempt outcome values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeTransportError {
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Request aborted")]
    Aborted,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("Transport error: {0}")]
    Other(String),
}

impl ProbeTransportError {
    /// Whether the failure was caused by the deadline rather than the network
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Aborted)
    }
}

/// Capability to issue timed, cancellable requests to a host
///
/// Implementations must resolve every call within the supplied deadline.
pub trait ProbeTransport: Send + Sync {
    /// Lightweight request whose body is never read. Any HTTP response,
    /// whatever its status, counts as reaching the host.
    fn head(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ProbeTransportError>> + Send;

    /// Retrieve a payload and return the number of bytes received
    fn download(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<u64, ProbeTransportError>> + Send;

    /// Send `bytes` of filler data to an upload sink
    fn upload(
        &self,
        url: &str,
        bytes: usize,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ProbeTransportError>> + Send;

    /// Fetch a small text document (IP lookup services and the like)
    fn get_text(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, ProbeTransportError>> + Send;

    /// Resolve a host name to its first address, `None` when the lookup
    /// fails or outlasts `timeout`
    fn resolve(
        &self,
        host: &str,
        timeout: Duration,
    ) -> impl Future<Output = Option<IpAddr>> + Send;
}

/// Deadline for a single name lookup
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Run `fut` under a deadline, mapping expiry to [`ProbeTransportError::Timeout`]
pub async fn with_deadline<T, F>(timeout: Duration, fut: F) -> Result<T, ProbeTransportError>
where
    F: Future<Output = Result<T, ProbeTransportError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProbeTransportError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Build the URL probed for a bare host name
///
/// Hosts that already carry a scheme are used as-is.
pub fn probe_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Strip scheme, path and port from a host or URL
pub fn bare_host(host: &str) -> &str {
    let without_scheme = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    let without_path = without_scheme.split('/').next().unwrap_or(without_scheme);
    // IPv6 literals keep their colons
    if without_path.starts_with('[') {
        return without_path
            .trim_start_matches('[')
            .split(']')
            .next()
            .unwrap_or(without_path);
    }
    without_path.split(':').next().unwrap_or(without_path)
}

/// HTTP transport backed by `reqwest`
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the callcheck user agent
    pub fn new() -> Result<Self, ProbeTransportError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::user_agent())
            .build()
            .map_err(|e| ProbeTransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    /// Classify a reqwest failure; `budget` is the deadline the request ran under
    fn map_error(err: reqwest::Error, budget: Duration) -> ProbeTransportError {
        if err.is_timeout() {
            ProbeTransportError::Timeout(budget.as_millis() as u64)
        } else if err.is_connect() {
            ProbeTransportError::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            ProbeTransportError::Http(status.as_u16())
        } else {
            ProbeTransportError::Other(err.to_string())
        }
    }
}

impl ProbeTransport for HttpTransport {
    async fn head(&self, url: &str, timeout: Duration) -> Result<(), ProbeTransportError> {
        with_deadline(timeout, async {
            self.client
                .head(url)
                .timeout(timeout)
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .send()
                .await
                .map_err(|e| Self::map_error(e, timeout))?;
            Ok(())
        })
        .await
    }

    async fn download(&self, url: &str, timeout: Duration) -> Result<u64, ProbeTransportError> {
        with_deadline(timeout, async {
            let mut response = self
                .client
                .get(url)
                .timeout(timeout)
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .header(reqwest::header::PRAGMA, "no-cache")
                .send()
                .await
                .map_err(|e| Self::map_error(e, timeout))?;

            if !response.status().is_success() {
                return Err(ProbeTransportError::Http(response.status().as_u16()));
            }

            let mut received: u64 = 0;
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| Self::map_error(e, timeout))?
            {
                received += chunk.len() as u64;
            }
            Ok(received)
        })
        .await
    }

    async fn upload(
        &self,
        url: &str,
        bytes: usize,
        timeout: Duration,
    ) -> Result<(), ProbeTransportError> {
        with_deadline(timeout, async {
            let response = self
                .client
                .post(url)
                .timeout(timeout)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .body(vec![0u8; bytes])
                .send()
                .await
                .map_err(|e| Self::map_error(e, timeout))?;

            if !response.status().is_success() {
                return Err(ProbeTransportError::Http(response.status().as_u16()));
            }
            Ok(())
        })
        .await
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, ProbeTransportError> {
        with_deadline(timeout, async {
            let response = self
                .client
                .get(url)
                .timeout(timeout)
                .header(reqwest::header::ACCEPT, "application/json, text/plain")
                .send()
                .await
                .map_err(|e| Self::map_error(e, timeout))?;

            if !response.status().is_success() {
                return Err(ProbeTransportError::Http(response.status().as_u16()));
            }
            response.text().await.map_err(|e| Self::map_error(e, timeout))
        })
        .await
    }

    async fn resolve(&self, host: &str, timeout: Duration) -> Option<IpAddr> {
        let host = bare_host(host);
        match tokio::time::timeout(timeout, tokio::net::lookup_host((host, 443))).await {
            Ok(Ok(mut addrs)) => addrs.next().map(|a| a.ip()),
            Ok(Err(e)) => {
                tracing::debug!(host, error = %e, "resolve_failed");
                None
            }
            Err(_) => {
                tracing::debug!(host, timeout_ms = timeout.as_millis() as u64, "resolve_timed_out");
                None
            }
        }
    }
}
