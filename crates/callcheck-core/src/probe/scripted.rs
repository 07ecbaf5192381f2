//! Deterministic transport for tests and dry runs
//!
//! [`ScriptedTransport`] replays a queue of pre-recorded steps. A step is a
//! delay followed by either success or a transport error. Delays run on the
//! tokio timer under the caller's deadline, so a step that outlasts its
//! deadline turns into a real timeout, and under `start_paused` tests the
//! whole script runs on virtual time.

use super::transport::{with_deadline, ProbeTransport, ProbeTransportError};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted request outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    /// Time until the request settles
    pub delay: Duration,
    /// Error to return once settled, or `None` for success
    pub failure: Option<ProbeTransportError>,
}

impl ScriptStep {
    /// Succeed after `ms` milliseconds
    pub fn ok(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            failure: None,
        }
    }

    /// Fail immediately with `error`
    pub fn fail(error: ProbeTransportError) -> Self {
        Self {
            delay: Duration::ZERO,
            failure: Some(error),
        }
    }

    /// Never settle on its own; only the deadline ends it
    pub fn hang() -> Self {
        Self {
            delay: Duration::from_secs(24 * 3600),
            failure: None,
        }
    }
}

/// Kind of request seen by the scripted transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Head,
    Download,
    Upload,
    GetText,
    Resolve,
}

/// A request as recorded by [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub url: String,
    pub timeout: Option<Duration>,
}

/// Transport that replays scripted outcomes and records every call
#[derive(Debug)]
pub struct ScriptedTransport {
    head_steps: Mutex<VecDeque<ScriptStep>>,
    head_fallback: ScriptStep,
    download_step: ScriptStep,
    download_bytes: u64,
    upload_step: ScriptStep,
    texts: Vec<(String, Result<String, ProbeTransportError>)>,
    address: Option<IpAddr>,
    resolve_step: ScriptStep,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Healthy link: 20 ms HEADs, 10 Mbps download, working upload sink
    pub fn new() -> Self {
        Self {
            head_steps: Mutex::new(VecDeque::new()),
            head_fallback: ScriptStep::ok(20),
            download_step: ScriptStep::ok(1000),
            download_bytes: 1_250_000,
            upload_step: ScriptStep::ok(1000),
            texts: Vec::new(),
            address: None,
            resolve_step: ScriptStep::ok(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue HEAD outcomes, consumed one per request
    pub fn with_head_steps(self, steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        if let Ok(mut queue) = self.head_steps.lock() {
            queue.extend(steps);
        }
        self
    }

    /// Outcome for HEAD requests once the queue is drained
    pub fn with_head_fallback(mut self, step: ScriptStep) -> Self {
        self.head_fallback = step;
        self
    }

    /// Download outcome and payload size delivered on success
    pub fn with_download(mut self, bytes: u64, step: ScriptStep) -> Self {
        self.download_bytes = bytes;
        self.download_step = step;
        self
    }

    pub fn with_upload(mut self, step: ScriptStep) -> Self {
        self.upload_step = step;
        self
    }

    /// Text returned for any URL containing `url_fragment`
    pub fn with_text(
        mut self,
        url_fragment: impl Into<String>,
        response: Result<String, ProbeTransportError>,
    ) -> Self {
        self.texts.push((url_fragment.into(), response));
        self
    }

    /// Address returned by `resolve`
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    /// Outcome of name lookups; a failing or hanging step resolves to `None`
    pub fn with_resolve_step(mut self, step: ScriptStep) -> Self {
        self.resolve_step = step;
        self
    }

    /// Every request issued so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of requests of one kind issued so far
    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind == kind).count()
    }

    fn record(&self, kind: CallKind, url: &str, timeout: Option<Duration>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                kind,
                url: url.to_string(),
                timeout,
            });
        }
    }

    fn next_head_step(&self) -> ScriptStep {
        self.head_steps
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.head_fallback.clone())
    }

    async fn play<T>(step: ScriptStep, timeout: Duration, value: T) -> Result<T, ProbeTransportError>
    where
        T: Send,
    {
        with_deadline(timeout, async move {
            tokio::time::sleep(step.delay).await;
            match step.failure {
                Some(err) => Err(err),
                None => Ok(value),
            }
        })
        .await
    }
}

impl ProbeTransport for ScriptedTransport {
    async fn head(&self, url: &str, timeout: Duration) -> Result<(), ProbeTransportError> {
        self.record(CallKind::Head, url, Some(timeout));
        let step = self.next_head_step();
        Self::play(step, timeout, ()).await
    }

    async fn download(&self, url: &str, timeout: Duration) -> Result<u64, ProbeTransportError> {
        self.record(CallKind::Download, url, Some(timeout));
        Self::play(self.download_step.clone(), timeout, self.download_bytes).await
    }

    async fn upload(
        &self,
        url: &str,
        _bytes: usize,
        timeout: Duration,
    ) -> Result<(), ProbeTransportError> {
        self.record(CallKind::Upload, url, Some(timeout));
        Self::play(self.upload_step.clone(), timeout, ()).await
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, ProbeTransportError> {
        self.record(CallKind::GetText, url, Some(timeout));
        self.texts
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Err(ProbeTransportError::Http(404)))
    }

    async fn resolve(&self, host: &str, timeout: Duration) -> Option<IpAddr> {
        self.record(CallKind::Resolve, host, Some(timeout));
        Self::play(self.resolve_step.clone(), timeout, self.address)
            .await
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test(start_paused = true)]
    async fn test_head_steps_consumed_in_order() {
        let transport = ScriptedTransport::new()
            .with_head_steps([
                ScriptStep::ok(5),
                ScriptStep::fail(ProbeTransportError::Connect("refused".into())),
            ])
            .with_head_fallback(ScriptStep::ok(1));

        let timeout = Duration::from_secs(1);
        assert!(transport.head("https://a", timeout).await.is_ok());
        assert!(matches!(
            transport.head("https://a", timeout).await,
            Err(ProbeTransportError::Connect(_))
        ));
        assert!(transport.head("https://a", timeout).await.is_ok());
        assert_eq!(transport.count(CallKind::Head), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_times_out() {
        let transport = ScriptedTransport::new().with_head_steps([ScriptStep::hang()]);
        let result = transport.head("https://a", Duration::from_millis(300)).await;
        assert_eq!(result, Err(ProbeTransportError::Timeout(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_lookup_by_fragment() {
        let transport = ScriptedTransport::new()
            .with_text("ipify", Ok("203.0.113.9".into()))
            .with_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));

        let body = transport
            .get_text("https://api.ipify.org", Duration::from_secs(1))
            .await;
        assert_eq!(body.as_deref(), Ok("203.0.113.9"));
        assert!(transport
            .get_text("https://unknown.example", Duration::from_secs(1))
            .await
            .is_err());
        assert_eq!(
            transport.resolve("example.com", Duration::from_secs(1)).await,
            Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_resolve_gives_up_at_deadline() {
        let transport = ScriptedTransport::new()
            .with_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)))
            .with_resolve_step(ScriptStep::hang());
        let start = tokio::time::Instant::now();
        let address = transport
            .resolve("example.com", Duration::from_millis(500))
            .await;
        assert_eq!(address, None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
