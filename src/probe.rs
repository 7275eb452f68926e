use std::{
    future::Future,
    time::{Duration, Instant},
};

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::playlist::PlaylistEntry;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a single stream probe did not succeed
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("responded with status {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Request(reqwest::Error),
}

/// Checks a stream endpoint
pub trait Prober: Send + Sync + 'static {
    /// Succeeds when the endpoint answers with any status in `[200, 400)`
    fn check(&self, url: &str) -> impl Future<Output = Result<(), ProbeError>> + Send;

    /// Time taken for the endpoint to answer with a success status
    fn time(&self, url: &str) -> impl Future<Output = Result<Duration, ProbeError>> + Send;
}

/// [`Prober`] that issues a `GET` per probe without reading the response body
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    #[must_use]
    pub const fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn request(&self, url: &str) -> Result<reqwest::Response, ProbeError> {
        self.client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(self.timeout)
                } else {
                    ProbeError::Request(e)
                }
            })
    }
}

impl Prober for HttpProber {
    #[instrument(skip(self))]
    async fn check(&self, url: &str) -> Result<(), ProbeError> {
        let status = self.request(url).await?.status();
        if (200..400).contains(&status.as_u16()) {
            Ok(())
        } else {
            Err(ProbeError::Status(status))
        }
    }

    #[instrument(skip(self))]
    async fn time(&self, url: &str) -> Result<Duration, ProbeError> {
        let start = Instant::now();
        let status = self.request(url).await?.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status));
        }
        Ok(start.elapsed())
    }
}

/// Which probe to run against every entry of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    Availability,
    Latency,
}

impl ProbeMode {
    pub async fn run<P: Prober>(self, prober: &P, entry: PlaylistEntry) -> ProbeResult {
        match self {
            Self::Availability => {
                let outcome = prober.check(&entry.url).await;
                if let Err(e) = &outcome {
                    debug!("{} is not available: {e}", entry.url);
                }
                ProbeResult {
                    available: outcome.is_ok(),
                    latency: None,
                    entry,
                }
            }
            Self::Latency => {
                let outcome = prober.time(&entry.url).await;
                if let Err(e) = &outcome {
                    debug!("{} has no latency measurement: {e}", entry.url);
                }
                ProbeResult {
                    available: outcome.is_ok(),
                    latency: outcome.ok(),
                    entry,
                }
            }
        }
    }
}

/// An entry annotated with the outcome of its probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub entry: PlaylistEntry,
    pub available: bool,
    /// `None` when no successful measurement was taken, never zero as a stand-in
    pub latency: Option<Duration>,
}
