use std::{convert::Infallible, fmt, path::PathBuf, str::FromStr, sync::LazyLock, time::Duration};

use regex::Regex;
use tracing::{info, instrument};

use crate::error::{Error, Result};

static REMOTE_SOURCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://").unwrap());

/// Where a playlist comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(String),
    Local(PathBuf),
}

impl Source {
    /// Classifies a user supplied source identifier.
    ///
    /// Anything that does not start with `http://` or `https://` (in any case)
    /// is treated as a path on the local filesystem.
    #[must_use]
    pub fn classify(input: &str) -> Self {
        let input = input.trim();
        if REMOTE_SOURCE_REGEX.is_match(input) {
            Self::Remote(input.to_string())
        } else {
            Self::Local(PathBuf::from(input))
        }
    }
}

impl FromStr for Source {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::classify(s))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => f.write_str(url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Reads the full playlist text behind a [`Source`]
///
/// Remote sources are fetched with `timeout`; a 4xx / 5xx status counts as a failure.
///
/// # Errors
/// [`Error::SourceUnreachable`] on network errors or error statuses,
/// [`Error::SourceUnreadable`] when a local file cannot be read as UTF-8
#[instrument(skip(client))]
pub async fn load(client: &reqwest::Client, source: &Source, timeout: Duration) -> Result<String> {
    match source {
        Source::Remote(url) => {
            info!("Fetching playlist from {url}");
            let unreachable = |source| Error::SourceUnreachable {
                url: url.clone(),
                source,
            };

            let res = client
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(unreachable)?;

            res.text().await.map_err(unreachable)
        }
        Source::Local(path) => {
            info!("Reading playlist from {}", path.display());
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| Error::SourceUnreadable {
                    path: path.clone(),
                    source,
                })
        }
    }
}
