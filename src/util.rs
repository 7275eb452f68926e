use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use rlimit::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sockets and files the process needs besides one socket per parallel probe
const BASE_FILE_DESCRIPTORS: u64 = 64;

/// Truncates a string to at most `max_length` bytes, adding `...` to the end if it was truncated.
///
/// Never cuts in the middle of a UTF-8 codepoint.
pub fn truncate_string(string: &impl ToString, max_length: usize) -> String {
    let string = string.to_string();
    if string.len() <= max_length {
        return string;
    }

    let mut end = max_length.saturating_sub(3);
    while !string.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &string[..end])
}

/// Warns when the open file limit is too low to keep `parallelism` probes in flight
pub fn warn_ulimit(parallelism: usize) {
    let Ok((limit, _)) = rlimit::getrlimit(Resource::NOFILE) else {
        return;
    };

    let needed = u64::try_from(parallelism)
        .unwrap_or(u64::MAX)
        .saturating_add(BASE_FILE_DESCRIPTORS);
    if limit < needed {
        warn!(
            "Your file limit ({limit}) is too low for {parallelism} parallel probes. Consider lowering `--parallelism` or raising your file limit via `ulimit -n {needed}`"
        );
    }
}

/// # Errors
/// Errors when the TLS backend cannot be initialized
pub fn init_http_client() -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        ))
        .context("Building User-Agent header")?,
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Building HTTP client")
}

/// Spawn a task that watches for CTRL + C signal and cancels a [`CancellationToken`] when caught
pub fn spawn_ct_watcher(ct: CancellationToken) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Caught CTRL+C signal!");
        ct.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_are_untouched() {
        assert_eq!(truncate_string(&"http://a", 10), "http://a");
        assert_eq!(truncate_string(&"0123456789", 10), "0123456789");
    }

    #[test]
    fn long_strings_get_an_ellipsis() {
        assert_eq!(truncate_string(&"0123456789abc", 10), "0123456...");
    }

    #[test]
    fn ulimit_check_handles_huge_parallelism() {
        warn_ulimit(usize::MAX);
        warn_ulimit(0);
    }

    #[test]
    fn truncation_respects_codepoints() {
        // Each "é" is two bytes, byte 7 is in the middle of one
        assert_eq!(truncate_string(&"ééééééé", 10), "ééé...");
    }
}
