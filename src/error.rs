use std::path::PathBuf;

use thiserror::Error;

/// Failures that end a playlist operation
///
/// Per-entry probe failures never show up here, they are folded into
/// [`crate::probe::ProbeResult`] instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to fetch playlist from {url}")]
    SourceUnreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unable to read playlist file {}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no channels found in the playlist")]
    NoEntriesFound,

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("unable to write playlist to {}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("probe task failed")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
