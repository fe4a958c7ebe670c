use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced while obtaining an embedding from the inference backend.
///
/// The variants keep "backend unreachable", "backend refused the request",
/// and "backend reachable but returned an unexpected shape" distinguishable,
/// so operators can tell a broken deployment from a changed contract.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The input was rejected before any network activity.
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),

    /// The image file backing the request could not be read.
    #[error("failed to read image file {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Connection-level failure talking to the backend. Never retried.
    #[error("backend transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// The backend answered with a terminal (non-503) error status.
    #[error("backend request failed with status {status}: {reason}")]
    Http { status: StatusCode, reason: String },

    /// The backend stayed unavailable through the whole retry budget.
    #[error("backend unavailable after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// The backend responded 2xx but the body did not carry a usable vector.
    #[error("unexpected backend response: {0}")]
    Decode(String),
}
