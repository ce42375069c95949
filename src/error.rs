//! Typed error taxonomy threaded through every component boundary.
//!
//! Every variant maps to a retry policy decided by the caller, not by
//! whichever `match` arm happens to catch the underlying cause (see
//! SPEC_FULL.md §7 / §9).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or contradictory configuration. Fatal at startup only.
    #[error("configuration error: {0}")]
    Configuration(#[source] anyhow::Error),

    /// Connect, list, or fetch failure against the remote host. Logged
    /// and retried on the next poll/cron tick; never fatal.
    #[error("transient transport error: {0}")]
    Transient(#[source] anyhow::Error),

    /// Malformed record, unknown extension, or a structural violation
    /// of a declared format. Never aborts the calling cycle.
    #[error("decode error: {0}")]
    Decode(#[source] anyhow::Error),

    /// A batch commit to the blob store or ledger failed. The caller
    /// must not mark the source file processed.
    #[error("persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    /// Unexpected condition with no defined recovery; terminates the
    /// owning task.
    #[error("fatal error: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl IngestError {
    pub fn transient(e: impl Into<anyhow::Error>) -> Self {
        IngestError::Transient(e.into())
    }

    pub fn decode(e: impl Into<anyhow::Error>) -> Self {
        IngestError::Decode(e.into())
    }

    pub fn persistence(e: impl Into<anyhow::Error>) -> Self {
        IngestError::Persistence(e.into())
    }

    pub fn configuration(e: impl Into<anyhow::Error>) -> Self {
        IngestError::Configuration(e.into())
    }

    /// True for errors the caller should treat as "try again next cycle",
    /// as opposed to [`IngestError::Fatal`] / [`IngestError::Configuration`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::Transient(_) | IngestError::Decode(_) | IngestError::Persistence(_)
        )
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(e: rusqlite::Error) -> Self {
        IngestError::Persistence(e.into())
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Transient(e.into())
    }
}

impl From<ssh2::Error> for IngestError {
    fn from(e: ssh2::Error) -> Self {
        IngestError::Transient(e.into())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
