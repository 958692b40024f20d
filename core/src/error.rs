//! Structured error types for idlescope-core.
//!
//! A typed enum, rather than a set of sentinel error values, so callers
//! can match on error kind instead of comparing messages.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("stream broken: {0}")]
    StreamBroken(String),

    #[error("failed to parse heap profile: {0}")]
    ParseFailure(String),
}

impl CoreError {
    #[must_use]
    pub fn is_bad_argument(&self) -> bool {
        matches!(self, CoreError::BadArgument(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }
}
