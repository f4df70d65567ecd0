//! Errors surfaced to callers of the investigator.
//!
//! Collaborator failures never appear here; they degrade to neutral values
//! inside the pipeline.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvestigationError {
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("rate limit exceeded for client {client}, retry after {}s", retry_after.as_secs())]
    RateLimited { client: String, retry_after: Duration },

    #[error("investigation task failed: {0}")]
    Internal(String),
}

impl InvestigationError {
    /// Retry-after hint for admission errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            InvestigationError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
