//! Errors surfaced by the context primitives

use std::sync::Arc;
use thiserror::Error;

use crate::ContextId;

/// A captured failure, stored so that it can be re-read any number of times.
pub type Exception = Arc<anyhow::Error>;

/// Errors returned at suspension points.
///
/// [`Error::Interrupted`] is the cancellation signal. It is not a failure of
/// the operation that observed it and callers which catch errors generically
/// should check [`Error::is_interrupted`] and propagate it untouched.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("context {0} interrupted")]
    Interrupted(ContextId),
    #[error("operation timed out")]
    Timeout,
    #[error("promise dropped before it was satisfied")]
    BrokenPromise,
    #[error("future has no shared state")]
    NoState,
    #[error("{0:#}")]
    Exception(Exception),
}

impl Error {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted(_))
    }

    /// Wrap an arbitrary failure as a captured exception.
    pub fn exception(e: impl Into<anyhow::Error>) -> Self {
        Error::Exception(Arc::new(e.into()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
