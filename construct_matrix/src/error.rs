use thiserror::Error;

use crate::{id::InvalidId, EventId};

/// Errors raised while indexing or querying the event graph
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),
    #[error("event {0} already exists")]
    Exists(EventId),
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error("malformed entry in column '{0}'")]
    Corrupt(&'static str),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Db(#[from] construct_db::Error),
    #[error(transparent)]
    Ctx(#[from] construct_ctx::Error),
}

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }

    /// Whether this is an expected absence rather than a failure, whichever
    /// layer reported it.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Db(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Ctx(e) if e.is_interrupted())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
