use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("key {key} not found in column '{column}'")]
    NotFound { column: &'static str, key: String },
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("key of {size} bytes exceeds the limit of {max} in column '{column}'")]
    KeyTooLarge {
        column: &'static str,
        size: usize,
        max: usize,
    },
    #[error("value of {size} bytes exceeds the limit of {max} in column '{column}'")]
    ValueTooLarge {
        column: &'static str,
        size: usize,
        max: usize,
    },
    #[error("transaction of {size} bytes exceeds the limit of {max}")]
    TxnTooLarge { size: usize, max: usize },
    #[error("range end precedes its start in column '{0}'")]
    InvalidRange(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] bincode::Error),
}

impl Error {
    pub fn not_found(column: &'static str, key: &[u8]) -> Self {
        Error::NotFound {
            column,
            key: hex::encode(key),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
