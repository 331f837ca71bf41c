use serde::Deserialize;

/// Size limits enforced when a transaction is committed
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbOpts {
    pub max_key_size: usize,
    pub max_value_size: usize,
    pub max_txn_size: usize,
}

impl Default for DbOpts {
    fn default() -> Self {
        Self {
            max_key_size: 8 * 1024,
            max_value_size: 64 * 1024 * 1024,
            max_txn_size: 256 * 1024 * 1024,
        }
    }
}
