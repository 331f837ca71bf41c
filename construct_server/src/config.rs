use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use construct_ctx::DEFAULT_STACK_SIZE;
use construct_db::DbOpts;
use construct_matrix::DbsConfig;
use serde::{Deserialize, Serialize};
use tracing_core::LevelFilter;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinLogTarget {
    Stdout,
    Stderr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogTarget {
    File { filename: PathBuf },
    Builtin(BuiltinLogTarget),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LogEntry {
    pub target: LogTarget,
    #[serde(default)]
    pub modules: Vec<String>,
    pub level: Option<LogLevel>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    pub pidfile: Option<PathBuf>,
    pub default_level: Option<LogLevel>,
    #[serde(default)]
    pub module_levels: HashMap<String, LogLevel>,
    pub targets: Vec<LogEntry>,
}

impl LoggingConfig {
    pub fn prefix_file(&self, filename: impl AsRef<Path>) -> PathBuf {
        self.dir.join(filename)
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(arg: LogLevel) -> LevelFilter {
        match arg {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// Where the column store lives between runs
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DbConfig {
    /// Saved on shutdown and restored on start; without it the store is
    /// memory only.
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub opts: DbOpts,
}

/// Sizing of the writer pool
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CtxConfig {
    pub pool_name: String,
    pub pool_size: usize,
    pub stack_size: usize,
    pub queue_max: Option<usize>,
    /// Events in flight at once while injecting
    pub concurrent: usize,
}

impl Default for CtxConfig {
    fn default() -> Self {
        Self {
            pool_name: "writer".to_string(),
            pool_size: 4,
            stack_size: DEFAULT_STACK_SIZE,
            queue_max: None,
            concurrent: 16,
        }
    }
}

/// Configuration for a homeserver process
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    pub server_name: String,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub ctx: CtxConfig,
    #[serde(default)]
    pub dbs: DbsConfig,
    pub log: LoggingConfig,
}

impl ServerConfig {
    /// Load configuration from a file
    pub fn load_file<P: AsRef<Path>>(filename: P) -> Result<Self, anyhow::Error> {
        let mut file = File::open(filename)?;
        let mut config = String::new();
        file.read_to_string(&mut config)?;
        Ok(json5::from_str(&config)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sample_config_parses() {
        let conf: ServerConfig =
            json5::from_str(include_str!("../../configs/constructd.conf")).unwrap();

        assert_eq!(conf.server_name, "example.org");
        assert_eq!(conf.ctx.pool_size, 4);
        assert_eq!(conf.db.opts.max_key_size, 8 * 1024);
        assert!(conf.dbs.prefetch_enable);
        assert_eq!(conf.log.default_level, Some(LogLevel::Debug));
        assert_eq!(conf.log.targets.len(), 2);
    }
}
