//! Process shell around the event graph: configuration, logging and the
//! writer pool.

pub mod config;

mod tracing_config;
pub use tracing_config::build_subscriber;

mod homeserver;
pub use homeserver::*;

pub mod run;
