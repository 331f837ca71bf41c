use crate::{config::ServerConfig, Homeserver};

use std::{fs::File, path::Path};

use anyhow::Context;
use tracing_subscriber::util::SubscriberInitExt;

// The async half of `run_server`. It runs after any fork, so the tokio
// runtime is created only once the process is in its final form.
async fn do_run_server(
    server_config: ServerConfig,
    import: Option<impl AsRef<Path>>,
) -> anyhow::Result<()> {
    crate::tracing_config::build_subscriber(server_config.log.clone())?.init();

    let server = Homeserver::open(server_config).await?;

    if let Some(path) = import {
        let stats = server.import(path).await?;
        tracing::info!(
            "Import done: {} committed, {} existing, {} rejected",
            stats.committed,
            stats.existing,
            stats.rejected
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Couldn't listen for interrupt")?;
    tracing::info!("Got interrupt");

    server.shutdown().await
}

/// Run a homeserver process.
///
/// Loads a [`ServerConfig`] from `server_config_path`, then, if `foreground`
/// is false, daemonises before creating the tokio runtime. Standard output and
/// error are redirected to the files named in the logging section, if any.
///
/// If `import` is given, the events it holds (one JSON object per line) are
/// written before waiting for an interrupt.
///
/// Note that this function creates a new tokio runtime. It should not be
/// called if one is already active.
pub fn run_server(
    server_config_path: impl AsRef<Path>,
    foreground: bool,
    import: Option<impl AsRef<Path>>,
) -> anyhow::Result<()> {
    // Config errors are reported before daemonising.
    let server_config = ServerConfig::load_file(&server_config_path).with_context(|| {
        format!(
            "Couldn't load config from {}",
            server_config_path.as_ref().display()
        )
    })?;

    if !server_config.log.dir.is_dir() {
        std::fs::create_dir_all(&server_config.log.dir).context("Couldn't create log directory")?;
    }

    if !foreground {
        let mut daemon = daemonize::Daemonize::new().working_directory(std::env::current_dir()?);

        if let Some(stdout) = &server_config.log.stdout {
            daemon = daemon.stdout(File::create(server_config.log.prefix_file(stdout))?);
        }
        if let Some(stderr) = &server_config.log.stderr {
            daemon = daemon.stderr(File::create(server_config.log.prefix_file(stderr))?);
        }
        if let Some(pidfile) = &server_config.log.pidfile {
            daemon = daemon.pid_file(server_config.log.prefix_file(pidfile));
        }

        println!("Running in background mode");
        daemon.start().context("Failed to fork to background")?;
    }

    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(do_run_server(server_config, import))
}
