use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Server config file location
    #[arg(short, long)]
    server_conf: PathBuf,

    /// File of events to write on startup, one JSON object per line
    #[arg(short, long)]
    import: Option<PathBuf>,

    /// Run in foreground without daemonising
    #[arg(short, long)]
    foreground: bool,
}

/// Main entry point.
///
/// Because the tokio runtime can't survive forking, the config is loaded and
/// the process daemonised before the runtime starts; see
/// [`construct_server::run::run_server`].
pub fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    construct_server::run::run_server(args.server_conf, args.foreground, args.import)
}
