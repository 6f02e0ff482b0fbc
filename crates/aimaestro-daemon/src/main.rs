//! `aimaestrod`: the daemon binary.
//!
//! Loads configuration, bootstraps every service, and waits for a shutdown
//! signal. The actual transport adapter (HTTP/WebSocket listener) lives
//! outside this crate; this binary only proves the daemon boots and winds
//! down cleanly end to end.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

/// Daemon command line arguments.
#[derive(Parser, Debug)]
#[command(name = "aimaestrod")]
#[command(about = "Aimaestro daemon: agent registry, terminals, memory, mesh")]
struct Args {
	/// Data root holding config, the host/agent registries, and per-agent state
	#[arg(long, value_name = "PATH")]
	data_root: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	tracing_subscriber::fmt()
		.with_max_level(if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
		.init();

	let data_root = args.data_root.unwrap_or_else(|| {
		std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")).join(".aimaestro")
	});

	info!(data_root = %data_root.display(), "starting aimaestrod");
	let config = aimaestro_daemon::Config::load(&data_root).await?;
	let daemon = aimaestro_daemon::Daemon::bootstrap(config).await?;
	info!("daemon bootstrapped");

	tokio::signal::ctrl_c().await?;
	info!("shutdown signal received");
	daemon.shutdown().await;

	Ok(())
}
