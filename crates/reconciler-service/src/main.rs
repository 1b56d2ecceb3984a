//! Entry point for the member-order reconciler.
//!
//! Loads the configuration, builds the engine from the registered backends and
//! runs a reconciliation batch, either once or on the configured interval.

use clap::Parser;
use reconciler_config::Config;
use std::path::PathBuf;

mod factory_registry;

/// Command-line arguments for the reconciler.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Run a single batch even if an interval is configured
	#[arg(long)]
	once: bool,
}

/// Runs the reconciler.
///
/// In one-shot mode the run report is printed to stdout as JSON and a failed
/// fetch makes the process exit with an error. Logs go to stderr.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	tracing::info!("Started reconciler");

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.reconciler.id);

	let engine = factory_registry::build_reconciler_from_config(config)?;

	if is_scheduled(&args, engine.config()) {
		tokio::select! {
			result = engine.run() => {
				result?;
			}
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("Received shutdown signal");
			}
		}
	} else {
		let report = engine.run_once().await?;
		println!("{}", serde_json::to_string_pretty(&report)?);
	}

	tracing::info!("Stopped reconciler");
	Ok(())
}

fn is_scheduled(args: &Args, config: &Config) -> bool {
	!args.once && config.reconciler.interval_seconds.is_some()
}
