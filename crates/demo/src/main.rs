//! Confluence demonstration binary.
//!
//! Spawns one producer per configured label and prints every item as it
//! reaches the consumer:
//! - synchronized mode runs the configured number of rounds, then shuts the
//!   pool down;
//! - unsynchronized mode drains until Ctrl-C, then shuts the pool down.
//!
//! The configuration file is read from `$CONFLUENCE_CONFIG` when set.

use std::path::PathBuf;

use confluence_fanin::{Delivery, Mode, PoolBuilder, PoolConfig};
use confluence_worker::TaskClass;
use tracing::{debug, info, warn};

const CONFIG_ENV: &str = "CONFLUENCE_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	setup_tracing();

	let config = match std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
		Some(path) => {
			info!(path = %path.display(), "loading configuration");
			PoolConfig::load(&path)?
		}
		None => PoolConfig::default(),
	};
	info!(mode = ?config.mode, producers = ?config.producers, seed = ?config.seed, "confluence.demo.start");

	let mut pool = PoolBuilder::from_config(&config)?.build();
	let report = match pool.mode() {
		Mode::Synchronized => pool.consumer().run_rounds(config.rounds, print_delivery).await?,
		Mode::Unsynchronized => {
			let cancel = pool.cancellation_token();
			let _interrupt = confluence_worker::spawn(TaskClass::Control, "ctrl-c", async move {
				tokio::select! {
					_ = cancel.cancelled() => {}
					res = tokio::signal::ctrl_c() => {
						if res.is_ok() {
							info!("interrupt received, stopping producers");
						}
						cancel.cancel();
					}
				}
			});
			pool.consumer().drain(print_delivery).await?
		}
	};
	info!(rounds = report.rounds, delivered = report.delivered, failures = report.failures, stop = ?report.stop, "confluence.demo.consumed");

	let early = pool.reap();
	for exit in &early.exits {
		debug!(task = ?exit.task, label = %exit.label, reason = %exit.reason, "task ended before shutdown");
	}

	let exits = pool.shutdown(config.shutdown_timeout()).await;
	for exit in &exits.exits {
		debug!(task = ?exit.task, label = %exit.label, reason = %exit.reason, forwarded = exit.forwarded, "task joined");
	}
	if !exits.is_clean() {
		warn!(panicked = ?exits.panicked, aborted = exits.aborted, "pool did not shut down cleanly");
		return Err(format!("{} task(s) panicked, {} aborted", exits.panicked.len(), exits.aborted).into());
	}
	info!("confluence.demo.done");
	Ok(())
}

fn print_delivery(delivery: &Delivery) {
	match delivery {
		Ok(item) => println!("{item}"),
		Err(failure) => eprintln!("{failure}"),
	}
}

fn setup_tracing() {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("confluence=info"));
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(true).init();
}
