//! Pool assembly and shutdown.
//!
//! [`PoolBuilder::build`] wires everything in a fixed order: ack channels
//! and the [`AckRouter`] first, then producers, then the merger. The router
//! is complete before the first producer runs and is never touched again.
//!
//! [`Pool::shutdown`] replaces "sleep, then kill the process": it cancels
//! every task, joins them under a deadline and reports how each one ended.

use std::sync::Arc;
use std::time::Duration;

use confluence_worker::WorkerJoinSet;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::ack::AckRouter;
use crate::config::PoolConfig;
use crate::consumer::Consumer;
use crate::error::ConfigError;
use crate::exit::TaskExit;
use crate::generator::RandomPayload;
use crate::item::{AckReceiver, ProducerId, ack_channel};
use crate::merge::merge;
use crate::producer::{ProducerSpec, spawn_producer};

/// Whether producers wait for acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
	/// Each producer waits for an ack after every item.
	#[default]
	Synchronized,
	/// Producers are paced only by channel back-pressure.
	Unsynchronized,
}

/// Collects producer specs before anything is spawned.
#[derive(Debug, Default)]
pub struct PoolBuilder {
	mode: Mode,
	seed: Option<u64>,
	producers: Vec<ProducerSpec>,
}

impl PoolBuilder {
	pub fn new(mode: Mode) -> Self {
		Self {
			mode,
			..Self::default()
		}
	}

	/// Builds a pool of random-payload producers described by `config`.
	///
	/// The config is validated first, since its fields are public.
	pub fn from_config(config: &PoolConfig) -> Result<Self, ConfigError> {
		config.validate()?;
		let mut builder = Self::new(config.mode);
		if let Some(seed) = config.seed {
			builder = builder.seed(seed);
		}
		for (index, label) in config.producers.iter().enumerate() {
			let payload_seed = config.seed.map_or_else(rand::random, |seed| derive_seed(seed, index, 1));
			let spec = ProducerSpec::new(label.as_str(), RandomPayload::new(config.payload_bound, payload_seed)).max_sleep(config.max_sleep());
			builder = builder.producer(spec);
		}
		Ok(builder)
	}

	/// Base seed for producers that were not seeded individually.
	#[must_use]
	pub fn seed(mut self, seed: u64) -> Self {
		self.seed = Some(seed);
		self
	}

	#[must_use]
	pub fn producer(mut self, spec: ProducerSpec) -> Self {
		self.producers.push(spec);
		self
	}

	/// Spawns every task. Must be called inside a Tokio runtime.
	pub fn build(self) -> Pool {
		let cancel = CancellationToken::new();
		let mut tasks = WorkerJoinSet::new();
		let count = self.producers.len();

		let (router, mut ack_rxs): (Option<AckRouter>, Vec<Option<AckReceiver>>) = match self.mode {
			Mode::Synchronized => {
				let (txs, rxs): (Vec<_>, Vec<_>) = (0..count).map(|_| ack_channel()).unzip();
				let router: AckRouter = txs.into_iter().enumerate().map(|(index, tx)| (ProducerId(index), tx)).collect();
				(Some(router), rxs.into_iter().map(Some).collect())
			}
			Mode::Unsynchronized => (None, (0..count).map(|_| None).collect()),
		};

		let mut labels = Vec::with_capacity(count);
		let mut inputs = Vec::with_capacity(count);
		for (index, mut spec) in self.producers.into_iter().enumerate() {
			if spec.seed.is_none()
				&& let Some(seed) = self.seed
			{
				spec.seed = Some(derive_seed(seed, index, 0));
			}
			labels.push(Arc::clone(&spec.label));
			let acks = ack_rxs[index].take();
			inputs.push(spawn_producer(ProducerId(index), spec, acks, cancel.child_token(), &mut tasks));
		}
		let merged = merge(inputs, &cancel, &mut tasks);

		tracing::info!(mode = ?self.mode, producers = count, tasks = tasks.len(), "fanin.pool.started");
		Pool {
			mode: self.mode,
			labels,
			consumer: Consumer::new(merged, router, cancel.clone()),
			tasks,
			cancel,
		}
	}
}

/// Independent per-producer seeds from one base seed.
fn derive_seed(base: u64, index: usize, stream: u64) -> u64 {
	base ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ stream.rotate_left(32)
}

/// How some or all of the pool's tasks ended.
#[derive(Debug, Default)]
pub struct ExitReport {
	/// Exit summaries of tasks that returned, in completion order.
	pub exits: Vec<TaskExit>,
	/// Panic messages of tasks that panicked.
	pub panicked: Vec<String>,
	/// Tasks still running at the deadline, aborted.
	pub aborted: usize,
}

impl ExitReport {
	/// Every task returned on its own before the deadline.
	pub fn is_clean(&self) -> bool {
		self.panicked.is_empty() && self.aborted == 0
	}
}

/// A running pool: producers and relays in the background, the consumer in
/// the hands of the caller.
#[derive(Debug)]
pub struct Pool {
	mode: Mode,
	labels: Vec<Arc<str>>,
	consumer: Consumer,
	tasks: WorkerJoinSet<TaskExit>,
	cancel: CancellationToken,
}

impl Drop for Pool {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

impl Pool {
	pub fn builder(mode: Mode) -> PoolBuilder {
		PoolBuilder::new(mode)
	}

	pub fn mode(&self) -> Mode {
		self.mode
	}

	pub fn producer_count(&self) -> usize {
		self.labels.len()
	}

	pub fn label(&self, producer: ProducerId) -> Option<&str> {
		self.labels.get(producer.index()).map(|label| &**label)
	}

	/// Number of producer and relay tasks not yet reaped.
	pub fn running_tasks(&self) -> usize {
		self.tasks.len()
	}

	/// Token that stops every task of this pool when cancelled.
	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	pub fn consumer(&mut self) -> &mut Consumer {
		&mut self.consumer
	}

	/// Collects the exits of tasks that already ended, without waiting.
	///
	/// Lets the controller notice a producer that stopped mid-run.
	pub fn reap(&mut self) -> ExitReport {
		let drained = self.tasks.try_drain();
		for exit in drained.completed.iter().filter(|exit| !exit.reason.is_orderly()) {
			tracing::warn!(task = ?exit.task, label = %exit.label, reason = %exit.reason, "fanin.pool.task_failed");
		}
		ExitReport {
			exits: drained.completed,
			panicked: drained.panicked,
			aborted: drained.aborted,
		}
	}

	/// Cancels every task and joins them, aborting those still running after `timeout`.
	pub async fn shutdown(mut self, timeout: Duration) -> ExitReport {
		self.cancel.cancel();
		let drained = self.tasks.drain(timeout).await;
		let report = ExitReport {
			exits: drained.completed,
			panicked: drained.panicked,
			aborted: drained.aborted,
		};
		if report.is_clean() {
			tracing::info!(joined = report.exits.len(), "fanin.pool.shutdown");
		} else {
			tracing::warn!(joined = report.exits.len(), panicked = report.panicked.len(), aborted = report.aborted, "fanin.pool.shutdown_unclean");
		}
		report
	}
}
