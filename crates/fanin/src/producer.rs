//! Producer tasks.
//!
//! A producer loops forever (or until its item limit), building one
//! [`WorkItem`] per iteration and sending it on a private channel. The two
//! places it can block are the send, and in synchronized pools the wait for
//! an [`AckToken`](crate::AckToken); both race the cancellation token.

use std::sync::Arc;
use std::time::Duration;

use confluence_worker::{TaskClass, WorkerJoinSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::error::GeneratorFailure;
use crate::exit::{ExitReason, TaskExit, TaskKind};
use crate::generator::ValueGenerator;
use crate::item::{AckReceiver, Delivery, ItemReceiver, ItemSender, ProducerId, WorkItem, item_channel};

/// Default upper bound for the pause between two items.
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_millis(1000);

/// Everything needed to start one producer.
pub struct ProducerSpec {
	pub(crate) label: Arc<str>,
	generator: Box<dyn ValueGenerator>,
	max_sleep: Duration,
	pub(crate) seed: Option<u64>,
	limit: Option<u64>,
}

impl std::fmt::Debug for ProducerSpec {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProducerSpec")
			.field("label", &self.label)
			.field("max_sleep", &self.max_sleep)
			.field("seed", &self.seed)
			.field("limit", &self.limit)
			.finish_non_exhaustive()
	}
}

impl ProducerSpec {
	pub fn new(label: impl Into<Arc<str>>, generator: impl ValueGenerator) -> Self {
		Self {
			label: label.into(),
			generator: Box::new(generator),
			max_sleep: DEFAULT_MAX_SLEEP,
			seed: None,
			limit: None,
		}
	}

	/// Sets the upper bound of the random pause after each item. Zero disables pausing.
	#[must_use]
	pub fn max_sleep(mut self, max_sleep: Duration) -> Self {
		self.max_sleep = max_sleep;
		self
	}

	/// Seeds the pause RNG. Unseeded producers draw a seed from the OS.
	#[must_use]
	pub fn seed(mut self, seed: u64) -> Self {
		self.seed = Some(seed);
		self
	}

	/// Stops the producer after it has emitted `limit` items.
	#[must_use]
	pub fn limit(mut self, limit: u64) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn label(&self) -> &str {
		&self.label
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProducerState {
	Producing,
	AwaitingAck,
	Stopped,
}

struct Producer {
	id: ProducerId,
	label: Arc<str>,
	generator: Box<dyn ValueGenerator>,
	max_sleep: Duration,
	rng: StdRng,
	limit: Option<u64>,
	output: ItemSender,
	acks: Option<AckReceiver>,
	cancel: CancellationToken,
	state: ProducerState,
}

/// Starts one producer in `tasks` and returns the receiving end of its
/// private channel.
///
/// Passing `acks` makes the producer synchronized: after each item it waits
/// for one token before building the next.
pub fn spawn_producer(
	id: ProducerId,
	spec: ProducerSpec,
	acks: Option<AckReceiver>,
	cancel: CancellationToken,
	tasks: &mut WorkerJoinSet<TaskExit>,
) -> ItemReceiver {
	let (output, rx) = item_channel();
	let rng = match spec.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_os_rng(),
	};
	let name = format!("producer:{}", spec.label);
	let producer = Producer {
		id,
		label: spec.label,
		generator: spec.generator,
		max_sleep: spec.max_sleep,
		rng,
		limit: spec.limit,
		output,
		acks,
		cancel,
		state: ProducerState::Producing,
	};
	tasks.spawn(TaskClass::Producer, &name, producer.run());
	rx
}

impl Producer {
	async fn run(mut self) -> TaskExit {
		tracing::debug!(producer = %self.id, label = %self.label, synchronized = self.acks.is_some(), "fanin.producer.start");
		let mut sequence = 0u64;

		let reason = loop {
			if self.limit.is_some_and(|limit| sequence >= limit) {
				break ExitReason::Exhausted;
			}

			let delivery = self.fabricate(sequence);
			let sent = tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break ExitReason::Cancelled,
				res = self.output.send(delivery) => res,
			};
			if sent.is_err() {
				break ExitReason::OutputClosed;
			}
			sequence += 1;

			if let Some(pause) = self.jitter() {
				tokio::select! {
					biased;
					_ = self.cancel.cancelled() => break ExitReason::Cancelled,
					_ = tokio::time::sleep(pause) => {}
				}
			}

			if let Some(acks) = self.acks.as_mut() {
				self.state = ProducerState::AwaitingAck;
				let ack = tokio::select! {
					biased;
					_ = self.cancel.cancelled() => break ExitReason::Cancelled,
					ack = acks.recv() => ack,
				};
				if ack.is_none() {
					break ExitReason::AckClosed;
				}
				self.state = ProducerState::Producing;
			}
		};

		let previous = std::mem::replace(&mut self.state, ProducerState::Stopped);
		tracing::debug!(
			producer = %self.id,
			label = %self.label,
			reason = %reason,
			emitted = sequence,
			from = ?previous,
			"fanin.producer.exit"
		);
		TaskExit {
			task: TaskKind::Producer(self.id),
			label: self.label,
			reason,
			forwarded: sequence,
		}
	}

	fn fabricate(&mut self, sequence: u64) -> Delivery {
		match self.generator.generate(sequence) {
			Ok(payload) => {
				tracing::trace!(producer = %self.id, sequence, payload, "fanin.producer.item");
				Ok(WorkItem::new(self.id, Arc::clone(&self.label), sequence, payload))
			}
			Err(source) => {
				tracing::debug!(producer = %self.id, sequence, error = %source, "fanin.producer.generate_failed");
				Err(GeneratorFailure {
					producer: self.id,
					label: Arc::clone(&self.label),
					sequence,
					source,
				})
			}
		}
	}

	fn jitter(&mut self) -> Option<Duration> {
		if self.max_sleep.is_zero() {
			return None;
		}
		let pause = self.rng.random_range(Duration::ZERO..=self.max_sleep);
		(!pause.is_zero()).then_some(pause)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pretty_assertions::assert_eq;

	use super::*;
	use crate::error::GeneratorError;
	use crate::generator::ConstantPayload;
	use crate::item::{AckToken, ack_channel};

	const PATIENCE: Duration = Duration::from_secs(2);

	fn quick(label: &str, payload: i64) -> ProducerSpec {
		ProducerSpec::new(label, ConstantPayload(payload)).max_sleep(Duration::ZERO)
	}

	async fn next_exit(tasks: &mut WorkerJoinSet<TaskExit>) -> TaskExit {
		tokio::time::timeout(PATIENCE, tasks.join_next())
			.await
			.expect("producer should exit")
			.expect("one task in set")
			.expect("producer should not panic")
	}

	#[tokio::test]
	async fn sequences_start_at_zero_without_gaps() {
		let mut tasks = WorkerJoinSet::new();
		let mut rx = spawn_producer(ProducerId(0), quick("one", 7).limit(5), None, CancellationToken::new(), &mut tasks);

		let mut seen = Vec::new();
		while let Some(delivery) = rx.recv().await {
			let item = delivery.unwrap();
			assert_eq!(item.payload(), 7);
			assert_eq!(item.label(), "one");
			seen.push(item.sequence());
		}
		assert_eq!(seen, vec![0, 1, 2, 3, 4]);

		let exit = next_exit(&mut tasks).await;
		assert_eq!(exit.reason, ExitReason::Exhausted);
		assert_eq!(exit.forwarded, 5);
	}

	#[tokio::test]
	async fn dropped_receiver_ends_producer() {
		let mut tasks = WorkerJoinSet::new();
		let mut rx = spawn_producer(ProducerId(0), quick("one", 1), None, CancellationToken::new(), &mut tasks);
		assert!(rx.recv().await.is_some());
		drop(rx);

		let exit = next_exit(&mut tasks).await;
		assert_eq!(exit.reason, ExitReason::OutputClosed);
		assert!(!exit.reason.is_orderly());
	}

	#[tokio::test]
	async fn synchronized_producer_waits_for_ack() {
		let mut tasks = WorkerJoinSet::new();
		let (ack_tx, ack_rx) = ack_channel();
		let mut rx = spawn_producer(ProducerId(3), quick("sync", 1), Some(ack_rx), CancellationToken::new(), &mut tasks);

		let first = rx.recv().await.unwrap().unwrap();
		assert_eq!(first.sequence(), 0);
		assert_eq!(first.producer(), ProducerId(3));

		let early = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
		assert!(early.is_err(), "item 1 must not be emitted before ack 0");

		ack_tx.send(AckToken).await.unwrap();
		let second = tokio::time::timeout(PATIENCE, rx.recv()).await.unwrap().unwrap().unwrap();
		assert_eq!(second.sequence(), 1);

		drop(ack_tx);
		let exit = next_exit(&mut tasks).await;
		assert_eq!(exit.reason, ExitReason::AckClosed);
		assert_eq!(exit.forwarded, 2);
	}

	#[tokio::test]
	async fn cancellation_releases_blocked_send() {
		let mut tasks = WorkerJoinSet::new();
		let cancel = CancellationToken::new();
		// Nobody reads: the first item fills the slot, the second send blocks.
		let _rx = spawn_producer(ProducerId(0), quick("stuck", 1), None, cancel.clone(), &mut tasks);
		tokio::time::sleep(Duration::from_millis(20)).await;

		cancel.cancel();
		let exit = next_exit(&mut tasks).await;
		assert_eq!(exit.reason, ExitReason::Cancelled);
		assert_eq!(exit.forwarded, 1);
	}

	#[tokio::test]
	async fn cancellation_releases_ack_wait() {
		let mut tasks = WorkerJoinSet::new();
		let cancel = CancellationToken::new();
		let (_ack_tx, ack_rx) = ack_channel();
		let mut rx = spawn_producer(ProducerId(0), quick("waiting", 1), Some(ack_rx), cancel.clone(), &mut tasks);
		assert!(rx.recv().await.is_some());

		cancel.cancel();
		let exit = next_exit(&mut tasks).await;
		assert_eq!(exit.reason, ExitReason::Cancelled);
	}

	#[tokio::test]
	async fn cancellation_interrupts_sleep() {
		let mut tasks = WorkerJoinSet::new();
		let cancel = CancellationToken::new();
		let spec = ProducerSpec::new("sleepy", ConstantPayload(1)).max_sleep(Duration::from_secs(3600)).seed(1);
		let mut rx = spawn_producer(ProducerId(0), spec, None, cancel.clone(), &mut tasks);
		assert!(rx.recv().await.is_some());

		cancel.cancel();
		let exit = next_exit(&mut tasks).await;
		assert_eq!(exit.reason, ExitReason::Cancelled);
	}

	#[tokio::test]
	async fn generator_failures_are_delivered_in_band() {
		let mut tasks = WorkerJoinSet::new();
		let flaky = |seq: u64| -> Result<i64, GeneratorError> {
			if seq == 1 { Err(GeneratorError::new("sensor offline")) } else { Ok(seq as i64) }
		};
		let spec = ProducerSpec::new("flaky", flaky).max_sleep(Duration::ZERO).limit(3);
		let mut rx = spawn_producer(ProducerId(1), spec, None, CancellationToken::new(), &mut tasks);

		let first = rx.recv().await.unwrap();
		assert_eq!(first.unwrap().sequence(), 0);

		let failure = rx.recv().await.unwrap().unwrap_err();
		assert_eq!(failure.producer, ProducerId(1));
		assert_eq!(&*failure.label, "flaky");
		assert_eq!(failure.sequence, 1);
		assert_eq!(failure.source, GeneratorError::new("sensor offline"));

		let third = rx.recv().await.unwrap();
		assert_eq!(third.unwrap().sequence(), 2);

		let exit = next_exit(&mut tasks).await;
		assert_eq!(exit.reason, ExitReason::Exhausted);
		assert_eq!(exit.forwarded, 3);
	}
}
