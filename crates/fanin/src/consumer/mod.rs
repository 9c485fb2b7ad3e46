//! The consuming end of the pipeline.
//!
//! In an unsynchronized pool the consumer paces producers only through
//! back-pressure: it drains the merged stream as fast as it handles items.
//!
//! In a synchronized pool every delivery must be acknowledged before its
//! producer may build the next one. [`Consumer::run_rounds`] goes further and
//! works in rounds: it first collects one delivery from every live producer,
//! hands them all to the handler, and only then releases the whole round.
//! No producer can therefore get more than one round ahead of the slowest.

use tokio_util::sync::CancellationToken;

use crate::ack::{AckOutcome, AckRouter};
use crate::error::ConsumeError;
use crate::item::{Delivery, ItemReceiver, ProducerId, delivery_origin};

/// Why a consuming loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStop {
	/// The requested number of rounds was processed.
	RoundsComplete,
	/// The cancellation token fired.
	Cancelled,
	/// Every relay has exited, so the merged stream is closed.
	StreamClosed,
	/// Every producer has exited.
	NoLiveProducers,
}

/// Totals for one consuming run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerReport {
	pub rounds: usize,
	pub delivered: u64,
	pub failures: u64,
	pub stop: ConsumerStop,
}

impl ConsumerReport {
	fn new() -> Self {
		Self {
			rounds: 0,
			delivered: 0,
			failures: 0,
			stop: ConsumerStop::RoundsComplete,
		}
	}

	fn record(&mut self, delivery: &Delivery) {
		self.delivered += 1;
		if delivery.is_err() {
			self.failures += 1;
		}
	}
}

/// Deliveries collected for one synchronized round.
#[derive(Debug)]
pub struct Round {
	/// Zero-based round number.
	pub index: usize,
	/// At most one delivery per live producer, in arrival order.
	pub deliveries: Vec<Delivery>,
	/// Set when the round ended before every live producer contributed.
	pub interrupted: Option<ConsumerStop>,
}

impl Round {
	pub fn is_complete(&self) -> bool {
		self.interrupted.is_none()
	}
}

enum RoundEvent {
	Cancelled,
	Closed,
	Delivery(Delivery),
	Gone(ProducerId),
}

/// Drains the merged stream and, in synchronized pools, routes acks.
#[derive(Debug)]
pub struct Consumer {
	merged: ItemReceiver,
	router: Option<AckRouter>,
	cancel: CancellationToken,
	live: Vec<ProducerId>,
	next_round: usize,
}

impl Consumer {
	/// Creates a consumer. Pass a router for synchronized pools, `None` otherwise.
	pub fn new(merged: ItemReceiver, router: Option<AckRouter>, cancel: CancellationToken) -> Self {
		let live = router.as_ref().map(AckRouter::live_producers).unwrap_or_default();
		Self {
			merged,
			router,
			cancel,
			live,
			next_round: 0,
		}
	}

	pub fn is_synchronized(&self) -> bool {
		self.router.is_some()
	}

	/// Producers still taking part in rounds.
	pub fn live_producers(&self) -> &[ProducerId] {
		&self.live
	}

	/// Handles every delivery until cancellation or until the merged stream
	/// closes. Synchronized pools get each delivery acknowledged right after
	/// the handler returns.
	pub async fn drain(&mut self, mut handle: impl FnMut(&Delivery)) -> Result<ConsumerReport, ConsumeError> {
		let mut report = ConsumerReport::new();
		report.stop = loop {
			let delivery = tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break ConsumerStop::Cancelled,
				maybe = self.merged.recv() => {
					let Some(delivery) = maybe else {
						break ConsumerStop::StreamClosed;
					};
					delivery
				}
			};
			report.record(&delivery);
			handle(&delivery);

			if self.router.is_some() {
				let (producer, _) = delivery_origin(&delivery);
				if !self.release(producer).await? {
					break ConsumerStop::Cancelled;
				}
			}
		};
		tracing::debug!(delivered = report.delivered, failures = report.failures, stop = ?report.stop, "fanin.consumer.drained");
		Ok(report)
	}

	/// Runs up to `rounds` synchronized rounds.
	///
	/// Stops early when cancelled, when the merged stream closes, or when no
	/// producer is left.
	pub async fn run_rounds(&mut self, rounds: usize, mut handle: impl FnMut(&Delivery)) -> Result<ConsumerReport, ConsumeError> {
		let mut report = ConsumerReport::new();
		while report.rounds < rounds {
			let round = self.collect_round().await?;
			for delivery in &round.deliveries {
				report.record(delivery);
				handle(delivery);
			}
			if round.interrupted == Some(ConsumerStop::Cancelled) {
				report.stop = ConsumerStop::Cancelled;
				break;
			}
			if !self.ack_round(&round).await? {
				report.stop = ConsumerStop::Cancelled;
				break;
			}
			if !round.deliveries.is_empty() {
				report.rounds += 1;
			}
			if let Some(stop) = round.interrupted {
				report.stop = stop;
				break;
			}
		}
		tracing::debug!(
			rounds = report.rounds,
			delivered = report.delivered,
			failures = report.failures,
			stop = ?report.stop,
			"fanin.consumer.rounds"
		);
		Ok(report)
	}

	/// Receives one delivery from every live producer without acknowledging any.
	///
	/// A producer that exits while the round is open is dropped from the live
	/// set instead of stalling the round.
	pub async fn collect_round(&mut self) -> Result<Round, ConsumeError> {
		let router = self.router.as_ref().ok_or(ConsumeError::NotSynchronized)?;
		let index = self.next_round;
		self.next_round += 1;

		let mut pending = self.live.clone();
		let mut deliveries = Vec::with_capacity(pending.len());
		let mut interrupted = pending.is_empty().then_some(ConsumerStop::NoLiveProducers);

		while !pending.is_empty() {
			let event = tokio::select! {
				biased;
				_ = self.cancel.cancelled() => RoundEvent::Cancelled,
				maybe = self.merged.recv() => maybe.map_or(RoundEvent::Closed, RoundEvent::Delivery),
				gone = router.first_gone(&pending) => RoundEvent::Gone(gone),
			};
			match event {
				RoundEvent::Delivery(delivery) => {
					let (producer, sequence) = delivery_origin(&delivery);
					let Some(slot) = pending.iter().position(|id| *id == producer) else {
						if router.contains(producer) {
							return Err(ConsumeError::DuplicateInRound { producer, sequence });
						}
						return Err(ConsumeError::UnknownProducer(producer));
					};
					pending.swap_remove(slot);
					tracing::trace!(round = index, producer = %producer, sequence, "fanin.consumer.collected");
					deliveries.push(delivery);
				}
				RoundEvent::Gone(producer) => {
					tracing::debug!(round = index, producer = %producer, "fanin.consumer.producer_gone");
					pending.retain(|id| *id != producer);
					self.live.retain(|id| *id != producer);
					if self.live.is_empty() {
						interrupted = Some(ConsumerStop::NoLiveProducers);
					}
				}
				RoundEvent::Closed => {
					interrupted = Some(ConsumerStop::StreamClosed);
					break;
				}
				RoundEvent::Cancelled => {
					interrupted = Some(ConsumerStop::Cancelled);
					break;
				}
			}
		}

		Ok(Round {
			index,
			deliveries,
			interrupted,
		})
	}

	/// Acknowledges every delivery of `round`, releasing its producers.
	///
	/// Returns `Ok(false)` when cancellation interrupted the acks.
	pub async fn ack_round(&mut self, round: &Round) -> Result<bool, ConsumeError> {
		for delivery in &round.deliveries {
			let (producer, _) = delivery_origin(delivery);
			if !self.release(producer).await? {
				return Ok(false);
			}
		}
		tracing::trace!(round = round.index, released = round.deliveries.len(), "fanin.consumer.round_acked");
		Ok(true)
	}

	async fn release(&mut self, producer: ProducerId) -> Result<bool, ConsumeError> {
		let Some(router) = self.router.as_ref() else {
			return Err(ConsumeError::NotSynchronized);
		};
		let outcome = tokio::select! {
			biased;
			_ = self.cancel.cancelled() => return Ok(false),
			outcome = router.ack(producer) => outcome,
		};
		match outcome {
			AckOutcome::Delivered => {}
			AckOutcome::ProducerGone => {
				tracing::debug!(producer = %producer, "fanin.consumer.ack_dropped");
				self.live.retain(|id| *id != producer);
			}
			AckOutcome::Unknown => return Err(ConsumeError::UnknownProducer(producer)),
		}
		Ok(true)
	}
}
