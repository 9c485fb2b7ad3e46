//! Routing of acknowledgment tokens back to producers.

use rustc_hash::FxHashMap;

use crate::item::{AckSender, AckToken, ProducerId};

/// Result of routing one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
	/// The producer's ack slot accepted the token.
	Delivered,
	/// The producer has exited; nobody will ever read the token.
	ProducerGone,
	/// No route exists for this producer.
	Unknown,
}

/// Fixed map from producer to the sending half of its ack channel.
///
/// Built once before any producer starts and never mutated afterwards, so
/// the consumer reads it without locking.
#[derive(Debug, Default)]
pub struct AckRouter {
	routes: FxHashMap<ProducerId, AckSender>,
}

impl FromIterator<(ProducerId, AckSender)> for AckRouter {
	fn from_iter<I: IntoIterator<Item = (ProducerId, AckSender)>>(iter: I) -> Self {
		Self {
			routes: iter.into_iter().collect(),
		}
	}
}

impl AckRouter {
	pub fn len(&self) -> usize {
		self.routes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.routes.is_empty()
	}

	pub fn contains(&self, producer: ProducerId) -> bool {
		self.routes.contains_key(&producer)
	}

	/// Producers whose ack channel is still read by a running producer, in id order.
	pub fn live_producers(&self) -> Vec<ProducerId> {
		let mut live: Vec<_> = self.routes.iter().filter(|(_, tx)| !tx.is_closed()).map(|(id, _)| *id).collect();
		live.sort_unstable();
		live
	}

	/// Sends one token to `producer`, waiting for its slot if needed.
	pub async fn ack(&self, producer: ProducerId) -> AckOutcome {
		let Some(tx) = self.routes.get(&producer) else {
			return AckOutcome::Unknown;
		};
		match tx.send(AckToken).await {
			Ok(()) => {
				tracing::trace!(producer = %producer, "fanin.ack.sent");
				AckOutcome::Delivered
			}
			Err(_) => AckOutcome::ProducerGone,
		}
	}

	/// Resolves with the first of `producers` whose task has dropped its ack receiver.
	///
	/// Never resolves when none of them is routed here.
	pub(crate) async fn first_gone(&self, producers: &[ProducerId]) -> ProducerId {
		let waits: Vec<_> = producers
			.iter()
			.filter_map(|id| self.routes.get(id).map(|tx| (*id, tx)))
			.map(|(id, tx)| {
				Box::pin(async move {
					tx.closed().await;
					id
				})
			})
			.collect();
		if waits.is_empty() {
			return std::future::pending().await;
		}
		let (id, _, _) = futures::future::select_all(waits).await;
		id
	}
}
