//! Values that travel through the pipeline.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::GeneratorFailure;

/// Capacity of every producer, merged and ack channel.
///
/// One slot means a producer is never more than one item ahead of the relay
/// draining it, and a relay never more than one ahead of the consumer.
pub const CHANNEL_CAPACITY: usize = 1;

/// Opaque producer handle, assigned in spawn order by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId(pub(crate) usize);

impl ProducerId {
	pub const fn new(index: usize) -> Self {
		Self(index)
	}

	pub const fn index(self) -> usize {
		self.0
	}
}

impl fmt::Display for ProducerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "p{}", self.0)
	}
}

/// One unit of work, owned by exactly one task at a time.
///
/// Fields are fixed when the producer builds the item; there are no setters.
#[derive(Debug, PartialEq, Eq)]
pub struct WorkItem {
	producer: ProducerId,
	label: Arc<str>,
	sequence: u64,
	payload: i64,
}

impl WorkItem {
	pub(crate) fn new(producer: ProducerId, label: Arc<str>, sequence: u64, payload: i64) -> Self {
		Self {
			producer,
			label,
			sequence,
			payload,
		}
	}

	pub fn producer(&self) -> ProducerId {
		self.producer
	}

	pub fn label(&self) -> &str {
		&self.label
	}

	pub fn sequence(&self) -> u64 {
		self.sequence
	}

	pub fn payload(&self) -> i64 {
		self.payload
	}
}

impl fmt::Display for WorkItem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} - {}", self.label, self.payload)
	}
}

/// Zero-sized pacing signal: the consumer is done with the producer's last item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckToken;

/// Element type of every item stream. A failed generation still occupies
/// its sequence number.
pub type Delivery = Result<WorkItem, GeneratorFailure>;

pub type ItemSender = mpsc::Sender<Delivery>;
pub type ItemReceiver = mpsc::Receiver<Delivery>;
pub type AckSender = mpsc::Sender<AckToken>;
pub type AckReceiver = mpsc::Receiver<AckToken>;

/// Identity of the producer behind a delivery, successful or not.
pub fn delivery_origin(delivery: &Delivery) -> (ProducerId, u64) {
	match delivery {
		Ok(item) => (item.producer(), item.sequence()),
		Err(failure) => (failure.producer, failure.sequence),
	}
}

/// Creates one bounded item channel.
pub fn item_channel() -> (ItemSender, ItemReceiver) {
	mpsc::channel(CHANNEL_CAPACITY)
}

/// Creates one bounded ack channel.
pub fn ack_channel() -> (AckSender, AckReceiver) {
	mpsc::channel(CHANNEL_CAPACITY)
}
