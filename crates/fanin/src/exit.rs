//! Exit summaries returned by every pipeline task.

use std::fmt;
use std::sync::Arc;

use crate::item::ProducerId;

/// Which side of the pipeline a task belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
	Producer(ProducerId),
	/// Relay forwarding the stream at this input index of the merge.
	Relay(usize),
}

/// Why a task left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
	/// The cancellation token fired at a suspension point.
	Cancelled,
	/// The producer emitted its configured number of items.
	Exhausted,
	/// The stream this task writes to has no receiver any more.
	OutputClosed,
	/// The stream this relay reads from has no sender any more.
	SourceClosed,
	/// The consumer side of this producer's ack channel went away.
	AckClosed,
}

impl ExitReason {
	/// Whether the exit is part of an orderly shutdown rather than a
	/// collaborator disappearing underneath the task.
	pub fn is_orderly(self) -> bool {
		matches!(self, Self::Cancelled | Self::Exhausted | Self::SourceClosed)
	}
}

impl fmt::Display for ExitReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Cancelled => "cancelled",
			Self::Exhausted => "exhausted",
			Self::OutputClosed => "output closed",
			Self::SourceClosed => "source closed",
			Self::AckClosed => "ack channel closed",
		})
	}
}

/// Summary a producer or relay task returns when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskExit {
	pub task: TaskKind,
	pub label: Arc<str>,
	pub reason: ExitReason,
	/// Deliveries this task handed to its output.
	pub forwarded: u64,
}
