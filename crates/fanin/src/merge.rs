//! Fan-in of many item streams into one.
//!
//! Every input gets exactly one relay task that moves deliveries, one at a
//! time, from its source onto a clone of the shared sender. Relays never
//! reorder or buffer beyond the single channel slot, so each source's order
//! survives end to end while the interleaving across sources depends only on
//! scheduling and on how fast the consumer drains.
//!
//! A relay whose source closes just exits and drops its sender clone. The
//! shared stream stays open for the remaining relays and closes once the last
//! one is gone.

use std::sync::Arc;

use confluence_worker::{TaskClass, WorkerJoinSet};
use tokio_util::sync::CancellationToken;

use crate::exit::{ExitReason, TaskExit, TaskKind};
use crate::item::{ItemReceiver, ItemSender, item_channel};

/// Merges `inputs` into one stream, spawning one relay per input into `tasks`.
///
/// An item a relay holds when `cancel` fires is dropped together with the relay.
pub fn merge(inputs: Vec<ItemReceiver>, cancel: &CancellationToken, tasks: &mut WorkerJoinSet<TaskExit>) -> ItemReceiver {
	let (merged_tx, merged_rx) = item_channel();
	for (index, source) in inputs.into_iter().enumerate() {
		let name = format!("relay:{index}");
		let relay = relay(index, Arc::from(name.as_str()), source, merged_tx.clone(), cancel.clone());
		tasks.spawn(TaskClass::Relay, &name, relay);
	}
	merged_rx
}

async fn relay(index: usize, label: Arc<str>, mut source: ItemReceiver, output: ItemSender, cancel: CancellationToken) -> TaskExit {
	let mut forwarded = 0u64;
	let reason = loop {
		let delivery = tokio::select! {
			biased;
			_ = cancel.cancelled() => break ExitReason::Cancelled,
			maybe = source.recv() => {
				let Some(delivery) = maybe else {
					break ExitReason::SourceClosed;
				};
				delivery
			}
		};
		let sent = tokio::select! {
			biased;
			_ = cancel.cancelled() => break ExitReason::Cancelled,
			res = output.send(delivery) => res,
		};
		if sent.is_err() {
			break ExitReason::OutputClosed;
		}
		forwarded += 1;
	};

	tracing::debug!(relay = index, reason = %reason, forwarded, "fanin.relay.exit");
	TaskExit {
		task: TaskKind::Relay(index),
		label,
		reason,
		forwarded,
	}
}
