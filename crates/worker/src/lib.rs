//! Task primitives shared by the confluence pipeline.
//!
//! Every producer, relay and control task is spawned through this crate so it
//! carries a [`TaskClass`] and a name in its tracing span, and so the owning
//! pool can join the whole set under one deadline at shutdown.

mod class;
mod join_set;
mod spawn;

pub use class::TaskClass;
pub use join_set::{DrainReport, WorkerJoinSet};
pub use spawn::spawn;
use tokio::task::JoinError;

/// Extracts the panic message from a [`JoinError`].
///
/// Returns `None` when the task was cancelled rather than panicked.
pub fn join_error_panic_message(err: JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	let payload = err.into_panic();
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return Some(msg.clone());
	}
	Some("<non-string panic payload>".to_string())
}
