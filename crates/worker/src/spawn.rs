use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::TaskClass;

/// Builds the span every worker task runs inside.
pub(crate) fn task_span(class: TaskClass, name: &str) -> tracing::Span {
	tracing::debug_span!("worker.task", class = class.as_str(), name = name)
}

/// Spawns an async task tagged with its class and name.
///
/// Must be called from within a Tokio runtime.
#[allow(clippy::disallowed_methods)]
pub fn spawn<F>(class: TaskClass, name: &str, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), name, "worker.spawn");
	tokio::spawn(fut.instrument(task_span(class, name)))
}
