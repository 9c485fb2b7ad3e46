use std::future::Future;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use crate::{TaskClass, join_error_panic_message};

/// Outcome of draining a [`WorkerJoinSet`].
#[derive(Debug)]
pub struct DrainReport<T> {
	/// Outputs of tasks that returned normally, in completion order.
	pub completed: Vec<T>,
	/// Panic messages of tasks that panicked.
	pub panicked: Vec<String>,
	/// Tasks cancelled at the deadline without returning or panicking.
	pub aborted: usize,
}

impl<T> Default for DrainReport<T> {
	fn default() -> Self {
		Self {
			completed: Vec::new(),
			panicked: Vec::new(),
			aborted: 0,
		}
	}
}

impl<T> DrainReport<T> {
	/// Returns `true` when every joined task returned normally.
	pub fn is_clean(&self) -> bool {
		self.panicked.is_empty() && self.aborted == 0
	}

	fn record(&mut self, result: Result<T, JoinError>) {
		match result {
			Ok(value) => self.completed.push(value),
			Err(err) => {
				if let Some(msg) = join_error_panic_message(err) {
					tracing::warn!(panic = %msg, "worker.join_set.panicked");
					self.panicked.push(msg);
				}
			}
		}
	}
}

/// Wrapper around a Tokio [`JoinSet`] that tags every task with a
/// [`TaskClass`] and a name, and knows how to drain itself under a deadline.
#[derive(Debug)]
pub struct WorkerJoinSet<T> {
	inner: JoinSet<T>,
}

impl<T> Default for WorkerJoinSet<T>
where
	T: Send + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<T> WorkerJoinSet<T>
where
	T: Send + 'static,
{
	pub fn new() -> Self {
		Self { inner: JoinSet::new() }
	}

	/// Returns the number of tasks currently in the set.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Returns `true` if the set is empty.
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Spawns a future into the set on the current runtime.
	#[allow(clippy::disallowed_methods)]
	pub fn spawn<F>(&mut self, class: TaskClass, name: &str, fut: F)
	where
		F: Future<Output = T> + Send + 'static,
	{
		tracing::trace!(worker_class = class.as_str(), name, pending = self.inner.len(), "worker.join_set.spawn");
		self.inner.spawn(fut.instrument(crate::spawn::task_span(class, name)));
	}

	/// Waits for the next completed task.
	pub async fn join_next(&mut self) -> Option<Result<T, JoinError>> {
		self.inner.join_next().await
	}

	/// Collects every completion that is already available without waiting.
	pub fn try_drain(&mut self) -> DrainReport<T> {
		let mut report = DrainReport::default();
		while let Some(result) = self.inner.try_join_next() {
			report.record(result);
		}
		report
	}

	/// Joins every task, aborting whatever is still running once `timeout`
	/// has elapsed. The set is empty when this returns.
	pub async fn drain(&mut self, timeout: Duration) -> DrainReport<T> {
		let mut report = DrainReport::default();
		let deadline = tokio::time::Instant::now() + timeout;

		loop {
			match tokio::time::timeout_at(deadline, self.inner.join_next()).await {
				Ok(Some(result)) => report.record(result),
				Ok(None) => return report,
				Err(_) => break,
			}
		}

		report.aborted = self.inner.len();
		tracing::warn!(aborted = report.aborted, "worker.join_set.deadline");
		self.inner.abort_all();
		while let Some(result) = self.inner.join_next().await {
			// Outputs and panics that land after the deadline still count.
			if result.as_ref().is_err_and(|err| err.is_cancelled()) {
				continue;
			}
			report.aborted = report.aborted.saturating_sub(1);
			report.record(result);
		}
		report
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn drain_collects_all_outputs() {
		let mut set = WorkerJoinSet::new();
		for i in 0..4u32 {
			set.spawn(TaskClass::Relay, "sum", async move { i * 2 });
		}

		let mut report = set.drain(Duration::from_secs(1)).await;
		report.completed.sort_unstable();
		assert_eq!(report.completed, vec![0, 2, 4, 6]);
		assert!(report.is_clean());
		assert!(set.is_empty());
	}

	#[tokio::test]
	async fn drain_aborts_stragglers_at_deadline() {
		let mut set = WorkerJoinSet::new();
		set.spawn(TaskClass::Producer, "quick", async { 1u8 });
		set.spawn(TaskClass::Producer, "stuck", async {
			tokio::time::sleep(Duration::from_secs(60)).await;
			2u8
		});

		let report = tokio::time::timeout(Duration::from_secs(2), set.drain(Duration::from_millis(50)))
			.await
			.expect("drain must respect its deadline");
		assert_eq!(report.completed, vec![1]);
		assert_eq!(report.aborted, 1);
		assert!(!report.is_clean());
		assert!(set.is_empty());
	}

	#[tokio::test]
	async fn drain_reports_panics() {
		let mut set = WorkerJoinSet::<()>::new();
		set.spawn(TaskClass::Control, "boom", async { panic!("relay exploded") });

		let report = set.drain(Duration::from_secs(1)).await;
		assert_eq!(report.panicked.len(), 1);
		assert!(report.panicked[0].contains("relay exploded"));
	}

	struct PanicOnDrop;

	impl Drop for PanicOnDrop {
		fn drop(&mut self) {
			panic!("relay torn down mid-send");
		}
	}

	#[tokio::test]
	async fn drain_keeps_panics_raised_while_aborting() {
		let mut set = WorkerJoinSet::<()>::new();
		set.spawn(TaskClass::Relay, "fragile", async {
			let _guard = PanicOnDrop;
			tokio::time::sleep(Duration::from_secs(60)).await;
		});

		let report = tokio::time::timeout(Duration::from_secs(2), set.drain(Duration::from_millis(20)))
			.await
			.expect("drain must respect its deadline");
		assert_eq!(report.aborted, 0);
		assert_eq!(report.panicked.len(), 1);
		assert!(report.panicked[0].contains("relay torn down mid-send"));
		assert!(set.is_empty());
	}

	#[tokio::test]
	async fn try_drain_does_not_wait() {
		let mut set = WorkerJoinSet::new();
		set.spawn(TaskClass::Producer, "pending", async {
			tokio::time::sleep(Duration::from_secs(60)).await;
		});

		let report = set.try_drain();
		assert!(report.completed.is_empty());
		assert_eq!(set.len(), 1);

		let report = set.drain(Duration::ZERO).await;
		assert_eq!(report.aborted, 1);
	}
}
