//! Prefetch strategies and the shared background refresh worker.
//!
//! A read landing in the prefetch window still returns the current value;
//! the strategy decides who, if anyone, pays for the refresh. Failures on
//! this path are swallowed because the cached value is still fresh.

// std
use std::{
	fmt::{Debug, Formatter, Result as FmtResult},
	sync::{
		Arc, Mutex as StdMutex, PoisonError,
		atomic::{AtomicBool, Ordering},
	},
};
// crates.io
use tokio::{
	sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc},
	task::JoinHandle,
};
// self
use crate::cache::supplier::BoxFuture;

/// Upper bound on queued background refreshes across all suppliers.
pub const MAX_QUEUED_PREFETCHES: usize = 100;

/// Single-use refresh job dispatched by a prefetch strategy.
///
/// Jobs hold only weak references to their supplier, so a discarded supplier
/// never waits on the queue to drain before it can be collected.
pub type RefreshJob = Box<dyn FnOnce() -> BoxFuture<'static, crate::Result<()>> + Send>;

/// Callback invoked when a swallowed prefetch refresh fails.
pub type OnFailure = Box<dyn Fn(&crate::Error) + Send + Sync>;

/// Unit of prefetch work handed to a strategy during the prefetch window.
pub struct PrefetchTask {
	label: Arc<str>,
	in_flight: Arc<AtomicBool>,
	job: RefreshJob,
	on_failure: OnFailure,
}
impl PrefetchTask {
	pub(crate) fn new(
		label: Arc<str>,
		in_flight: Arc<AtomicBool>,
		job: RefreshJob,
		on_failure: OnFailure,
	) -> Self {
		Self { label, in_flight, job, on_failure }
	}

	/// Supplier label for diagnostics.
	pub fn label(&self) -> &str {
		&self.label
	}

	/// Run the job, clearing the in-flight marker and reporting failures.
	pub async fn run(self) {
		let result = (self.job)().await;

		self.in_flight.store(false, Ordering::Release);

		if let Err(err) = result {
			(self.on_failure)(&err);
		}
	}
}
impl Debug for PrefetchTask {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "PrefetchTask({})", self.label)
	}
}

/// Policy for servicing reads that land in the prefetch window.
pub trait PrefetchStrategy: Debug + Send + Sync {
	/// Dispatch the refresh job; must never starve the calling read.
	fn prefetch(&self, task: PrefetchTask) -> BoxFuture<'_, ()>;
}

/// At most one caller runs the refresh on its own stack; concurrent callers
/// skip and return the still-fresh cached value immediately.
#[derive(Debug, Default)]
pub struct OneCallerBlocksPrefetchStrategy {
	gate: Mutex<()>,
}
impl PrefetchStrategy for OneCallerBlocksPrefetchStrategy {
	fn prefetch(&self, task: PrefetchTask) -> BoxFuture<'_, ()> {
		Box::pin(async move {
			let Ok(_guard) = self.gate.try_lock() else {
				tracing::debug!(supplier = %task.label(), "prefetch already running; skipping");

				return;
			};

			task.run().await;
		})
	}
}

/// Callers never wait; jobs run on the shared background worker, bounded by
/// a process-wide permit pool. Duplicate submissions for a supplier with a
/// refresh already queued or running are rejected.
#[derive(Debug, Default)]
pub struct NonBlockingPrefetchStrategy;
impl PrefetchStrategy for NonBlockingPrefetchStrategy {
	fn prefetch(&self, task: PrefetchTask) -> BoxFuture<'_, ()> {
		Box::pin(async move {
			if task.in_flight.swap(true, Ordering::AcqRel) {
				tracing::debug!(supplier = %task.label(), "prefetch already in flight; skipping duplicate");

				return;
			}

			submit_to_worker(task);
		})
	}
}

static WORKER: StdMutex<Option<PrefetchWorker>> = StdMutex::new(None);

/// Start the shared prefetch worker if it is not already running.
///
/// Submission starts the worker lazily; this hook exists so embedders can
/// control when the background task appears.
pub fn initialize_worker() {
	let mut slot = WORKER.lock().unwrap_or_else(PoisonError::into_inner);

	slot.get_or_insert_with(PrefetchWorker::spawn);
}

/// Stop the shared prefetch worker, dropping any queued jobs.
pub fn shutdown_worker() {
	let worker = { WORKER.lock().unwrap_or_else(PoisonError::into_inner).take() };

	if let Some(worker) = worker {
		worker.driver.abort();
	}
}

fn submit_to_worker(task: PrefetchTask) {
	let mut slot = WORKER.lock().unwrap_or_else(PoisonError::into_inner);
	let worker = slot.get_or_insert_with(PrefetchWorker::spawn);

	worker.submit(task);
}

/// One dedicated task draining a queue of refresh jobs, process-wide.
#[derive(Debug)]
struct PrefetchWorker {
	queue: mpsc::UnboundedSender<(PrefetchTask, OwnedSemaphorePermit)>,
	permits: Arc<Semaphore>,
	driver: JoinHandle<()>,
}
impl PrefetchWorker {
	fn spawn() -> Self {
		let (queue, mut receiver) =
			mpsc::unbounded_channel::<(PrefetchTask, OwnedSemaphorePermit)>();
		let permits = Arc::new(Semaphore::new(MAX_QUEUED_PREFETCHES));
		let driver = tokio::spawn(async move {
			while let Some((task, permit)) = receiver.recv().await {
				task.run().await;

				drop(permit);
			}
		});

		Self { queue, permits, driver }
	}

	fn submit(&self, task: PrefetchTask) {
		let Ok(permit) = self.permits.clone().try_acquire_owned() else {
			task.in_flight.store(false, Ordering::Release);

			tracing::warn!(supplier = %task.label(), "prefetch queue full; dropping refresh");

			return;
		};

		if let Err(rejected) = self.queue.send((task, permit)) {
			let (task, _permit) = rejected.0;

			task.in_flight.store(false, Ordering::Release);

			tracing::warn!(supplier = %task.label(), "prefetch worker stopped; dropping refresh");
		}
	}
}
