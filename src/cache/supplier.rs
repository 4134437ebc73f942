//! Generic time-triggered cache supplier with single-flight refresh and
//! jittered rescheduling.
//!
//! A supplier holds exactly one [`RefreshResult`] and distinguishes three
//! lifecycle phases per read: fresh (return the value), prefetch-eligible
//! (hand a refresh job to the strategy, return the value), and stale (block
//! on the refresh gate). Storing the refreshed entry is the sole mutation
//! point; readers observe either the old entry or the new one.

// std
use std::{
	fmt::{Debug, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::{
		Arc,
		atomic::AtomicBool,
	},
};
// crates.io
use rand::Rng;
use tokio::{
	sync::{Mutex, RwLock},
	time,
};
// self
use crate::{
	_prelude::*,
	cache::{
		prefetch::{OneCallerBlocksPrefetchStrategy, PrefetchStrategy, PrefetchTask},
		refresh::RefreshResult,
	},
	config::StaleValuePolicy,
	time::SystemTimeSource,
};

/// Maximum time a stale-path caller waits for the refresh gate.
pub const BLOCKING_REFRESH_MAX_WAIT: Duration = Duration::from_secs(5);
/// Default lower bound of the refresh scheduling jitter.
pub const DEFAULT_JITTER_MIN: Duration = Duration::from_secs(300);
/// Default upper bound of the refresh scheduling jitter.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_secs(600);

/// Boxed future used across the crate's object-safe async seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces a fresh cache entry; invoked only under the supplier's refresh gate.
pub trait Refresher<T>: Send + Sync {
	/// Fetch a new value together with its lifecycle instants.
	fn refresh(&self) -> BoxFuture<'_, Result<RefreshResult<T>>>;
}
impl<T, F> Refresher<T> for F
where
	F: Fn() -> BoxFuture<'static, Result<RefreshResult<T>>> + Send + Sync,
{
	fn refresh(&self) -> BoxFuture<'_, Result<RefreshResult<T>>> {
		(self)()
	}
}

/// Uniform random offset bounds applied to both lifecycle instants after
/// every successful refresh, decorrelating refresh schedules across peer
/// processes started together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JitterBounds {
	min: Duration,
	max: Duration,
}
impl JitterBounds {
	/// Create bounds; `min` must not exceed `max`.
	pub fn new(min: Duration, max: Duration) -> Result<Self> {
		if min > max {
			return Err(Error::Config {
				field: "jitter",
				reason: format!("Lower bound {min:?} exceeds upper bound {max:?}."),
			});
		}

		Ok(Self { min, max })
	}

	pub(crate) fn sample(&self) -> TimeDelta {
		let min = self.min.as_millis() as i64;
		let max = self.max.as_millis() as i64;

		TimeDelta::milliseconds(rand::rng().random_range(min..=max))
	}
}
impl Default for JitterBounds {
	fn default() -> Self {
		Self { min: DEFAULT_JITTER_MIN, max: DEFAULT_JITTER_MAX }
	}
}

/// Generic lifecycle engine caching one refreshable value.
pub struct CachedResultSupplier<T> {
	inner: Arc<SupplierInner<T>>,
}
impl<T> Clone for CachedResultSupplier<T> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<T> Debug for CachedResultSupplier<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "CachedResultSupplier({})", self.inner.label)
	}
}
impl<T> CachedResultSupplier<T>
where
	T: Clone + Send + Sync + 'static,
{
	/// Start building a supplier around the given refresher.
	pub fn builder<R>(refresher: R) -> CachedResultSupplierBuilder<T>
	where
		R: Refresher<T> + 'static,
	{
		CachedResultSupplierBuilder {
			refresher: Box::new(refresher),
			strategy: Arc::new(OneCallerBlocksPrefetchStrategy::default()),
			policy: StaleValuePolicy::default(),
			jitter: Some(JitterBounds::default()),
			time: Arc::new(SystemTimeSource),
			label: Arc::from("cached-result-supplier"),
		}
	}

	/// Return the cached value, refreshing it as its lifecycle demands.
	pub async fn get(&self) -> Result<T> {
		let now = self.inner.time.now();
		let snapshot = { self.inner.entry.read().await.clone() };

		if let Some(entry) = snapshot
			&& now < entry.stale_at()
		{
			if now >= entry.prefetch_at() {
				self.dispatch_prefetch().await;
			}

			return Ok(entry.into_value());
		}

		self.refresh_blocking().await
	}

	async fn dispatch_prefetch(&self) {
		let weak = Arc::downgrade(&self.inner);
		let job = Box::new(move || -> BoxFuture<'static, Result<()>> {
			Box::pin(async move {
				let Some(inner) = weak.upgrade() else {
					return Ok(());
				};

				try_refresh_gated(&inner).await
			})
		});
		let label = self.inner.label.clone();
		let on_failure = Box::new(move |err: &Error| {
			tracing::warn!(
				supplier = %label,
				error = %err,
				"prefetch refresh failed; current value is still fresh"
			);
		});
		let task = PrefetchTask::new(
			self.inner.label.clone(),
			self.inner.prefetch_in_flight.clone(),
			job,
			on_failure,
		);

		self.inner.strategy.prefetch(task).await;
	}

	#[tracing::instrument(skip(self), fields(supplier = %self.inner.label))]
	async fn refresh_blocking(&self) -> Result<T> {
		let inner = &self.inner;
		let _guard =
			match time::timeout(BLOCKING_REFRESH_MAX_WAIT, inner.refresh_gate.lock()).await {
				Ok(guard) => guard,
				Err(_) => {
					let now = inner.time.now();

					if let Some(entry) = { inner.entry.read().await.clone() }
						&& (now < entry.stale_at() || inner.policy == StaleValuePolicy::Allow)
					{
						tracing::warn!(
							supplier = %inner.label,
							"refresh gate wait exhausted; serving the held value"
						);

						return Ok(entry.into_value());
					}

					return Err(Error::ConcurrentOperation(format!(
						"Timed out after {BLOCKING_REFRESH_MAX_WAIT:?} waiting for an in-flight refresh."
					)));
				},
			};
		// Double-checked: another caller may have refreshed while we waited.
		let now = inner.time.now();

		if let Some(entry) = { inner.entry.read().await.clone() }
			&& now < entry.stale_at()
		{
			return Ok(entry.into_value());
		}

		match run_refresh(inner).await {
			Ok(()) => {
				let entry = { inner.entry.read().await.clone() };

				entry
					.map(RefreshResult::into_value)
					.ok_or_else(|| Error::Cache("Refresh committed no entry.".into()))
			},
			Err(err) => {
				let held = { inner.entry.read().await.clone() };

				match (held, inner.policy) {
					(Some(entry), StaleValuePolicy::Allow) => {
						tracing::warn!(
							supplier = %inner.label,
							error = %err,
							"refresh failed; serving the previous value"
						);

						Ok(entry.into_value())
					},
					(Some(_), StaleValuePolicy::Strict) =>
						Err(Error::Cache(format!("Refresh failed under strict policy: {err}"))),
					(None, _) => Err(err),
				}
			},
		}
	}
}

/// Builder for [`CachedResultSupplier`].
pub struct CachedResultSupplierBuilder<T> {
	refresher: Box<dyn Refresher<T>>,
	strategy: Arc<dyn PrefetchStrategy>,
	policy: StaleValuePolicy,
	jitter: Option<JitterBounds>,
	time: Arc<dyn TimeSource>,
	label: Arc<str>,
}
impl<T> Debug for CachedResultSupplierBuilder<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "CachedResultSupplierBuilder({})", self.label)
	}
}
impl<T> CachedResultSupplierBuilder<T>
where
	T: Clone + Send + Sync + 'static,
{
	/// Select the prefetch strategy (default: one caller blocks).
	pub fn strategy(mut self, strategy: Arc<dyn PrefetchStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Select the stale-value policy (default: strict).
	pub fn policy(mut self, policy: StaleValuePolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Override the jitter bounds; `None` disables jitter entirely.
	pub fn jitter(mut self, jitter: Option<JitterBounds>) -> Self {
		self.jitter = jitter;

		self
	}

	/// Override the wall-clock source (primarily for tests).
	pub fn time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
		self.time = time;

		self
	}

	/// Label used in logs for this supplier.
	pub fn label(mut self, label: impl Into<Arc<str>>) -> Self {
		self.label = label.into();

		self
	}

	/// Finalise the supplier.
	pub fn build(self) -> CachedResultSupplier<T> {
		CachedResultSupplier {
			inner: Arc::new(SupplierInner {
				refresher: self.refresher,
				strategy: self.strategy,
				policy: self.policy,
				jitter: self.jitter,
				time: self.time,
				label: self.label,
				entry: RwLock::new(None),
				refresh_gate: Mutex::new(()),
				prefetch_in_flight: Arc::new(AtomicBool::new(false)),
			}),
		}
	}
}

struct SupplierInner<T> {
	refresher: Box<dyn Refresher<T>>,
	strategy: Arc<dyn PrefetchStrategy>,
	policy: StaleValuePolicy,
	jitter: Option<JitterBounds>,
	time: Arc<dyn TimeSource>,
	label: Arc<str>,
	entry: RwLock<Option<RefreshResult<T>>>,
	refresh_gate: Mutex<()>,
	prefetch_in_flight: Arc<AtomicBool>,
}

/// Prefetch-path refresh: non-blocking gate acquisition, then a window
/// re-check so a refresh that just committed is not repeated.
async fn try_refresh_gated<T>(inner: &SupplierInner<T>) -> Result<()>
where
	T: Clone + Send + Sync + 'static,
{
	let Ok(_guard) = inner.refresh_gate.try_lock() else {
		return Ok(());
	};
	let now = inner.time.now();

	if let Some(entry) = inner.entry.read().await.as_ref()
		&& now < entry.prefetch_at()
	{
		return Ok(());
	}

	run_refresh(inner).await
}

/// Invoke the refresher and commit the (jittered) entry. Callers must hold
/// the refresh gate.
async fn run_refresh<T>(inner: &SupplierInner<T>) -> Result<()>
where
	T: Clone + Send + Sync + 'static,
{
	let refreshed = inner.refresher.refresh().await?;
	let refreshed = match inner.jitter {
		Some(bounds) => {
			let stale_at = refreshed.stale_at() + bounds.sample();
			let prefetch_at = refreshed.prefetch_at() + bounds.sample();

			refreshed.reschedule_clipped(stale_at, prefetch_at)
		},
		None => refreshed,
	};

	*inner.entry.write().await = Some(refreshed);

	tracing::debug!(supplier = %inner.label, "refresh committed");

	Ok(())
}
