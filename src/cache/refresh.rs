//! Immutable refresh results and canonical cache timing arithmetic.

// self
use crate::_prelude::*;

/// Lifetime below which the stale and prefetch points collapse to just before expiry.
pub const SHORT_LIFETIME_FLOOR_SECS: u64 = 15;

/// Immutable triple of a cached value and its lifecycle instants.
///
/// `prefetch_at ≤ stale_at` always holds; when the value has a hard expiry
/// (a token's `expires_at`), `stale_at ≤ expires_at` holds as well and the
/// ceiling is retained so jittered rescheduling can clip against it.
#[derive(Clone, Debug)]
pub struct RefreshResult<T> {
	value: T,
	stale_at: DateTime<Utc>,
	prefetch_at: DateTime<Utc>,
	expires_at: Option<DateTime<Utc>>,
}
impl<T> RefreshResult<T> {
	/// Start building a refresh result for the given value.
	pub fn builder(value: T) -> RefreshResultBuilder<T> {
		RefreshResultBuilder { value, stale_at: None, prefetch_at: None, expires_at: None }
	}

	/// Compute canonical timings from a value lifetime: stale at 4/5, prefetch at 2/3.
	pub fn from_lifetime(value: T, now: DateTime<Utc>, expires_in_secs: u64) -> Self {
		let expires_at = now + TimeDelta::seconds(expires_in_secs as i64);
		let (stale_at, prefetch_at) = lifetime_points(now, expires_at, expires_in_secs);

		Self { value, stale_at, prefetch_at, expires_at: Some(expires_at) }
	}

	/// Assemble a result from precomputed canonical points.
	pub(crate) fn from_points(
		value: T,
		stale_at: DateTime<Utc>,
		prefetch_at: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> Self {
		Self { value, stale_at, prefetch_at, expires_at: Some(expires_at) }
	}

	/// Cached value.
	pub fn value(&self) -> &T {
		&self.value
	}

	/// Consume the result, yielding the cached value.
	pub fn into_value(self) -> T {
		self.value
	}

	/// Instant after which the value may no longer be served without a refresh.
	pub fn stale_at(&self) -> DateTime<Utc> {
		self.stale_at
	}

	/// Instant from which reads become prefetch-eligible.
	pub fn prefetch_at(&self) -> DateTime<Utc> {
		self.prefetch_at
	}

	/// Hard ceiling past which the value is unusable, when known.
	pub fn expires_at(&self) -> Option<DateTime<Utc>> {
		self.expires_at
	}

	/// Shift both instants forward, clipping so the invariants survive.
	///
	/// Clipping order: `stale_at` is clamped to `expires_at` first, then
	/// `prefetch_at` to the clamped `stale_at`.
	pub(crate) fn reschedule_clipped(
		mut self,
		stale_at: DateTime<Utc>,
		prefetch_at: DateTime<Utc>,
	) -> Self {
		let stale_at = match self.expires_at {
			Some(expires_at) => stale_at.min(expires_at),
			None => stale_at,
		};

		self.stale_at = stale_at;
		self.prefetch_at = prefetch_at.min(stale_at);

		self
	}
}

/// Builder for [`RefreshResult`] enforcing `prefetch_at ≤ stale_at ≤ expires_at`.
#[derive(Debug)]
pub struct RefreshResultBuilder<T> {
	value: T,
	stale_at: Option<DateTime<Utc>>,
	prefetch_at: Option<DateTime<Utc>>,
	expires_at: Option<DateTime<Utc>>,
}
impl<T> RefreshResultBuilder<T> {
	/// Set the stale instant.
	pub fn stale_at(mut self, stale_at: DateTime<Utc>) -> Self {
		self.stale_at = Some(stale_at);

		self
	}

	/// Set the prefetch instant.
	pub fn prefetch_at(mut self, prefetch_at: DateTime<Utc>) -> Self {
		self.prefetch_at = Some(prefetch_at);

		self
	}

	/// Set the hard expiry ceiling.
	pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
		self.expires_at = Some(expires_at);

		self
	}

	/// Finalise the result, validating the timing invariants.
	pub fn build(self) -> Result<RefreshResult<T>> {
		let stale_at = self.stale_at.ok_or_else(|| Error::Config {
			field: "stale_at",
			reason: "Refresh results require a stale instant.".into(),
		})?;
		let prefetch_at = self.prefetch_at.unwrap_or(stale_at);

		if prefetch_at > stale_at {
			return Err(Error::Config {
				field: "prefetch_at",
				reason: format!("Must not be later than stale_at ({stale_at})."),
			});
		}
		if let Some(expires_at) = self.expires_at
			&& stale_at > expires_at
		{
			return Err(Error::Config {
				field: "stale_at",
				reason: format!("Must not be later than expires_at ({expires_at})."),
			});
		}

		Ok(RefreshResult { value: self.value, stale_at, prefetch_at, expires_at: self.expires_at })
	}
}

/// Canonical lifecycle instants for a value expiring at `expires_at`.
///
/// Short-lived values collapse both points to one second before expiry (or
/// `now`, whichever is later) so a subsequent read forces a refresh.
pub(crate) fn lifetime_points(
	now: DateTime<Utc>,
	expires_at: DateTime<Utc>,
	expires_in_secs: u64,
) -> (DateTime<Utc>, DateTime<Utc>) {
	if expires_in_secs < SHORT_LIFETIME_FLOOR_SECS {
		let point = (expires_at - TimeDelta::seconds(1)).max(now);

		return (point, point);
	}

	let stale_at = expires_at - TimeDelta::seconds((expires_in_secs / 5) as i64);
	let prefetch_at = expires_at - TimeDelta::seconds((expires_in_secs / 3) as i64);

	(stale_at, prefetch_at)
}
