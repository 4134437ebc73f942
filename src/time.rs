//! Wall-clock abstraction used for token lifetime arithmetic.
//!
//! Token expiry is a wall time agreed with the server, so every lifecycle
//! comparison goes through a [`TimeSource`] rather than the monotonic clock.

// std
use std::{
	fmt::Debug,
	sync::{Mutex, PoisonError},
};
// crates.io
use chrono::{DateTime, TimeDelta, Utc};

/// Source of UTC wall-clock time.
pub trait TimeSource: Debug + Send + Sync {
	/// Current UTC time.
	fn now(&self) -> DateTime<Utc>;
}

/// System clock; the default for production use.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;
impl TimeSource for SystemTimeSource {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualTimeSource {
	now: Mutex<DateTime<Utc>>,
}
impl ManualTimeSource {
	/// Create a manual clock positioned at the given instant.
	pub fn starting_at(now: DateTime<Utc>) -> Self {
		Self { now: Mutex::new(now) }
	}

	/// Advance the clock by the given number of seconds.
	pub fn advance_secs(&self, secs: i64) {
		let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);

		*now += TimeDelta::seconds(secs);
	}

	/// Move the clock to an absolute instant.
	pub fn set(&self, instant: DateTime<Utc>) {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
	}
}
impl TimeSource for ManualTimeSource {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
