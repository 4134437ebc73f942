//! Token endpoint response model and cache timing helpers.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	cache::refresh::{self, RefreshResult},
};

/// Successful token endpoint response.
///
/// `expires_at` is epoch seconds on the wire; servers that omit it get it
/// computed from `expires_in` at receipt via [`Self::ensure_expires_at`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TokenResponse {
	/// Bearer access token.
	pub access_token: String,
	/// Token type advertised by the server ("Bearer" expected).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Remaining lifetime in seconds at issuance.
	pub expires_in: u64,
	/// Absolute expiry agreed with the server.
	#[serde(default, with = "chrono::serde::ts_seconds_option")]
	pub expires_at: Option<DateTime<Utc>>,
	/// OIDC identity token, when issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
	/// Refresh token, when issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
	/// Scope granted by the server, when it differs from the request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
}
impl TokenResponse {
	/// Fill `expires_at` from `expires_in` when the server omitted it.
	pub fn ensure_expires_at(mut self, now: DateTime<Utc>) -> Self {
		if self.expires_at.is_none() {
			self.expires_at = Some(now + TimeDelta::seconds(self.expires_in as i64));
		}

		self
	}

	/// Instant after which the cached token must not be served without a refresh.
	pub fn stale_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
		refresh::lifetime_points(now, self.expiry_or(now), self.expires_in).0
	}

	/// Instant from which reads should trigger a proactive refresh.
	pub fn prefetch_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
		refresh::lifetime_points(now, self.expiry_or(now), self.expires_in).1
	}

	/// Assemble the cache entry for this token with canonical timings.
	pub fn refresh_result(self, now: DateTime<Utc>) -> RefreshResult<TokenResponse> {
		let expires_at = self.expiry_or(now);
		let (stale_at, prefetch_at) = refresh::lifetime_points(now, expires_at, self.expires_in);

		RefreshResult::from_points(self, stale_at, prefetch_at, expires_at)
	}

	fn expiry_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
		self.expires_at.unwrap_or_else(|| now + TimeDelta::seconds(self.expires_in as i64))
	}
}

/// Error body returned by the token endpoint with 4xx responses.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OAuthErrorBody {
	/// Stable OAuth error code.
	#[serde(default)]
	pub error: Option<String>,
	/// Human-readable description.
	#[serde(default)]
	pub error_description: Option<String>,
}
