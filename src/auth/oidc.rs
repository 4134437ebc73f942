//! OIDC federated token material.

// std
use std::{
	fmt::Debug,
	fs,
	path::PathBuf,
	sync::{Mutex, PoisonError},
};
// crates.io
use base64::prelude::*;
use serde::Deserialize;
// self
use crate::{_prelude::*, time::SystemTimeSource};

/// Fixed skew before `exp` at which the token file is re-read.
pub const REREAD_SKEW_SECS: i64 = 600;

/// Supplies the federated OIDC token.
pub trait OidcTokenProvider: Debug + Send + Sync {
	/// Current OIDC token.
	fn oidc_token(&self) -> Result<String>;
}

/// Reads the token from a file, caching it until it nears its `exp` claim so
/// hot paths avoid filesystem I/O.
#[derive(Debug)]
pub struct FileOidcTokenProvider {
	path: PathBuf,
	cached: Mutex<Option<CachedOidcToken>>,
	time: Arc<dyn TimeSource>,
}
impl FileOidcTokenProvider {
	/// Create a provider reading from the given path.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into(), cached: Mutex::new(None), time: Arc::new(SystemTimeSource) }
	}

	/// Override the wall-clock source (primarily for tests).
	pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
		self.time = time;

		self
	}

	fn read_file(&self) -> Result<String> {
		let token = fs::read_to_string(&self.path)?.trim().to_string();

		if token.is_empty() {
			return Err(Error::Credential(format!(
				"OIDC token file '{}' is empty.",
				self.path.display()
			)));
		}

		Ok(token)
	}
}
impl OidcTokenProvider for FileOidcTokenProvider {
	fn oidc_token(&self) -> Result<String> {
		let now = self.time.now();
		let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);

		if let Some(entry) = cached.as_ref()
			&& now + TimeDelta::seconds(REREAD_SKEW_SECS) < entry.expires_at
		{
			return Ok(entry.token.clone());
		}

		let token = self.read_file()?;
		let expires_at = jwt_expiry(&token)?;

		tracing::debug!(path = %self.path.display(), %expires_at, "reloaded OIDC token file");

		*cached = Some(CachedOidcToken { token: token.clone(), expires_at });

		Ok(token)
	}
}

/// Fixed OIDC token, useful for tests and embedders.
#[derive(Clone, Debug)]
pub struct StaticOidcToken {
	token: String,
}
impl StaticOidcToken {
	/// Create a holder around a raw token.
	pub fn new(token: impl Into<String>) -> Self {
		Self { token: token.into() }
	}
}
impl OidcTokenProvider for StaticOidcToken {
	fn oidc_token(&self) -> Result<String> {
		Ok(self.token.clone())
	}
}

#[derive(Clone, Debug)]
struct CachedOidcToken {
	token: String,
	expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ExpClaim {
	exp: i64,
}

/// Extract the `exp` claim without verifying the signature; the token is
/// forwarded to the identity service, which performs the real validation.
fn jwt_expiry(token: &str) -> Result<DateTime<Utc>> {
	let payload = token
		.split('.')
		.nth(1)
		.ok_or_else(|| Error::Encoding("OIDC token is not a JWT.".into()))?;
	let decoded = BASE64_URL_SAFE_NO_PAD
		.decode(payload)
		.map_err(|err| Error::Encoding(format!("OIDC token payload is not base64url: {err}.")))?;
	let claims: ExpClaim = serde_json::from_slice(&decoded)?;

	DateTime::from_timestamp(claims.exp, 0)
		.ok_or_else(|| Error::Encoding("OIDC token 'exp' claim is out of range.".into()))
}
