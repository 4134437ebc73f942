//! JWT client assertion generation (RFC 7523).
//!
//! Assertions are regenerated on every call so `iat`, `exp`, and `jti` stay
//! current; nothing here is cached.

// std
use std::fmt::Debug;
// crates.io
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand::Rng;
use serde::Serialize;
// self
use crate::{
	_prelude::*,
	auth::{chain::CertificateChainProvider, read_env},
	time::SystemTimeSource,
};

/// Client assertion lifetime in seconds.
pub const ASSERTION_LIFETIME_SECS: i64 = 300;

/// Supplies a freshly signed JWT client assertion.
pub trait ClientAssertionProvider: Debug + Send + Sync {
	/// Produce a new assertion.
	fn client_assertion(&self) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct AssertionClaims {
	iss: String,
	sub: String,
	aud: String,
	jti: String,
	iat: i64,
	exp: i64,
}
impl AssertionClaims {
	fn new(client_id: &str, audience: &str, now: DateTime<Utc>) -> Self {
		let iat = now.timestamp();

		Self {
			iss: client_id.into(),
			sub: client_id.into(),
			aud: audience.into(),
			jti: format!("{:032x}", rand::rng().random::<u128>()),
			iat,
			exp: iat + ASSERTION_LIFETIME_SECS,
		}
	}
}

/// HS256 assertion over the shared client secret, read from the configured
/// environment variable at signing time.
#[derive(Debug)]
pub struct ClientSecretAssertion {
	client_id: String,
	audience: String,
	secret_env_var_name: String,
	time: Arc<dyn TimeSource>,
}
impl ClientSecretAssertion {
	/// Create a provider reading the secret from the named environment variable.
	pub fn new(
		client_id: impl Into<String>,
		audience: impl Into<String>,
		secret_env_var_name: impl Into<String>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			audience: audience.into(),
			secret_env_var_name: secret_env_var_name.into(),
			time: Arc::new(SystemTimeSource),
		}
	}

	/// Override the wall-clock source (primarily for tests).
	pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
		self.time = time;

		self
	}
}
impl ClientAssertionProvider for ClientSecretAssertion {
	fn client_assertion(&self) -> Result<String> {
		let secret = read_env(&self.secret_env_var_name)?;
		let claims = AssertionClaims::new(&self.client_id, &self.audience, self.time.now());

		jsonwebtoken::encode(
			&Header::new(Algorithm::HS256),
			&claims,
			&EncodingKey::from_secret(secret.as_bytes()),
		)
		.map_err(Error::from)
	}
}

/// RS256/ES256 assertion signed with a PEM private key; the algorithm follows
/// the key type. With a chain provider attached, the chain rides in the
/// assertion's `x5c` header (the certificate-bound composition).
#[derive(Debug)]
pub struct PrivateKeyAssertion {
	client_id: String,
	audience: String,
	key_env_var_name: String,
	chain: Option<Arc<dyn CertificateChainProvider>>,
	time: Arc<dyn TimeSource>,
}
impl PrivateKeyAssertion {
	/// Create a provider reading the key from the named environment variable.
	pub fn new(
		client_id: impl Into<String>,
		audience: impl Into<String>,
		key_env_var_name: impl Into<String>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			audience: audience.into(),
			key_env_var_name: key_env_var_name.into(),
			chain: None,
			time: Arc::new(SystemTimeSource),
		}
	}

	/// Attach a certificate chain embedded as the `x5c` header.
	pub fn with_certificate_chain(mut self, chain: Arc<dyn CertificateChainProvider>) -> Self {
		self.chain = Some(chain);

		self
	}

	/// Override the wall-clock source (primarily for tests).
	pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
		self.time = time;

		self
	}
}
impl ClientAssertionProvider for PrivateKeyAssertion {
	fn client_assertion(&self) -> Result<String> {
		let pem = read_env(&self.key_env_var_name)?;
		let (algorithm, key) = signing_key(&pem)?;
		let mut header = Header::new(algorithm);

		if let Some(chain) = &self.chain {
			header.x5c = Some(chain.certificate_chain()?);
		}

		let claims = AssertionClaims::new(&self.client_id, &self.audience, self.time.now());

		jsonwebtoken::encode(&header, &claims, &key).map_err(Error::from)
	}
}

/// Pick the signing algorithm from the PEM key type.
fn signing_key(pem: &str) -> Result<(Algorithm, EncodingKey)> {
	let bytes = pem.as_bytes();

	if let Ok(key) = EncodingKey::from_rsa_pem(bytes) {
		return Ok((Algorithm::RS256, key));
	}
	if let Ok(key) = EncodingKey::from_ec_pem(bytes) {
		return Ok((Algorithm::ES256, key));
	}

	Err(Error::Encoding("Private key PEM is neither an RSA nor an EC key.".into()))
}
