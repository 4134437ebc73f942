//! X.509 certificate chain material for certificate-bound assertions.

// std
use std::fmt::Debug;
// crates.io
use base64::prelude::*;
// self
use crate::{_prelude::*, auth::read_env};

/// Supplies the client certificate chain as base64 DER entries (`x5c` form),
/// leaf first.
pub trait CertificateChainProvider: Debug + Send + Sync {
	/// Current certificate chain.
	fn certificate_chain(&self) -> Result<Vec<String>>;
}

/// Reads a PEM certificate bundle from an environment variable on every call.
#[derive(Clone, Debug)]
pub struct EnvCertificateChain {
	env_var_name: String,
}
impl EnvCertificateChain {
	/// Create a provider reading the bundle from the named environment variable.
	pub fn new(env_var_name: impl Into<String>) -> Self {
		Self { env_var_name: env_var_name.into() }
	}
}
impl CertificateChainProvider for EnvCertificateChain {
	fn certificate_chain(&self) -> Result<Vec<String>> {
		pem_bundle_to_x5c(&read_env(&self.env_var_name)?)
	}
}

/// Fixed certificate chain, useful for tests and embedders.
#[derive(Clone, Debug)]
pub struct StaticCertificateChain {
	chain: Vec<String>,
}
impl StaticCertificateChain {
	/// Create a holder around base64 DER entries.
	pub fn new(chain: Vec<String>) -> Self {
		Self { chain }
	}
}
impl CertificateChainProvider for StaticCertificateChain {
	fn certificate_chain(&self) -> Result<Vec<String>> {
		Ok(self.chain.clone())
	}
}

/// Split a PEM bundle into `x5c` entries; the body of each CERTIFICATE block
/// is already the base64 DER encoding the header wants.
fn pem_bundle_to_x5c(bundle: &str) -> Result<Vec<String>> {
	let mut chain = Vec::new();
	let mut body: Option<String> = None;

	for line in bundle.lines() {
		let line = line.trim();

		match line {
			"-----BEGIN CERTIFICATE-----" => {
				if body.is_some() {
					return Err(Error::Encoding(
						"Certificate bundle has a nested BEGIN marker.".into(),
					));
				}

				body = Some(String::new());
			},
			"-----END CERTIFICATE-----" => {
				let entry = body.take().ok_or_else(|| {
					Error::Encoding("Certificate bundle has an unmatched END marker.".into())
				})?;

				BASE64_STANDARD.decode(&entry).map_err(|err| {
					Error::Encoding(format!("Certificate body is not valid base64: {err}."))
				})?;

				chain.push(entry);
			},
			_ =>
				if let Some(buffer) = body.as_mut() {
					buffer.push_str(line);
				},
		}
	}

	if chain.is_empty() {
		return Err(Error::Encoding("Certificate bundle contains no certificates.".into()));
	}

	Ok(chain)
}
