//! Authentication material providers feeding the token request builder.
//!
//! Material is resolved at refresh time, never at startup, so operators can
//! rotate secrets without restarting the process.

pub mod assertion;
pub mod chain;
pub mod oidc;
pub mod pkcs7;

// std
use std::env;
// self
use crate::_prelude::*;

/// Read a non-empty environment variable or fail with a credential error.
pub(crate) fn read_env(name: &str) -> Result<String> {
	match env::var(name) {
		Ok(value) if !value.trim().is_empty() => Ok(value),
		_ => Err(Error::Credential(format!("Environment variable '{name}' is unset or empty."))),
	}
}
