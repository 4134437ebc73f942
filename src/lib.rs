//! Async machine-to-machine OAuth 2.0 credential client with time-triggered token caching,
//! pluggable prefetch strategies, and jittered refresh — built for modern Rust identity systems.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod http;
pub mod token;

mod error;
mod provider;
mod request;
mod time;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};

	pub use crate::{Error, Result, time::TimeSource};
}
pub use crate::{
	config::{
		AttestedDocumentSource, AuthConfig, AuthnMethod, ClientConfig, PrefetchStrategyKind,
		StaleValuePolicy,
	},
	error::{Error, Result},
	provider::{CredentialProvider, CredentialProviderBuilder},
	request::{AuthMaterial, TokenRequest, build_token_request},
	time::{ManualTimeSource, SystemTimeSource, TimeSource},
	token::TokenResponse,
};
