//! Client and authentication configuration consumed from an external loader.
//!
//! Canonical field names are snake_case; every field also accepts the
//! camelCase spelling so loaders may hand over either convention unchanged.
//! Secrets are referenced indirectly (environment variable names, file
//! paths) and resolved at refresh time, never embedded here.

// std
use std::path::PathBuf;
// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

/// Default OAuth scope requested for access credentials.
pub const DEFAULT_SCOPE: &str = "urn:cloud:idaas:pam|cloud_account:obtain_access_credential";
/// Default connect timeout for token endpoint requests.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
/// Default read timeout for token endpoint requests.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;
/// Lower bound accepted for either HTTP timeout.
pub const MIN_TIMEOUT_SECS: u64 = 2;
/// Upper bound accepted for either HTTP timeout.
pub const MAX_TIMEOUT_SECS: u64 = 60;

/// Client authentication methods supported for the `client_credentials` grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthnMethod {
	/// Shared secret carried in the `Authorization: Basic` header.
	#[serde(alias = "CLIENT_SECRET_BASIC")]
	ClientSecretBasic,
	/// Shared secret posted in the form body.
	#[serde(alias = "CLIENT_SECRET_POST")]
	ClientSecretPost,
	/// HS256 client assertion derived from the shared secret.
	#[serde(alias = "CLIENT_SECRET_JWT")]
	ClientSecretJwt,
	/// RS256/ES256 client assertion signed with a private key.
	#[serde(alias = "PRIVATE_KEY_JWT")]
	PrivateKeyJwt,
	/// PKCS7-signed attested instance document exchanged for a federated token.
	#[serde(alias = "PKCS7")]
	Pkcs7,
	/// Federated OIDC token.
	#[serde(alias = "OIDC")]
	Oidc,
	/// Private-CA certificate-bound client assertion.
	#[serde(alias = "PCA")]
	Pca,
}

/// Policy for serving a cached value whose stale deadline has passed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaleValuePolicy {
	/// Refresh failures surface as cache errors; stale values are never served.
	#[default]
	#[serde(alias = "strict")]
	Strict,
	/// Refresh failures fall back to the previously cached value when one exists.
	#[serde(alias = "allow")]
	Allow,
}

/// Strategy used for reads landing in the prefetch window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrefetchStrategyKind {
	/// One caller runs the refresh on its own stack; concurrent callers skip.
	#[default]
	OneCallerBlocks,
	/// Callers never wait; refreshes run on the shared background worker.
	NonBlocking,
}

/// Where the PKCS7 attested document is obtained from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestedDocumentSource {
	/// Alibaba Cloud ECS metadata service.
	AlibabaCloudEcs,
	/// AWS EC2 metadata service (not implemented; fails on use).
	AwsEc2,
}

/// Authentication method plus the indirect material references it needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
	/// Client authentication method.
	#[serde(alias = "authnMethod")]
	pub authn_method: AuthnMethod,
	/// Environment variable naming the client secret.
	#[serde(default, alias = "clientSecretEnvVarName")]
	pub client_secret_env_var_name: Option<String>,
	/// Environment variable naming the PEM private key.
	#[serde(default, alias = "privateKeyEnvVarName")]
	pub private_key_env_var_name: Option<String>,
	/// Environment variable naming the PEM certificate bundle for `pca`.
	#[serde(default, alias = "certificateChainEnvVarName")]
	pub certificate_chain_env_var_name: Option<String>,
	/// Filesystem path of the OIDC token file.
	#[serde(default, alias = "oidcTokenFilePath")]
	pub oidc_token_file_path: Option<PathBuf>,
	/// Federated credential registered with the identity service.
	#[serde(default, alias = "federatedCredentialName")]
	pub federated_credential_name: Option<String>,
	/// Metadata service supplying the attested document for `pkcs7`.
	#[serde(default, alias = "attestedDocumentSource")]
	pub attested_document_source: Option<AttestedDocumentSource>,
}
impl AuthConfig {
	/// Create a configuration for the given method with no material references.
	pub fn new(authn_method: AuthnMethod) -> Self {
		Self {
			authn_method,
			client_secret_env_var_name: None,
			private_key_env_var_name: None,
			certificate_chain_env_var_name: None,
			oidc_token_file_path: None,
			federated_credential_name: None,
			attested_document_source: None,
		}
	}

	/// Validate that the method's required material references are present.
	pub fn validate(&self) -> Result<()> {
		match self.authn_method {
			AuthnMethod::ClientSecretBasic
			| AuthnMethod::ClientSecretPost
			| AuthnMethod::ClientSecretJwt =>
				require(self.client_secret_env_var_name.as_deref(), "client_secret_env_var_name"),
			AuthnMethod::PrivateKeyJwt =>
				require(self.private_key_env_var_name.as_deref(), "private_key_env_var_name"),
			AuthnMethod::Pca => {
				require(self.private_key_env_var_name.as_deref(), "private_key_env_var_name")?;
				require(
					self.certificate_chain_env_var_name.as_deref(),
					"certificate_chain_env_var_name",
				)
			},
			AuthnMethod::Pkcs7 => {
				if self.attested_document_source.is_none() {
					return Err(Error::Config {
						field: "attested_document_source",
						reason: "Required for the pkcs7 method.".into(),
					});
				}

				require(self.federated_credential_name.as_deref(), "federated_credential_name")
			},
			AuthnMethod::Oidc => {
				if self.oidc_token_file_path.is_none() {
					return Err(Error::Config {
						field: "oidc_token_file_path",
						reason: "Required for the oidc method.".into(),
					});
				}

				require(self.federated_credential_name.as_deref(), "federated_credential_name")
			},
		}
	}
}

/// Per-instance client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Identifier of this client instance, used in logs.
	#[serde(alias = "instanceId")]
	pub instance_id: String,
	/// OAuth client identifier.
	#[serde(alias = "clientId")]
	pub client_id: String,
	/// OAuth scope requested with every token.
	#[serde(default = "default_scope")]
	pub scope: String,
	/// Token endpoint URL.
	#[serde(alias = "tokenEndpoint")]
	pub token_endpoint: Url,
	/// Issuer URL of the identity service.
	pub issuer: Url,
	/// Connect timeout in seconds.
	#[serde(
		default = "default_connect_timeout",
		alias = "connectTimeout",
		alias = "connect_timeout"
	)]
	pub connect_timeout_secs: u64,
	/// Read timeout in seconds.
	#[serde(default = "default_read_timeout", alias = "readTimeout", alias = "read_timeout")]
	pub read_timeout_secs: u64,
	/// Whether TLS certificates are verified.
	#[serde(default = "default_true", alias = "verifySsl")]
	pub verify_ssl: bool,
	/// Policy applied when a refresh fails with a stale entry in hand.
	#[serde(default, alias = "staleValuePolicy")]
	pub stale_value_policy: StaleValuePolicy,
	/// Strategy servicing prefetch-window reads.
	#[serde(default, alias = "prefetchStrategy")]
	pub prefetch_strategy: PrefetchStrategyKind,
	/// Authentication method and material references.
	#[serde(alias = "authConfig")]
	pub auth: AuthConfig,
}
impl ClientConfig {
	/// Create a configuration with default scope, timeouts, and policies.
	pub fn new(
		instance_id: impl Into<String>,
		client_id: impl Into<String>,
		token_endpoint: impl AsRef<str>,
		issuer: impl AsRef<str>,
		auth: AuthConfig,
	) -> Result<Self> {
		Ok(Self {
			instance_id: instance_id.into(),
			client_id: client_id.into(),
			scope: DEFAULT_SCOPE.into(),
			token_endpoint: Url::parse(token_endpoint.as_ref())?,
			issuer: Url::parse(issuer.as_ref())?,
			connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
			read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
			verify_ssl: true,
			stale_value_policy: StaleValuePolicy::default(),
			prefetch_strategy: PrefetchStrategyKind::default(),
			auth,
		})
	}

	/// Connect timeout as a duration.
	pub fn connect_timeout(&self) -> Duration {
		Duration::from_secs(self.connect_timeout_secs)
	}

	/// Read timeout as a duration.
	pub fn read_timeout(&self) -> Duration {
		Duration::from_secs(self.read_timeout_secs)
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.instance_id.is_empty() {
			return Err(Error::Config { field: "instance_id", reason: "Must not be empty.".into() });
		}
		if self.client_id.is_empty() {
			return Err(Error::Config { field: "client_id", reason: "Must not be empty.".into() });
		}
		if self.scope.is_empty() {
			return Err(Error::Config { field: "scope", reason: "Must not be empty.".into() });
		}

		validate_timeout(self.connect_timeout_secs, "connect_timeout_secs")?;
		validate_timeout(self.read_timeout_secs, "read_timeout_secs")?;

		self.auth.validate()
	}
}

fn require(value: Option<&str>, field: &'static str) -> Result<()> {
	match value {
		Some(value) if !value.is_empty() => Ok(()),
		_ => Err(Error::Config { field, reason: "Required for the configured method.".into() }),
	}
}

fn validate_timeout(secs: u64, field: &'static str) -> Result<()> {
	if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) {
		return Err(Error::Config {
			field,
			reason: format!(
				"Must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {secs}."
			),
		});
	}

	Ok(())
}

fn default_scope() -> String {
	DEFAULT_SCOPE.into()
}

fn default_connect_timeout() -> u64 {
	DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_timeout() -> u64 {
	DEFAULT_READ_TIMEOUT_SECS
}

fn default_true() -> bool {
	true
}
