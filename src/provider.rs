//! Token-fetching credential provider.

// crates.io
use reqwest::Client;
// self
use crate::{
	_prelude::*,
	auth::{
		assertion::{ClientAssertionProvider, ClientSecretAssertion, PrivateKeyAssertion},
		chain::EnvCertificateChain,
		oidc::{FileOidcTokenProvider, OidcTokenProvider},
		pkcs7::{
			AlibabaCloudEcsAttestedDocumentProvider, AttestedDocumentProvider,
			AwsEc2AttestedDocumentProvider,
		},
		read_env,
	},
	cache::{
		prefetch::{NonBlockingPrefetchStrategy, OneCallerBlocksPrefetchStrategy, PrefetchStrategy},
		refresh::RefreshResult,
		supplier::{BoxFuture, CachedResultSupplier, JitterBounds, Refresher},
	},
	config::{AttestedDocumentSource, AuthnMethod, ClientConfig, PrefetchStrategyKind},
	http::client as http_client,
	request::{self, AuthMaterial},
	time::SystemTimeSource,
	token::TokenResponse,
};

/// Machine-to-machine credential provider.
///
/// Owns one [`CachedResultSupplier`] whose refresh function assembles and
/// sends the token request for the configured authentication method. The
/// provider is cheap to clone, reusable, and safe to call concurrently.
#[derive(Clone, Debug)]
pub struct CredentialProvider {
	supplier: CachedResultSupplier<TokenResponse>,
}
impl CredentialProvider {
	/// Build a provider from a validated configuration using the shared HTTP
	/// client.
	pub fn new(config: ClientConfig) -> Result<Self> {
		Self::builder(config).build()
	}

	/// Create a [`CredentialProviderBuilder`] for advanced configuration.
	pub fn builder(config: ClientConfig) -> CredentialProviderBuilder {
		CredentialProviderBuilder {
			config,
			client: None,
			time: Arc::new(SystemTimeSource),
			jitter: Some(JitterBounds::default()),
			assertion: None,
			oidc: None,
			pkcs7: None,
		}
	}

	/// Current access credential, refreshed transparently as it ages.
	pub async fn get_credential(&self) -> Result<TokenResponse> {
		self.supplier.get().await
	}

	/// Bearer token string for the current credential.
	pub async fn get_bearer_token(&self) -> Result<String> {
		Ok(self.get_credential().await?.access_token)
	}
}

/// Builder for [`CredentialProvider`] with overrides for the HTTP client,
/// clock, jitter, and material providers (primarily for tests).
#[derive(Debug)]
pub struct CredentialProviderBuilder {
	config: ClientConfig,
	client: Option<Client>,
	time: Arc<dyn TimeSource>,
	jitter: Option<JitterBounds>,
	assertion: Option<Arc<dyn ClientAssertionProvider>>,
	oidc: Option<Arc<dyn OidcTokenProvider>>,
	pkcs7: Option<Arc<dyn AttestedDocumentProvider>>,
}
impl CredentialProviderBuilder {
	/// Use a dedicated HTTP client instead of the process-wide one.
	pub fn http_client(mut self, client: Client) -> Self {
		self.client = Some(client);

		self
	}

	/// Override the wall-clock source.
	pub fn time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
		self.time = time;

		self
	}

	/// Override the refresh jitter bounds; `None` disables jitter.
	pub fn jitter(mut self, jitter: Option<JitterBounds>) -> Self {
		self.jitter = jitter;

		self
	}

	/// Inject a client assertion provider in place of the configured one.
	pub fn client_assertion_provider(
		mut self,
		provider: Arc<dyn ClientAssertionProvider>,
	) -> Self {
		self.assertion = Some(provider);

		self
	}

	/// Inject an OIDC token provider in place of the configured one.
	pub fn oidc_token_provider(mut self, provider: Arc<dyn OidcTokenProvider>) -> Self {
		self.oidc = Some(provider);

		self
	}

	/// Inject an attested document provider in place of the configured one.
	pub fn attested_document_provider(
		mut self,
		provider: Arc<dyn AttestedDocumentProvider>,
	) -> Self {
		self.pkcs7 = Some(provider);

		self
	}

	/// Finalise the provider, validating the configuration.
	pub fn build(self) -> Result<CredentialProvider> {
		self.config.validate()?;

		let Self { config, client, time, jitter, assertion, oidc, pkcs7 } = self;
		let client = match client {
			Some(client) => client,
			None => http_client::shared_client(&config)?,
		};
		let config = Arc::new(config);
		let refresher = CredentialRefresher::assemble(
			config.clone(),
			client,
			time.clone(),
			assertion,
			oidc,
			pkcs7,
		)?;
		let strategy: Arc<dyn PrefetchStrategy> = match config.prefetch_strategy {
			PrefetchStrategyKind::OneCallerBlocks =>
				Arc::new(OneCallerBlocksPrefetchStrategy::default()),
			PrefetchStrategyKind::NonBlocking => Arc::new(NonBlockingPrefetchStrategy),
		};
		let supplier = CachedResultSupplier::builder(refresher)
			.strategy(strategy)
			.policy(config.stale_value_policy)
			.jitter(jitter)
			.time_source(time)
			.label(format!("credential:{}:{}", config.instance_id, config.client_id))
			.build();

		Ok(CredentialProvider { supplier })
	}
}

/// Refresh function for the credential supplier: resolve material for the
/// configured method, post the token request, and compute cache timings.
#[derive(Debug)]
struct CredentialRefresher {
	config: Arc<ClientConfig>,
	client: Client,
	time: Arc<dyn TimeSource>,
	assertion: Option<Arc<dyn ClientAssertionProvider>>,
	oidc: Option<Arc<dyn OidcTokenProvider>>,
	pkcs7: Option<Arc<dyn AttestedDocumentProvider>>,
}
impl CredentialRefresher {
	fn assemble(
		config: Arc<ClientConfig>,
		client: Client,
		time: Arc<dyn TimeSource>,
		assertion: Option<Arc<dyn ClientAssertionProvider>>,
		oidc: Option<Arc<dyn OidcTokenProvider>>,
		pkcs7: Option<Arc<dyn AttestedDocumentProvider>>,
	) -> Result<Self> {
		let auth = &config.auth;
		let audience = config.token_endpoint.as_str().to_string();
		let assertion = match (assertion, auth.authn_method) {
			(Some(provider), _) => Some(provider),
			(None, AuthnMethod::ClientSecretJwt) => {
				let secret_env = required(
					auth.client_secret_env_var_name.as_deref(),
					"client_secret_env_var_name",
				)?;

				Some(Arc::new(
					ClientSecretAssertion::new(config.client_id.clone(), audience, secret_env)
						.with_time_source(time.clone()),
				) as Arc<dyn ClientAssertionProvider>)
			},
			(None, AuthnMethod::PrivateKeyJwt | AuthnMethod::Pca) => {
				let key_env = required(
					auth.private_key_env_var_name.as_deref(),
					"private_key_env_var_name",
				)?;
				let mut provider =
					PrivateKeyAssertion::new(config.client_id.clone(), audience, key_env)
						.with_time_source(time.clone());

				if auth.authn_method == AuthnMethod::Pca {
					let chain_env = required(
						auth.certificate_chain_env_var_name.as_deref(),
						"certificate_chain_env_var_name",
					)?;

					provider = provider
						.with_certificate_chain(Arc::new(EnvCertificateChain::new(chain_env)));
				}

				Some(Arc::new(provider) as Arc<dyn ClientAssertionProvider>)
			},
			(None, _) => None,
		};
		let oidc = match (oidc, auth.authn_method) {
			(Some(provider), _) => Some(provider),
			(None, AuthnMethod::Oidc) => {
				let path = auth.oidc_token_file_path.clone().ok_or_else(|| Error::Config {
					field: "oidc_token_file_path",
					reason: "Required for the oidc method.".into(),
				})?;

				Some(Arc::new(FileOidcTokenProvider::new(path).with_time_source(time.clone()))
					as Arc<dyn OidcTokenProvider>)
			},
			(None, _) => None,
		};
		let pkcs7 = match (pkcs7, auth.authn_method) {
			(Some(provider), _) => Some(provider),
			(None, AuthnMethod::Pkcs7) => match auth.attested_document_source {
				Some(AttestedDocumentSource::AlibabaCloudEcs) =>
					Some(Arc::new(AlibabaCloudEcsAttestedDocumentProvider::new(client.clone()))
						as Arc<dyn AttestedDocumentProvider>),
				Some(AttestedDocumentSource::AwsEc2) =>
					Some(Arc::new(AwsEc2AttestedDocumentProvider)
						as Arc<dyn AttestedDocumentProvider>),
				None =>
					return Err(Error::Config {
						field: "attested_document_source",
						reason: "Required for the pkcs7 method.".into(),
					}),
			},
			(None, _) => None,
		};

		Ok(Self { config, client, time, assertion, oidc, pkcs7 })
	}

	fn client_secret(&self) -> Result<String> {
		let name = required(
			self.config.auth.client_secret_env_var_name.as_deref(),
			"client_secret_env_var_name",
		)?;

		read_env(name)
	}

	fn federated_credential_name(&self) -> Result<String> {
		required(
			self.config.auth.federated_credential_name.as_deref(),
			"federated_credential_name",
		)
		.map(str::to_string)
	}

	async fn resolve_material(&self) -> Result<AuthMaterial> {
		match self.config.auth.authn_method {
			AuthnMethod::ClientSecretBasic =>
				Ok(AuthMaterial::BasicSecret(self.client_secret()?)),
			AuthnMethod::ClientSecretPost =>
				Ok(AuthMaterial::PostedSecret(self.client_secret()?)),
			AuthnMethod::ClientSecretJwt | AuthnMethod::PrivateKeyJwt | AuthnMethod::Pca => {
				let provider = self.assertion.as_ref().ok_or_else(|| {
					Error::Credential("No client assertion provider is configured.".into())
				})?;

				Ok(AuthMaterial::ClientAssertion(provider.client_assertion()?))
			},
			AuthnMethod::Pkcs7 => {
				let provider = self.pkcs7.as_ref().ok_or_else(|| {
					Error::Credential("No attested document provider is configured.".into())
				})?;

				Ok(AuthMaterial::Pkcs7 {
					document: provider.attested_document().await?,
					federated_credential_name: self.federated_credential_name()?,
				})
			},
			AuthnMethod::Oidc => {
				let provider = self.oidc.as_ref().ok_or_else(|| {
					Error::Credential("No OIDC token provider is configured.".into())
				})?;

				Ok(AuthMaterial::Oidc {
					token: provider.oidc_token()?,
					federated_credential_name: self.federated_credential_name()?,
				})
			},
		}
	}
}
impl Refresher<TokenResponse> for CredentialRefresher {
	fn refresh(&self) -> BoxFuture<'_, Result<RefreshResult<TokenResponse>>> {
		Box::pin(async move {
			tracing::debug!(
				instance = %self.config.instance_id,
				client_id = %self.config.client_id,
				method = ?self.config.auth.authn_method,
				"refreshing access credential"
			);

			let material = self.resolve_material().await?;
			let token_request = request::build_token_request(&self.config, material)?;
			let token =
				http_client::send_token_request(&self.client, &self.config, token_request).await?;
			let now = self.time.now();

			Ok(token.ensure_expires_at(now).refresh_result(now))
		})
	}
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str> {
	value.filter(|value| !value.is_empty()).ok_or_else(|| Error::Config {
		field,
		reason: "Required for the configured method.".into(),
	})
}
