//! PKCS7 attested document material from cloud metadata services.

// std
use std::fmt::Debug;
// crates.io
use reqwest::{Client, StatusCode};
// self
use crate::{
	_prelude::*,
	cache::{
		refresh::RefreshResult,
		supplier::{BoxFuture, CachedResultSupplier, Refresher},
	},
};

/// Alibaba Cloud ECS metadata service origin.
pub const ECS_METADATA_BASE: &str = "http://100.100.100.200";
/// Metadata session token path.
const SESSION_TOKEN_PATH: &str = "/latest/api/token";
/// Attested PKCS7 document path.
const PKCS7_DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/pkcs7";
/// Session token TTL requested from the metadata service.
const SESSION_TOKEN_TTL_SECS: u64 = 21_600;
/// Attested documents are valid for one hour.
const DOCUMENT_LIFETIME_SECS: u64 = 3_600;

/// Supplies a PKCS7-signed attested instance identity document.
pub trait AttestedDocumentProvider: Debug + Send + Sync {
	/// Current attested document.
	fn attested_document(&self) -> BoxFuture<'_, Result<String>>;
}

/// Fetches the attested document from the Alibaba Cloud ECS metadata service,
/// cached for the document's one-hour validity behind its own supplier.
///
/// The metadata exchange is two-step: a PUT obtains a session token, then the
/// document GET presents it. A 401 on the GET retries once with a fresh
/// session token.
#[derive(Clone, Debug)]
pub struct AlibabaCloudEcsAttestedDocumentProvider {
	supplier: CachedResultSupplier<String>,
}
impl AlibabaCloudEcsAttestedDocumentProvider {
	/// Create a provider against the public metadata endpoint.
	pub fn new(client: Client) -> Self {
		Self::with_base_url(client, ECS_METADATA_BASE)
	}

	/// Create a provider against a custom metadata origin (primarily for tests).
	pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
		let refresher = EcsDocumentRefresher { client, base_url: base_url.into() };
		let supplier = CachedResultSupplier::builder(refresher)
			.label("ecs-attested-document")
			.build();

		Self { supplier }
	}
}
impl AttestedDocumentProvider for AlibabaCloudEcsAttestedDocumentProvider {
	fn attested_document(&self) -> BoxFuture<'_, Result<String>> {
		Box::pin(self.supplier.get())
	}
}

/// Placeholder for the EC2 attested document flow; fails on use.
#[derive(Clone, Copy, Debug, Default)]
pub struct AwsEc2AttestedDocumentProvider;
impl AttestedDocumentProvider for AwsEc2AttestedDocumentProvider {
	fn attested_document(&self) -> BoxFuture<'_, Result<String>> {
		Box::pin(async {
			Err(Error::NotImplemented("EC2 attested document retrieval".into()))
		})
	}
}

/// Fixed attested document, useful for tests and embedders.
#[derive(Clone, Debug)]
pub struct StaticPkcs7 {
	document: String,
}
impl StaticPkcs7 {
	/// Create a holder around a raw PKCS7 document.
	pub fn new(document: impl Into<String>) -> Self {
		Self { document: document.into() }
	}
}
impl AttestedDocumentProvider for StaticPkcs7 {
	fn attested_document(&self) -> BoxFuture<'_, Result<String>> {
		let document = self.document.clone();

		Box::pin(async move { Ok(document) })
	}
}

#[derive(Clone, Debug)]
struct EcsDocumentRefresher {
	client: Client,
	base_url: String,
}
impl EcsDocumentRefresher {
	async fn session_token(&self) -> Result<String> {
		let response = self
			.client
			.put(format!("{}{SESSION_TOKEN_PATH}", self.base_url))
			.header("X-aliyun-ecs-metadata-token-ttl-seconds", SESSION_TOKEN_TTL_SECS)
			.send()
			.await
			.map_err(Error::transport)?;

		if !response.status().is_success() {
			return Err(Error::Credential(format!(
				"Metadata service refused a session token (status {}).",
				response.status()
			)));
		}

		response.text().await.map_err(Error::transport)
	}

	async fn get_document(&self, session_token: &str) -> Result<DocumentFetch> {
		let response = self
			.client
			.get(format!("{}{PKCS7_DOCUMENT_PATH}", self.base_url))
			.header("X-aliyun-ecs-metadata-token", session_token)
			.send()
			.await
			.map_err(Error::transport)?;
		let status = response.status();

		if status == StatusCode::UNAUTHORIZED {
			return Ok(DocumentFetch::Unauthorized);
		}
		if !status.is_success() {
			return Err(Error::Credential(format!(
				"Metadata service returned status {status} for the attested document."
			)));
		}

		response.text().await.map_err(Error::transport).map(DocumentFetch::Document)
	}

	async fn fetch_document(&self) -> Result<String> {
		let session_token = self.session_token().await?;

		match self.get_document(&session_token).await? {
			DocumentFetch::Document(document) => Ok(document),
			DocumentFetch::Unauthorized => {
				tracing::debug!("metadata session token rejected; retrying once with a fresh one");

				let session_token = self.session_token().await?;

				match self.get_document(&session_token).await? {
					DocumentFetch::Document(document) => Ok(document),
					DocumentFetch::Unauthorized => Err(Error::Credential(
						"Metadata service rejected the refreshed session token.".into(),
					)),
				}
			},
		}
	}
}
impl Refresher<String> for EcsDocumentRefresher {
	fn refresh(&self) -> BoxFuture<'_, Result<RefreshResult<String>>> {
		Box::pin(async move {
			let document = self.fetch_document().await?;

			Ok(RefreshResult::from_lifetime(document, Utc::now(), DOCUMENT_LIFETIME_SECS))
		})
	}
}

#[derive(Debug)]
enum DocumentFetch {
	Document(String),
	Unauthorized,
}
