//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the credential cache crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Jsonwebtoken(#[from] jsonwebtoken::errors::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Cache error: {0}")]
	Cache(String),
	#[error("Token endpoint rejected the request with status {status}: {error_code} ({description:?}, request id {request_id:?})")]
	Client {
		status: u16,
		error_code: String,
		description: Option<String>,
		request_id: Option<String>,
	},
	#[error("Concurrent operation: {0}")]
	ConcurrentOperation(String),
	#[error("Configuration error for {field}: {reason}")]
	Config { field: &'static str, reason: String },
	#[error("Credential material unavailable: {0}")]
	Credential(String),
	#[error("Encoding error: {0}")]
	Encoding(String),
	#[error("HTTP transport error ({code}): {source}")]
	Http {
		code: &'static str,
		#[source]
		source: reqwest::Error,
	},
	#[error("Not implemented: {0}")]
	NotImplemented(String),
	#[error("Token endpoint failed with status {status} (request id {request_id:?}): {body:?}")]
	Server { status: u16, request_id: Option<String>, body: Option<String> },
}
impl Error {
	/// Stable identifier for the error kind, suitable for logs and telemetry.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Io(_) => "io_error",
			Self::Jsonwebtoken(_) | Self::Encoding(_) => "encoding_error",
			Self::Serde(_) => "serde_error",
			Self::Url(_) | Self::Config { .. } => "config_error",
			Self::Cache(_) => "cache_error",
			Self::Client { .. } => "client_error",
			Self::ConcurrentOperation(_) => "concurrent_operation_error",
			Self::Credential(_) => "credential_error",
			Self::Http { code, .. } => code,
			Self::NotImplemented(_) => "not-implemented",
			Self::Server { .. } => "server_error",
		}
	}

	/// Classify a reqwest failure into the transport taxonomy.
	pub(crate) fn transport(source: reqwest::Error) -> Self {
		let code = if source.is_timeout() {
			"http_timeout_error"
		} else if source.is_connect() {
			"http_connect_error"
		} else {
			"http_transport_error"
		};

		Self::Http { code, source }
	}
}
