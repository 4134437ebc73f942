//! Shared HTTP transport and token endpoint exchange.

// std
use std::sync::{Mutex, PoisonError};
// crates.io
use reqwest::{Client, Response};
// self
use crate::{
	_prelude::*,
	config::ClientConfig,
	request::TokenRequest,
	token::{OAuthErrorBody, TokenResponse},
};

/// Header carrying the service-side request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

static SHARED_CLIENT: Mutex<Option<Client>> = Mutex::new(None);

/// Install a process-wide HTTP client, replacing any existing one.
pub fn initialize_shared_client(client: Client) {
	*SHARED_CLIENT.lock().unwrap_or_else(PoisonError::into_inner) = Some(client);
}

/// Drop the process-wide HTTP client; the next provider rebuilds it lazily.
pub fn shutdown_shared_client() {
	SHARED_CLIENT.lock().unwrap_or_else(PoisonError::into_inner).take();
}

/// Fetch the process-wide client, building it from the configuration on
/// first use. The client carries its own connection pool and is safe to
/// share across providers.
pub fn shared_client(config: &ClientConfig) -> Result<Client> {
	let mut slot = SHARED_CLIENT.lock().unwrap_or_else(PoisonError::into_inner);

	if let Some(client) = slot.as_ref() {
		return Ok(client.clone());
	}

	let client = build_client(config)?;

	*slot = Some(client.clone());

	Ok(client)
}

/// Build a dedicated client from the configuration.
pub fn build_client(config: &ClientConfig) -> Result<Client> {
	Client::builder()
		.user_agent(format!("m2m-credential-cache/{}", env!("CARGO_PKG_VERSION")))
		.connect_timeout(config.connect_timeout())
		.danger_accept_invalid_certs(!config.verify_ssl)
		.build()
		.map_err(Error::transport)
}

/// Post the assembled request to the token endpoint and map the outcome.
pub async fn send_token_request(
	client: &Client,
	config: &ClientConfig,
	request: TokenRequest,
) -> Result<TokenResponse> {
	let response = client
		.post(config.token_endpoint.clone())
		.headers(request.headers)
		.form(&request.form)
		.timeout(config.read_timeout())
		.send()
		.await
		.map_err(Error::transport)?;

	map_token_response(response).await
}

async fn map_token_response(response: Response) -> Result<TokenResponse> {
	let status = response.status();

	if status.is_success() {
		let bytes = response.bytes().await.map_err(Error::transport)?;

		return serde_json::from_slice::<TokenResponse>(&bytes).map_err(|err| {
			Error::Encoding(format!("Token response is not the expected JSON shape: {err}."))
		});
	}

	let request_id = response
		.headers()
		.get(REQUEST_ID_HEADER)
		.and_then(|value| value.to_str().ok())
		.map(|value| value.to_string());

	if status.is_client_error() {
		let body: OAuthErrorBody =
			response.json().await.unwrap_or_default();

		return Err(Error::Client {
			status: status.as_u16(),
			error_code: body.error.unwrap_or_else(|| "unknown_error".into()),
			description: body.error_description,
			request_id,
		});
	}

	let body = response.text().await.ok().filter(|body| !body.is_empty());

	Err(Error::Server { status: status.as_u16(), request_id, body })
}
