//! OAuth 2.0 token request assembly.
//!
//! Pure functions from resolved authentication material to the headers and
//! urlencoded form posted to the token endpoint; no I/O happens here.

// crates.io
use base64::prelude::*;
use http::{
	HeaderMap, HeaderValue,
	header::{ACCEPT, AUTHORIZATION},
};
// self
use crate::{_prelude::*, config::ClientConfig};

/// Grant type used for every machine-to-machine token request.
pub const GRANT_TYPE: &str = "client_credentials";
/// Client assertion type for the JWT-based methods (RFC 7523).
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Authentication material resolved for a single token request.
#[derive(Clone, Debug)]
pub enum AuthMaterial {
	/// Shared secret presented in the Basic authorization header.
	BasicSecret(String),
	/// Shared secret posted in the form body.
	PostedSecret(String),
	/// Signed JWT client assertion (shared-secret, private-key, or
	/// certificate-bound).
	ClientAssertion(String),
	/// PKCS7 attested document exchanged through a federated credential.
	Pkcs7 {
		/// The attested document.
		document: String,
		/// Federated credential registered with the identity service.
		federated_credential_name: String,
	},
	/// Federated OIDC token.
	Oidc {
		/// The raw OIDC token.
		token: String,
		/// Federated credential registered with the identity service.
		federated_credential_name: String,
	},
}

/// Assembled token endpoint request: headers plus the urlencoded form.
#[derive(Clone, Debug)]
pub struct TokenRequest {
	/// Headers beyond the form content type.
	pub headers: HeaderMap,
	/// Form fields posted to the token endpoint.
	pub form: Vec<(&'static str, String)>,
}

/// Assemble the token request for the resolved material.
pub fn build_token_request(config: &ClientConfig, material: AuthMaterial) -> Result<TokenRequest> {
	let mut headers = HeaderMap::new();

	headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

	let mut form = vec![("grant_type", GRANT_TYPE.to_string())];

	match material {
		AuthMaterial::BasicSecret(secret) => {
			let credentials = BASE64_STANDARD.encode(format!("{}:{secret}", config.client_id));
			let value = HeaderValue::from_str(&format!("Basic {credentials}")).map_err(|_| {
				Error::Encoding("Client credentials contain non-header-safe bytes.".into())
			})?;

			headers.insert(AUTHORIZATION, value);
		},
		AuthMaterial::PostedSecret(secret) => {
			form.push(("client_id", config.client_id.clone()));
			form.push(("client_secret", secret));
		},
		AuthMaterial::ClientAssertion(assertion) => {
			form.push(("client_id", config.client_id.clone()));
			form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.into()));
			form.push(("client_assertion", assertion));
		},
		AuthMaterial::Pkcs7 { document, federated_credential_name } => {
			form.push(("client_id", config.client_id.clone()));
			form.push(("pkcs7_document", document));
			form.push(("federated_credential_name", federated_credential_name));
		},
		AuthMaterial::Oidc { token, federated_credential_name } => {
			form.push(("client_id", config.client_id.clone()));
			form.push(("oidc_token", token));
			form.push(("federated_credential_name", federated_credential_name));
		},
	}

	form.push(("scope", config.scope.clone()));

	Ok(TokenRequest { headers, form })
}
