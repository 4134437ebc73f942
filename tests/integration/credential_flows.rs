//! Integration coverage for the authentication method flows.

// std
use std::{env, fs};
// crates.io
use base64::prelude::*;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use m2m_credential_cache::{
	AuthConfig, AuthnMethod, ClientConfig, CredentialProvider, Error, Result,
};
use reqwest::Client;
use serde::Deserialize;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_string, body_string_contains, header, method, path},
};

const TOKEN_BODY: &str = r#"{"access_token":"T1","token_type":"Bearer","expires_in":3600}"#;

fn secret_post_config(server: &MockServer, secret_env: &str) -> ClientConfig {
	let mut auth = AuthConfig::new(AuthnMethod::ClientSecretPost);

	auth.client_secret_env_var_name = Some(secret_env.into());

	let mut config = ClientConfig::new(
		"instance-1",
		"abc",
		format!("{}/token", server.uri()),
		server.uri(),
		auth,
	)
	.expect("config");

	config.scope = "pam".into();

	config
}

#[tokio::test]
async fn client_secret_post_happy_path_caches_the_token() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	// SAFETY: test-local variable name; no other thread reads it.
	unsafe {
		env::set_var("FLOW_TEST_POST_SECRET", "sekrit");
	}

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.and(body_string("grant_type=client_credentials&client_id=abc&client_secret=sekrit&scope=pam"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(TOKEN_BODY)
				.insert_header("content-type", "application/json"),
		)
		.expect(1)
		.mount(&server)
		.await;

	let provider = CredentialProvider::builder(secret_post_config(&server, "FLOW_TEST_POST_SECRET"))
		.http_client(Client::new())
		.jitter(None)
		.build()?;

	assert_eq!(provider.get_bearer_token().await?, "T1");
	assert_eq!(provider.get_bearer_token().await?, "T1");

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn client_secret_basic_rides_in_the_authorization_header() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	unsafe {
		env::set_var("FLOW_TEST_BASIC_SECRET", "sekrit");
	}

	let server = MockServer::start().await;
	let expected = format!("Basic {}", BASE64_STANDARD.encode("abc:sekrit"));

	Mock::given(method("POST"))
		.and(path("/token"))
		.and(header("authorization", expected.as_str()))
		.and(body_string("grant_type=client_credentials&scope=pam"))
		.respond_with(ResponseTemplate::new(200).set_body_string(TOKEN_BODY))
		.expect(1)
		.mount(&server)
		.await;

	let mut config = secret_post_config(&server, "FLOW_TEST_BASIC_SECRET");

	config.auth.authn_method = AuthnMethod::ClientSecretBasic;

	let provider = CredentialProvider::builder(config)
		.http_client(Client::new())
		.jitter(None)
		.build()?;

	assert_eq!(provider.get_bearer_token().await?, "T1");

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn four_xx_responses_map_to_client_errors_with_request_id() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	unsafe {
		env::set_var("FLOW_TEST_4XX_SECRET", "sekrit");
	}

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(
			ResponseTemplate::new(401)
				.set_body_string(r#"{"error":"invalid_client","error_description":"bad secret"}"#)
				.insert_header("x-request-id", "r-42"),
		)
		.mount(&server)
		.await;

	let provider = CredentialProvider::builder(secret_post_config(&server, "FLOW_TEST_4XX_SECRET"))
		.http_client(Client::new())
		.jitter(None)
		.build()?;
	let err = provider.get_credential().await.unwrap_err();

	match err {
		Error::Client { status, error_code, description, request_id } => {
			assert_eq!(status, 401);
			assert_eq!(error_code, "invalid_client");
			assert_eq!(description.as_deref(), Some("bad secret"));
			assert_eq!(request_id.as_deref(), Some("r-42"));
		},
		other => panic!("expected a client error, got {other:?}"),
	}

	Ok(())
}

#[tokio::test]
async fn five_xx_responses_map_to_server_errors() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	unsafe {
		env::set_var("FLOW_TEST_5XX_SECRET", "sekrit");
	}

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(
			ResponseTemplate::new(503)
				.set_body_string("upstream overloaded")
				.insert_header("x-request-id", "r-43"),
		)
		.mount(&server)
		.await;

	let provider = CredentialProvider::builder(secret_post_config(&server, "FLOW_TEST_5XX_SECRET"))
		.http_client(Client::new())
		.jitter(None)
		.build()?;
	let err = provider.get_credential().await.unwrap_err();

	match err {
		Error::Server { status, request_id, body } => {
			assert_eq!(status, 503);
			assert_eq!(request_id.as_deref(), Some("r-43"));
			assert_eq!(body.as_deref(), Some("upstream overloaded"));
		},
		other => panic!("expected a server error, got {other:?}"),
	}

	Ok(())
}

#[tokio::test]
async fn client_secret_jwt_posts_a_decodable_assertion() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	unsafe {
		env::set_var("FLOW_TEST_JWT_SECRET", "sekrit");
	}

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.and(body_string_contains("client_assertion_type=urn%3Aietf%3Aparams%3Aoauth%3Aclient-assertion-type%3Ajwt-bearer"))
		.respond_with(ResponseTemplate::new(200).set_body_string(TOKEN_BODY))
		.expect(1)
		.mount(&server)
		.await;

	let mut config = secret_post_config(&server, "FLOW_TEST_JWT_SECRET");

	config.auth.authn_method = AuthnMethod::ClientSecretJwt;

	let provider = CredentialProvider::builder(config)
		.http_client(Client::new())
		.jitter(None)
		.build()?;

	assert_eq!(provider.get_bearer_token().await?, "T1");

	// Pull the assertion back out of the recorded request and verify the
	// claims against the shared secret.
	#[derive(Debug, Deserialize)]
	struct Claims {
		iss: String,
		sub: String,
		aud: String,
		jti: String,
		iat: i64,
		exp: i64,
	}

	let requests = server.received_requests().await.expect("recorded requests");
	let body = String::from_utf8(requests[0].body.clone()).expect("utf-8 body");
	let assertion = body
		.split('&')
		.find_map(|pair| pair.strip_prefix("client_assertion="))
		.expect("assertion field");
	let assertion: String = urlencoding_decode(assertion);
	let mut validation = Validation::new(Algorithm::HS256);

	validation.set_audience(&[format!("{}/token", server.uri())]);

	let claims = jsonwebtoken::decode::<Claims>(
		&assertion,
		&DecodingKey::from_secret(b"sekrit"),
		&validation,
	)
	.expect("assertion decodes with the shared secret")
	.claims;

	assert_eq!(claims.iss, "abc");
	assert_eq!(claims.sub, "abc");
	assert_eq!(claims.aud, format!("{}/token", server.uri()));
	assert_eq!(claims.exp - claims.iat, 300);
	assert_eq!(claims.jti.len(), 32);

	Ok(())
}

#[tokio::test]
async fn oidc_tokens_are_read_from_file_and_posted() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let exp = chrono::Utc::now().timestamp() + 3_600;
	let oidc_token = format!(
		"{}.{}.sig",
		BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
		BASE64_URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#)),
	);
	let token_path = env::temp_dir().join(format!("oidc-flow-{}.jwt", std::process::id()));

	fs::write(&token_path, &oidc_token).expect("token file");

	Mock::given(method("POST"))
		.and(path("/token"))
		.and(body_string_contains("oidc_token="))
		.and(body_string_contains("federated_credential_name=ci-pipeline"))
		.respond_with(ResponseTemplate::new(200).set_body_string(TOKEN_BODY))
		.expect(1)
		.mount(&server)
		.await;

	let mut auth = AuthConfig::new(AuthnMethod::Oidc);

	auth.oidc_token_file_path = Some(token_path.clone());
	auth.federated_credential_name = Some("ci-pipeline".into());

	let mut config = ClientConfig::new(
		"instance-1",
		"abc",
		format!("{}/token", server.uri()),
		server.uri(),
		auth,
	)?;

	config.scope = "pam".into();

	let provider = CredentialProvider::builder(config)
		.http_client(Client::new())
		.jitter(None)
		.build()?;

	assert_eq!(provider.get_bearer_token().await?, "T1");

	server.verify().await;
	fs::remove_file(&token_path).ok();
	Ok(())
}

/// Minimal percent-decoding for the urlencoded assertion field; JWT
/// characters only need `%2B`/`%2F`/`%3D`-style escapes undone.
fn urlencoding_decode(value: &str) -> String {
	let mut decoded = Vec::new();
	let mut bytes = value.bytes();

	while let Some(byte) = bytes.next() {
		match byte {
			b'%' => {
				let high = bytes.next().unwrap_or(b'0');
				let low = bytes.next().unwrap_or(b'0');
				let hex = [high, low];
				let hex = std::str::from_utf8(&hex).unwrap_or("00");

				decoded.push(u8::from_str_radix(hex, 16).unwrap_or(0));
			},
			b'+' => decoded.push(b' '),
			other => decoded.push(other),
		}
	}

	String::from_utf8(decoded).expect("utf-8 after decoding")
}
