//! Integration coverage for the metadata-service material providers.

// crates.io
use m2m_credential_cache::{
	Result,
	auth::pkcs7::{AlibabaCloudEcsAttestedDocumentProvider, AttestedDocumentProvider},
};
use reqwest::Client;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{header, method, path},
};

#[tokio::test]
async fn ecs_documents_fetch_via_session_token_and_cache_for_reuse() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("PUT"))
		.and(path("/latest/api/token"))
		.and(header("X-aliyun-ecs-metadata-token-ttl-seconds", "21600"))
		.respond_with(ResponseTemplate::new(200).set_body_string("session-tok"))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/latest/dynamic/instance-identity/pkcs7"))
		.and(header("X-aliyun-ecs-metadata-token", "session-tok"))
		.respond_with(ResponseTemplate::new(200).set_body_string("PKCS7-DOC"))
		.expect(1)
		.mount(&server)
		.await;

	let provider =
		AlibabaCloudEcsAttestedDocumentProvider::with_base_url(Client::new(), server.uri());

	assert_eq!(provider.attested_document().await?, "PKCS7-DOC");

	// The document is valid for an hour; a second read is a cache hit.
	assert_eq!(provider.attested_document().await?, "PKCS7-DOC");

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn ecs_documents_retry_once_with_a_fresh_session_token_on_401() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("PUT"))
		.and(path("/latest/api/token"))
		.respond_with(ResponseTemplate::new(200).set_body_string("expired-tok"))
		.up_to_n_times(1)
		.mount(&server)
		.await;
	Mock::given(method("PUT"))
		.and(path("/latest/api/token"))
		.respond_with(ResponseTemplate::new(200).set_body_string("fresh-tok"))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/latest/dynamic/instance-identity/pkcs7"))
		.and(header("X-aliyun-ecs-metadata-token", "expired-tok"))
		.respond_with(ResponseTemplate::new(401))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/latest/dynamic/instance-identity/pkcs7"))
		.and(header("X-aliyun-ecs-metadata-token", "fresh-tok"))
		.respond_with(ResponseTemplate::new(200).set_body_string("PKCS7-DOC"))
		.expect(1)
		.mount(&server)
		.await;

	let provider =
		AlibabaCloudEcsAttestedDocumentProvider::with_base_url(Client::new(), server.uri());

	assert_eq!(provider.attested_document().await?, "PKCS7-DOC");

	server.verify().await;
	Ok(())
}
