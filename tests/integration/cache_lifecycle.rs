//! Integration coverage for the token cache lifecycle: prefetch windows,
//! stale blocking, failure policies, and refresh-gate timeouts.

// std
use std::{env, sync::Arc, time::Duration};
// crates.io
use m2m_credential_cache::{
	AuthConfig, AuthnMethod, ClientConfig, CredentialProvider, Error, ManualTimeSource, Result,
	StaleValuePolicy,
};
use reqwest::Client;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

fn token_body(access_token: &str) -> String {
	format!(r#"{{"access_token":"{access_token}","token_type":"Bearer","expires_in":3600}}"#)
}

fn config_for(server: &MockServer, secret_env: &'static str) -> ClientConfig {
	// SAFETY: test-local variable name; no other thread reads it.
	unsafe {
		env::set_var(secret_env, "sekrit");
	}

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

async fn mount_sequenced_tokens(server: &MockServer) {
	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(ResponseTemplate::new(200).set_body_string(token_body("T1")))
		.up_to_n_times(1)
		.mount(server)
		.await;
	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(ResponseTemplate::new(200).set_body_string(token_body("T2")))
		.mount(server)
		.await;
}

#[tokio::test]
async fn prefetch_window_reads_serve_the_old_token_while_refreshing() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_sequenced_tokens(&server).await;

	let time = Arc::new(ManualTimeSource::starting_at(chrono::Utc::now()));
	let provider = CredentialProvider::builder(config_for(&server, "LIFECYCLE_PREFETCH_SECRET"))
		.http_client(Client::new())
		.time_source(time.clone())
		.jitter(None)
		.build()?;

	assert_eq!(provider.get_bearer_token().await?, "T1");

	// Just inside the prefetch window: expires_at − expires_in/3 + 1 s.
	time.advance_secs(2_401);

	// The one-caller-blocks strategy refreshes on this caller's stack but
	// still returns the value that was fresh when the read began.
	assert_eq!(provider.get_bearer_token().await?, "T1");
	assert_eq!(server.received_requests().await.expect("requests").len(), 2);

	// The refreshed token serves without further endpoint traffic.
	assert_eq!(provider.get_bearer_token().await?, "T2");
	assert_eq!(server.received_requests().await.expect("requests").len(), 2);

	Ok(())
}

#[tokio::test]
async fn stale_reads_block_until_a_new_token_arrives() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_sequenced_tokens(&server).await;

	let time = Arc::new(ManualTimeSource::starting_at(chrono::Utc::now()));
	let provider = CredentialProvider::builder(config_for(&server, "LIFECYCLE_STALE_SECRET"))
		.http_client(Client::new())
		.time_source(time.clone())
		.jitter(None)
		.build()?;

	assert_eq!(provider.get_bearer_token().await?, "T1");

	// Past stale_at: expires_at − expires_in/5 = 2880 s after issuance.
	time.advance_secs(2_881);

	assert_eq!(provider.get_bearer_token().await?, "T2");

	Ok(())
}

#[tokio::test]
async fn allow_policy_serves_the_prior_token_through_refresh_failures() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(ResponseTemplate::new(200).set_body_string(token_body("T1")))
		.up_to_n_times(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(ResponseTemplate::new(500).set_body_string("boom"))
		.expect(2)
		.mount(&server)
		.await;

	let time = Arc::new(ManualTimeSource::starting_at(chrono::Utc::now()));
	let mut config = config_for(&server, "LIFECYCLE_ALLOW_SECRET");

	config.stale_value_policy = StaleValuePolicy::Allow;

	let provider = CredentialProvider::builder(config)
		.http_client(Client::new())
		.time_source(time.clone())
		.jitter(None)
		.build()?;

	assert_eq!(provider.get_bearer_token().await?, "T1");

	// Prefetch-window failure is swallowed; the fresh value serves.
	time.advance_secs(2_401);

	assert_eq!(provider.get_bearer_token().await?, "T1");

	// Stale-path failure falls back to the prior value under ALLOW.
	time.advance_secs(480);

	assert_eq!(provider.get_bearer_token().await?, "T1");

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn strict_policy_surfaces_stale_refresh_failures_as_cache_errors() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(ResponseTemplate::new(200).set_body_string(token_body("T1")))
		.up_to_n_times(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(ResponseTemplate::new(500).set_body_string("boom"))
		.mount(&server)
		.await;

	let time = Arc::new(ManualTimeSource::starting_at(chrono::Utc::now()));
	let provider = CredentialProvider::builder(config_for(&server, "LIFECYCLE_STRICT_SECRET"))
		.http_client(Client::new())
		.time_source(time.clone())
		.jitter(None)
		.build()?;

	assert_eq!(provider.get_bearer_token().await?, "T1");

	time.advance_secs(2_881);

	assert!(matches!(provider.get_credential().await, Err(Error::Cache(_))));

	Ok(())
}

#[tokio::test]
async fn waiters_time_out_with_a_concurrent_operation_error() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/token"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(token_body("T1"))
				.set_delay(Duration::from_secs(6)),
		)
		.mount(&server)
		.await;

	let provider = CredentialProvider::builder(config_for(&server, "LIFECYCLE_TIMEOUT_SECRET"))
		.http_client(Client::new())
		.jitter(None)
		.build()?;
	let slow = {
		let provider = provider.clone();

		tokio::spawn(async move { provider.get_bearer_token().await })
	};

	// Let the first caller take the refresh gate before contending.
	tokio::time::sleep(Duration::from_millis(250)).await;

	let err = provider.get_credential().await.unwrap_err();

	assert!(matches!(err, Error::ConcurrentOperation(_)));
	assert_eq!(slow.await.expect("join").expect("slow caller"), "T1");

	Ok(())
}
