//! Authentication Tests
//!
//! Login, token verification and the token cache against the reference
//! server, including reuse of a cached token.

use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

use step::auth::cache::{load_token, save_token};
use step::auth::{Md5TokenStrategy, TokenError, TokenStrategy};
use step::serve::{ServeOptions, StepServer};
use step::{ClientConfig, StepClient, StepError};

async fn start_server(dir: &TempDir, secret: &str) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let mut server = StepServer::new(ServeOptions {
		storage_dir: dir.path().to_path_buf(),
		token_secret: secret.to_string(),
		..ServeOptions::default()
	})
	.unwrap();
	tokio::spawn(async move {
		let _ = server.run(listener).await;
	});
	addr
}

fn config_for(addr: SocketAddr) -> ClientConfig {
	ClientConfig { server: addr.ip().to_string(), port: addr.port(), ..ClientConfig::default() }
}

#[tokio::test]
async fn test_login_and_verify_token() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, step::auth::DEFAULT_TOKEN_SECRET).await;
	let client = StepClient::new(config_for(addr));

	let token = client.login("2254411", "2254411").await.unwrap();
	let claims = client.verify_token(&token).unwrap();
	assert_eq!(claims.username, "2254411");
	assert!(claims.timestamp.parse::<u64>().is_ok());
	assert!(!claims.nonce.is_empty());
}

#[tokio::test]
async fn test_two_logins_issue_distinct_tokens() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, step::auth::DEFAULT_TOKEN_SECRET).await;
	let client = StepClient::new(config_for(addr));

	let first = client.login("alice", "alice").await.unwrap();
	let second = client.login("alice", "alice").await.unwrap();
	assert_ne!(first, second);
}

#[tokio::test]
async fn test_wrong_password_is_refused() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, step::auth::DEFAULT_TOKEN_SECRET).await;
	let client = StepClient::new(config_for(addr));

	match client.login("2254411", "letmein").await {
		Err(StepError::AuthFailed { status, message }) => {
			assert_eq!(status, Some(401));
			assert!(!message.is_empty());
		}
		other => panic!("expected AuthFailed, got {:?}", other),
	}
}

/// A server signing with another secret issues tokens the client rejects
#[tokio::test]
async fn test_foreign_secret_is_signature_mismatch() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, "some-other-secret").await;
	let client = StepClient::new(config_for(addr));

	let token = client.login("alice", "alice").await.unwrap();
	let err = client.verify_token(&token).unwrap_err();
	assert!(matches!(err, StepError::Token(TokenError::SignatureMismatch)), "{:?}", err);
}

/// A custom token scheme plugs into the client
#[tokio::test]
async fn test_custom_token_strategy() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, "shared").await;
	let client = StepClient::new(config_for(addr))
		.with_token_strategy(Arc::new(Md5TokenStrategy::new("shared")));

	let token = client.login("bob", "bob").await.unwrap();
	assert_eq!(client.verify_token(&token).unwrap().username, "bob");
	assert!(Md5TokenStrategy::default().verify(&token).is_err());
}

#[tokio::test]
async fn test_query_unknown_key_has_no_digest() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, step::auth::DEFAULT_TOKEN_SECRET).await;
	let client = StepClient::new(config_for(addr));

	let token = client.login("alice", "alice").await.unwrap();
	assert_eq!(client.query_md5(&token, "never-uploaded.bin").await.unwrap(), None);
	assert_eq!(client.query_md5("bm90LWEtdG9rZW4=", "never-uploaded.bin").await.unwrap(), None);
}

#[tokio::test]
async fn test_token_cache_replaces_previous_token() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("state").join("token.txt");

	assert_eq!(load_token(&path).await.unwrap(), None);
	save_token(&path, "first").await.unwrap();
	save_token(&path, "second").await.unwrap();
	assert_eq!(load_token(&path).await.unwrap().as_deref(), Some("second"));
}

/// `get` without credentials reuses the token of the last login
#[tokio::test]
async fn test_cached_token_is_verified_before_use() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, step::auth::DEFAULT_TOKEN_SECRET).await;
	let token_file = dir.path().join("cache").join("token.txt");
	let client =
		StepClient::new(ClientConfig { token_file: token_file.clone(), ..config_for(addr) });

	assert_eq!(client.cached_token().await.unwrap(), None);

	let token = client.login("2254411", "2254411").await.unwrap();
	save_token(&token_file, &token).await.unwrap();
	assert_eq!(client.cached_token().await.unwrap().as_deref(), Some(token.as_str()));

	let foreign = Md5TokenStrategy::new("some-other-secret").issue("2254411");
	save_token(&token_file, &foreign).await.unwrap();
	let err = client.cached_token().await.unwrap_err();
	assert!(matches!(err, StepError::Token(TokenError::SignatureMismatch)), "{:?}", err);
}

// vim: ts=4
