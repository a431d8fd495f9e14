//! STEP client: connections, login and the verification query
//!
//! Every logical exchange owns one connection for its whole lifetime. The
//! connection is shut down on every exit path before the next exchange
//! opens a new one.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::auth::cache::load_token;
use crate::auth::{Md5TokenStrategy, TokenClaims, TokenStrategy};
use crate::config::ClientConfig;
use crate::error::StepError;
use crate::integrity::md5_hex;
use crate::protocol::constants::*;
use crate::protocol::{read_frame, write_frame, Frame, Message, Operation, ProtocolError};

/// Byte stream a STEP exchange runs over
pub trait StepStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> StepStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedStream = Box<dyn StepStream>;

/// Opens one fresh stream per exchange
#[async_trait]
pub trait Connector: Send + Sync {
	async fn connect(&self) -> Result<BoxedStream, StepError>;

	/// Human-readable peer address, for messages
	fn address(&self) -> String;
}

/// Plain TCP connector with a connect timeout
#[derive(Debug, Clone)]
pub struct TcpConnector {
	address: String,
	timeout: Duration,
}

impl TcpConnector {
	pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
		Self { address: address.into(), timeout }
	}

	pub fn from_config(config: &ClientConfig) -> Self {
		Self::new(config.address(), config.connect_timeout())
	}
}

#[async_trait]
impl Connector for TcpConnector {
	async fn connect(&self) -> Result<BoxedStream, StepError> {
		match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
			Err(_) => Err(StepError::ConnectTimeout { address: self.address.clone() }),
			Ok(Err(source)) => Err(StepError::ConnectFailed { address: self.address.clone(), source }),
			Ok(Ok(stream)) => {
				let _ = stream.set_nodelay(true);
				debug!("Connected to {}", self.address);
				Ok(Box::new(stream))
			}
		}
	}

	fn address(&self) -> String {
		self.address.clone()
	}
}

/// Client handle threading configuration through every operation
pub struct StepClient {
	config: ClientConfig,
	connector: Arc<dyn Connector>,
	tokens: Arc<dyn TokenStrategy>,
}

impl StepClient {
	/// TCP client using the configured server and token secret
	pub fn new(config: ClientConfig) -> Self {
		let connector = Arc::new(TcpConnector::from_config(&config));
		Self::with_connector(config, connector)
	}

	pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
		let tokens = Arc::new(Md5TokenStrategy::new(config.token_secret.clone()));
		Self { config, connector, tokens }
	}

	/// Replace the token verification scheme
	pub fn with_token_strategy(mut self, tokens: Arc<dyn TokenStrategy>) -> Self {
		self.tokens = tokens;
		self
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	pub fn address(&self) -> String {
		self.connector.address()
	}

	pub async fn connect(&self) -> Result<BoxedStream, StepError> {
		self.connector.connect().await
	}

	/// Send one request on `stream` and read one response
	///
	/// `Ok(None)` means the server closed the connection without answering.
	pub async fn exchange<S>(
		&self,
		stream: &mut S,
		request: &Message,
		payload: Option<&[u8]>,
	) -> Result<Option<Frame>, StepError>
	where
		S: AsyncRead + AsyncWrite + Unpin,
	{
		let operation = request
			.operation()
			.ok_or(StepError::Protocol(ProtocolError::MissingField(FIELD_OPERATION)))?;
		write_frame(stream, request, payload, self.config.max_frame_size)
			.await
			.map_err(|e| StepError::during(operation, e))?;
		read_frame(stream, &self.config.read_policy())
			.await
			.map_err(|e| StepError::during(operation, e))
	}

	/// One request/response over a dedicated connection
	pub async fn request(
		&self,
		request: &Message,
		payload: Option<&[u8]>,
	) -> Result<Option<Frame>, StepError> {
		let mut stream = self.connect().await?;
		let result = self.exchange(&mut stream, request, payload).await;
		let _ = stream.shutdown().await;
		result
	}

	/// Exchange credentials for a token
	///
	/// The password travels as its MD5 hex digest. Login is never retried.
	pub async fn login(&self, username: &str, password: &str) -> Result<String, StepError> {
		let request = Message::request(Operation::Login)
			.with(FIELD_USERNAME, username)
			.with(FIELD_PASSWORD, md5_hex(password.as_bytes()));

		let response = match self.request(&request, None).await? {
			Some(frame) => frame.message,
			None => {
				return Err(StepError::AuthFailed {
					status: None,
					message: "unknown error".to_string(),
				})
			}
		};

		if !response.is_ok() {
			return Err(StepError::AuthFailed {
				status: response.status(),
				message: response.status_msg().to_string(),
			});
		}

		let token = response.require_str(FIELD_TOKEN)?.to_string();
		info!("Logged in as {}", username);
		Ok(token)
	}

	/// Decode a token and recompute its signature before trusting it
	pub fn verify_token(&self, token: &str) -> Result<TokenClaims, StepError> {
		Ok(self.tokens.verify(token)?)
	}

	/// Token saved by an earlier login, if it still verifies
	///
	/// A missing or empty cache file is `Ok(None)`. A cached token that fails
	/// verification is an error rather than a silent fallback to no token.
	pub async fn cached_token(&self) -> Result<Option<String>, StepError> {
		let path = &self.config.token_file;
		let token = match load_token(path).await {
			Ok(Some(token)) => token,
			Ok(None) => return Ok(None),
			Err(source) => {
				return Err(StepError::LocalFile { path: path.display().to_string(), source })
			}
		};
		let claims = self.verify_token(&token)?;
		debug!("Using cached token of {}", claims.username);
		Ok(Some(token))
	}

	/// Ask the server for the authoritative digest of a stored object
	///
	/// Non-200 responses, a closed connection, or a response without `md5`
	/// all mean "no verification available".
	pub async fn query_md5(&self, token: &str, key: &str) -> Result<Option<String>, StepError> {
		let request =
			Message::request(Operation::Get).with(FIELD_TOKEN, token).with(FIELD_KEY, key);

		let response = match self.request(&request, None).await? {
			Some(frame) => frame.message,
			None => return Ok(None),
		};
		if !response.is_ok() {
			debug!(
				"GET {} returned status {:?}: {}",
				key,
				response.status(),
				response.status_msg()
			);
			return Ok(None);
		}
		Ok(response.get_str(FIELD_MD5).map(|s| s.to_string()))
	}
}


// vim: ts=4
