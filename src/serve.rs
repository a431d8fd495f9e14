//! Reference STEP server
//!
//! Accepts one connection at a time; each connection may carry any number
//! of request frames. Objects are stored as plain files in a single
//! storage directory, named by their key.
//!
//! Upload state lives in memory: a `SAVE` registers a pending upload with
//! its plan, every accepted `UPLOAD` marks one block as received, and the
//! block that completes the set is answered with the stored file's MD5.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::auth::{Md5TokenStrategy, TokenStrategy, DEFAULT_TOKEN_SECRET};
use crate::error::StepError;
use crate::integrity::{file_md5, md5_hex};
use crate::protocol::constants::*;
use crate::protocol::{decode_stream, write_frame, Direction, Frame, Message, Operation};
use crate::util::is_valid_key;

/// Default listen address of `step serve`
pub const DEFAULT_LISTEN: &str = "0.0.0.0:1379";

/// Server settings
#[derive(Debug, Clone)]
pub struct ServeOptions {
	pub listen: String,

	/// Directory objects are stored in
	pub storage_dir: PathBuf,

	/// Block size handed out in upload plans
	pub block_size: u64,

	pub max_frame_size: usize,

	pub token_secret: String,
}

impl Default for ServeOptions {
	fn default() -> Self {
		ServeOptions {
			listen: DEFAULT_LISTEN.to_string(),
			storage_dir: PathBuf::from("."),
			block_size: MAX_PACKET_SIZE as u64,
			max_frame_size: DEFAULT_MAX_FRAME_SIZE,
			token_secret: DEFAULT_TOKEN_SECRET.to_string(),
		}
	}
}

#[derive(Debug)]
struct PendingUpload {
	size: u64,
	total_block: u64,
	block_size: u64,
	received: BTreeSet<u64>,
}

impl PendingUpload {
	fn block_len(&self, block_index: u64) -> u64 {
		self.size.saturating_sub(block_index * self.block_size).min(self.block_size)
	}
}

/// Refusal turned into a non-200 response
#[derive(Debug)]
struct Rejection {
	status: i64,
	message: String,
}

impl Rejection {
	fn new(status: i64, message: impl Into<String>) -> Self {
		Self { status, message: message.into() }
	}
}

impl From<io::Error> for Rejection {
	fn from(e: io::Error) -> Self {
		Rejection::new(STATUS_INTERNAL_ERROR, format!("storage error: {}", e))
	}
}

type Handled = Result<Message, Rejection>;

pub struct StepServer {
	options: ServeOptions,
	tokens: Arc<dyn TokenStrategy>,
	pending: BTreeMap<String, PendingUpload>,
}

impl StepServer {
	pub fn new(options: ServeOptions) -> Result<Self, StepError> {
		if options.block_size == 0 {
			return Err(StepError::InvalidConfig { message: "block size must be non-zero".into() });
		}
		if options.block_size > options.max_frame_size as u64 {
			return Err(StepError::InvalidConfig {
				message: format!(
					"block size {} exceeds the {} byte frame limit",
					options.block_size, options.max_frame_size
				),
			});
		}
		let tokens = Arc::new(Md5TokenStrategy::new(options.token_secret.clone()));
		Ok(Self { options, tokens, pending: BTreeMap::new() })
	}

	/// Replace the token scheme used to issue and check tokens
	pub fn with_token_strategy(mut self, tokens: Arc<dyn TokenStrategy>) -> Self {
		self.tokens = tokens;
		self
	}

	/// Accept and serve connections one at a time, forever
	pub async fn run(&mut self, listener: TcpListener) -> Result<(), StepError> {
		loop {
			let (stream, peer) = listener.accept().await?;
			debug!("Connection from {}", peer);
			if let Err(e) = self.handle_connection(stream).await {
				warn!("Connection from {} ended with error: {}", peer, e);
			}
		}
	}

	async fn handle_connection(&mut self, mut stream: TcpStream) -> Result<(), StepError> {
		let max_frame_size = self.options.max_frame_size;
		while let Some(frame) = decode_stream(&mut stream, max_frame_size).await? {
			let response = self.dispatch(frame).await;
			write_frame(&mut stream, &response, None, max_frame_size).await?;
		}
		Ok(())
	}

	/// Answer one request frame
	pub async fn dispatch(&mut self, frame: Frame) -> Message {
		let Frame { message, payload } = frame;
		let operation = match message.operation() {
			Some(op) => op,
			None => {
				let raw = message.get_str(FIELD_OPERATION).unwrap_or("").to_string();
				warn!("Unknown operation {:?}", raw);
				return Message::default()
					.with(FIELD_OPERATION, raw)
					.with(FIELD_DIRECTION, Direction::Response.as_str())
					.with(FIELD_STATUS, STATUS_BAD_REQUEST)
					.with(FIELD_STATUS_MSG, "Unknown operation");
			}
		};

		let handled = match operation {
			Operation::Login => self.handle_login(&message),
			Operation::Save => self.handle_save(&message).await,
			Operation::Upload => self.handle_upload(&message, &payload).await,
			Operation::Get => self.handle_get(&message).await,
		};

		match handled {
			Ok(response) => response,
			Err(rejection) => {
				debug!("{} rejected with {}: {}", operation, rejection.status, rejection.message);
				Message::response(operation, rejection.status, &rejection.message)
			}
		}
	}

	fn authorize(&self, message: &Message) -> Result<String, Rejection> {
		let token = message
			.get_str(FIELD_TOKEN)
			.ok_or_else(|| Rejection::new(STATUS_UNAUTHORIZED, "Missing token"))?;
		self.tokens
			.verify(token)
			.map(|claims| claims.username)
			.map_err(|e| Rejection::new(STATUS_UNAUTHORIZED, format!("Invalid token: {}", e)))
	}

	fn object_path(&self, key: &str) -> PathBuf {
		self.options.storage_dir.join(key)
	}

	fn handle_login(&self, message: &Message) -> Handled {
		let username = required_str(message, FIELD_USERNAME)?;
		let password = required_str(message, FIELD_PASSWORD)?;

		if !password.eq_ignore_ascii_case(&md5_hex(username.as_bytes())) {
			info!("Login refused for {}", username);
			return Err(Rejection::new(STATUS_UNAUTHORIZED, "Incorrect password"));
		}

		info!("Login accepted for {}", username);
		Ok(Message::response(Operation::Login, STATUS_OK, "Login successful")
			.with(FIELD_TOKEN, self.tokens.issue(username)))
	}

	async fn handle_save(&mut self, message: &Message) -> Handled {
		let user = self.authorize(message)?;
		let key = required_str(message, FIELD_KEY)?.to_string();
		if !is_valid_key(&key) {
			return Err(Rejection::new(STATUS_BAD_REQUEST, format!("Invalid key {:?}", key)));
		}
		let size = message
			.get_u64(FIELD_SIZE)
			.ok_or_else(|| Rejection::new(STATUS_BAD_REQUEST, "Missing or invalid size"))?;

		let block_size = self.options.block_size;
		let total_block = size / block_size + u64::from(size % block_size != 0);

		preallocate(&self.object_path(&key), size).await?;
		if total_block > 0 {
			let upload = PendingUpload { size, total_block, block_size, received: BTreeSet::new() };
			self.pending.insert(key.clone(), upload);
		} else {
			self.pending.remove(&key);
		}

		info!("{} started upload of {} ({} bytes, {} blocks)", user, key, size, total_block);
		Ok(Message::response(Operation::Save, STATUS_OK, "Upload plan created")
			.with(FIELD_KEY, key)
			.with(FIELD_SIZE, size)
			.with(FIELD_TOTAL_BLOCK, total_block)
			.with(FIELD_BLOCK_SIZE, block_size))
	}

	async fn handle_upload(&mut self, message: &Message, payload: &[u8]) -> Handled {
		self.authorize(message)?;
		let key = required_str(message, FIELD_KEY)?.to_string();
		let block_index = message
			.get_u64(FIELD_BLOCK_INDEX)
			.ok_or_else(|| Rejection::new(STATUS_BAD_REQUEST, "Missing or invalid block_index"))?;

		let (offset, total_block) = {
			let upload = self
				.pending
				.get(&key)
				.ok_or_else(|| Rejection::new(STATUS_NOT_FOUND, format!("No upload pending for {}", key)))?;
			if block_index >= upload.total_block {
				return Err(Rejection::new(
					STATUS_BAD_REQUEST,
					format!("block_index {} out of range, total_block {}", block_index, upload.total_block),
				));
			}
			let expected = upload.block_len(block_index);
			if payload.len() as u64 != expected {
				return Err(Rejection::new(
					STATUS_BAD_REQUEST,
					format!("block {} carries {} bytes, expected {}", block_index, payload.len(), expected),
				));
			}
			(block_index * upload.block_size, upload.total_block)
		};

		let path = self.object_path(&key);
		write_at(&path, offset, payload).await?;

		let complete = match self.pending.get_mut(&key) {
			Some(upload) => {
				upload.received.insert(block_index);
				upload.received.len() as u64 == upload.total_block
			}
			None => false,
		};

		let response = Message::response(Operation::Upload, STATUS_OK, "Block received")
			.with(FIELD_KEY, key.as_str())
			.with(FIELD_BLOCK_INDEX, block_index)
			.with(FIELD_TOTAL_BLOCK, total_block);
		if !complete {
			return Ok(response);
		}

		self.pending.remove(&key);
		let digest = file_md5(&path).await?;
		info!("Upload of {} complete, MD5 {}", key, digest);
		Ok(response.with(FIELD_MD5, digest))
	}

	async fn handle_get(&self, message: &Message) -> Handled {
		self.authorize(message)?;
		let key = required_str(message, FIELD_KEY)?;
		let not_found = || Rejection::new(STATUS_NOT_FOUND, format!("No object {}", key));
		if !is_valid_key(key) || self.pending.contains_key(key) {
			return Err(not_found());
		}

		let path = self.object_path(key);
		let metadata = match tokio::fs::metadata(&path).await {
			Ok(m) if m.is_file() => m,
			Ok(_) => return Err(not_found()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
			Err(e) => return Err(e.into()),
		};
		let digest = file_md5(&path).await?;

		Ok(Message::response(Operation::Get, STATUS_OK, "ok")
			.with(FIELD_KEY, key)
			.with(FIELD_SIZE, metadata.len())
			.with(FIELD_MD5, digest))
	}
}

fn required_str<'m>(message: &'m Message, field: &'static str) -> Result<&'m str, Rejection> {
	message
		.get_str(field)
		.ok_or_else(|| Rejection::new(STATUS_BAD_REQUEST, format!("Missing field: {}", field)))
}

async fn preallocate(path: &Path, size: u64) -> io::Result<()> {
	let file = OpenOptions::new().create(true).write(true).truncate(true).open(path).await?;
	file.set_len(size).await
}

async fn write_at(path: &Path, offset: u64, data: &[u8]) -> io::Result<()> {
	let mut file = OpenOptions::new().write(true).open(path).await?;
	file.seek(SeekFrom::Start(offset)).await?;
	file.write_all(data).await?;
	file.flush().await
}

/// Bind `options.listen` and serve until the process is stopped
pub async fn serve(options: ServeOptions) -> Result<(), StepError> {
	tokio::fs::create_dir_all(&options.storage_dir).await.map_err(|source| {
		StepError::LocalFile { path: options.storage_dir.display().to_string(), source }
	})?;
	let listener = TcpListener::bind(&options.listen).await.map_err(|source| {
		StepError::ConnectFailed { address: options.listen.clone(), source }
	})?;
	info!(
		"Serving {} on {} (block size {})",
		options.storage_dir.display(),
		listener.local_addr()?,
		options.block_size
	);
	StepServer::new(options)?.run(listener).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn server(dir: &TempDir, block_size: u64) -> StepServer {
		StepServer::new(ServeOptions {
			storage_dir: dir.path().to_path_buf(),
			block_size,
			..ServeOptions::default()
		})
		.unwrap()
	}

	fn token(server: &StepServer) -> String {
		server.tokens.issue("2254411")
	}

	fn frame(message: Message, payload: &[u8]) -> Frame {
		Frame::new(message, payload.to_vec())
	}

	fn save(token: &str, key: &str, size: u64) -> Frame {
		frame(
			Message::request(Operation::Save)
				.with(FIELD_TOKEN, token)
				.with(FIELD_KEY, key)
				.with(FIELD_SIZE, size),
			&[],
		)
	}

	fn upload(token: &str, key: &str, block_index: u64, data: &[u8]) -> Frame {
		frame(
			Message::request(Operation::Upload)
				.with(FIELD_TOKEN, token)
				.with(FIELD_KEY, key)
				.with(FIELD_BLOCK_INDEX, block_index),
			data,
		)
	}

	#[tokio::test]
	async fn test_login_requires_username_digest() {
		let dir = TempDir::new().unwrap();
		let mut s = server(&dir, 4);

		let ok = Message::request(Operation::Login)
			.with(FIELD_USERNAME, "2254411")
			.with(FIELD_PASSWORD, md5_hex(b"2254411"));
		let response = s.dispatch(frame(ok, &[])).await;
		assert!(response.is_ok());
		let token = response.get_str(FIELD_TOKEN).unwrap();
		assert_eq!(s.tokens.verify(token).unwrap().username, "2254411");

		let bad = Message::request(Operation::Login)
			.with(FIELD_USERNAME, "2254411")
			.with(FIELD_PASSWORD, md5_hex(b"guess"));
		let response = s.dispatch(frame(bad, &[])).await;
		assert_eq!(response.status(), Some(STATUS_UNAUTHORIZED));
		assert!(!response.contains(FIELD_TOKEN));
	}

	#[tokio::test]
	async fn test_save_rejects_bad_token_and_path_keys() {
		let dir = TempDir::new().unwrap();
		let mut s = server(&dir, 4);

		let response = s.dispatch(save("bm90LWEtdG9rZW4=", "a.bin", 10)).await;
		assert_eq!(response.status(), Some(STATUS_UNAUTHORIZED));

		let t = token(&s);
		let response = s.dispatch(save(&t, "../escape.bin", 10)).await;
		assert_eq!(response.status(), Some(STATUS_BAD_REQUEST));
		assert!(!dir.path().join("../escape.bin").exists());
	}

	#[tokio::test]
	async fn test_save_plan_and_preallocation() {
		let dir = TempDir::new().unwrap();
		let mut s = server(&dir, 4);
		let t = token(&s);

		let response = s.dispatch(save(&t, "ten.bin", 10)).await;
		assert!(response.is_ok());
		assert_eq!(response.get_u64(FIELD_TOTAL_BLOCK), Some(3));
		assert_eq!(response.get_u64(FIELD_BLOCK_SIZE), Some(4));
		assert_eq!(response.get_str(FIELD_KEY), Some("ten.bin"));
		assert_eq!(std::fs::metadata(dir.path().join("ten.bin")).unwrap().len(), 10);
	}

	#[tokio::test]
	async fn test_upload_validation() {
		let dir = TempDir::new().unwrap();
		let mut s = server(&dir, 4);
		let t = token(&s);

		let response = s.dispatch(upload(&t, "ten.bin", 0, b"0123")).await;
		assert_eq!(response.status(), Some(STATUS_NOT_FOUND));

		s.dispatch(save(&t, "ten.bin", 10)).await;
		let response = s.dispatch(upload(&t, "ten.bin", 3, b"")).await;
		assert_eq!(response.status(), Some(STATUS_BAD_REQUEST));
		let response = s.dispatch(upload(&t, "ten.bin", 2, b"89ab")).await;
		assert_eq!(response.status(), Some(STATUS_BAD_REQUEST));
		let response = s.dispatch(upload(&t, "ten.bin", 0, b"0123")).await;
		assert!(response.is_ok());
		assert!(!response.contains(FIELD_MD5));
	}

	#[tokio::test]
	async fn test_completing_block_reports_md5() {
		let dir = TempDir::new().unwrap();
		let mut s = server(&dir, 4);
		let t = token(&s);

		s.dispatch(save(&t, "ten.bin", 10)).await;
		for (i, chunk) in [&b"0123"[..], &b"4567"[..]].iter().enumerate() {
			let response = s.dispatch(upload(&t, "ten.bin", i as u64, chunk)).await;
			assert!(response.is_ok());
			assert!(!response.contains(FIELD_MD5));
		}
		let response = s.dispatch(upload(&t, "ten.bin", 2, b"89")).await;
		assert_eq!(response.get_str(FIELD_MD5), Some(md5_hex(b"0123456789").as_str()));
		assert_eq!(std::fs::read(dir.path().join("ten.bin")).unwrap(), b"0123456789");
	}

	#[tokio::test]
	async fn test_get_pending_and_completed() {
		let dir = TempDir::new().unwrap();
		let mut s = server(&dir, 4);
		let t = token(&s);
		let get = |key: &str| {
			frame(Message::request(Operation::Get).with(FIELD_TOKEN, t.as_str()).with(FIELD_KEY, key), &[])
		};

		assert_eq!(s.dispatch(get("none.bin")).await.status(), Some(STATUS_NOT_FOUND));

		s.dispatch(save(&t, "two.bin", 2)).await;
		assert_eq!(s.dispatch(get("two.bin")).await.status(), Some(STATUS_NOT_FOUND));

		s.dispatch(upload(&t, "two.bin", 0, b"hi")).await;
		let response = s.dispatch(get("two.bin")).await;
		assert!(response.is_ok());
		assert_eq!(response.get_u64(FIELD_SIZE), Some(2));
		assert_eq!(response.get_str(FIELD_MD5), Some(md5_hex(b"hi").as_str()));
	}

	#[tokio::test]
	async fn test_unknown_operation_is_bad_request() {
		let dir = TempDir::new().unwrap();
		let mut s = server(&dir, 4);
		let msg = Message::default().with(FIELD_OPERATION, "DELETE");
		let response = s.dispatch(frame(msg, &[])).await;
		assert_eq!(response.status(), Some(STATUS_BAD_REQUEST));
		assert_eq!(response.get_str(FIELD_OPERATION), Some("DELETE"));
	}

	#[test]
	fn test_block_size_must_fit_frame() {
		let options = ServeOptions { block_size: 0, ..ServeOptions::default() };
		assert!(StepServer::new(options).is_err());
		let options =
			ServeOptions { block_size: 64, max_frame_size: 32, ..ServeOptions::default() };
		assert!(StepServer::new(options).is_err());
	}
}

// vim: ts=4
