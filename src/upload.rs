//! Upload orchestrator
//!
//! One attempt runs three steps:
//! 1. Negotiate: `SAVE` with key and size; the response is the upload plan.
//! 2. Transfer: one `UPLOAD` per block, strictly in index order. Block
//!    `n + 1` is not sent before block `n` is acknowledged.
//! 3. Finish: when the last acknowledgement carries `md5`, the whole local
//!    file is hashed and compared.
//!
//! Attempts are wrapped in a whole-attempt retry loop. A restart re-sends
//! every block; blocks already accepted by the server are not rolled back.

use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::callbacks::{BlockProgress, NoCallback, UploadCallback, UploadEvent};
use crate::client::{BoxedStream, StepClient};
use crate::error::StepError;
use crate::integrity::{file_md5, IntegrityStatus};
use crate::protocol::constants::*;
use crate::protocol::{Message, Operation, ProtocolError};
use crate::util::{file_key, human_size};

/// Server-issued chunking parameters for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
	pub key: String,
	pub size: u64,
	pub total_block: u64,
	pub block_size: u64,
	pub md5: Option<String>,
}

impl UploadPlan {
	/// Parse a `SAVE` response. `key` falls back to the requested key.
	pub fn from_message(msg: &Message, requested_key: &str) -> Result<Self, ProtocolError> {
		Ok(UploadPlan {
			key: msg.get_str(FIELD_KEY).unwrap_or(requested_key).to_string(),
			size: msg.get_u64(FIELD_SIZE).unwrap_or(0),
			total_block: msg.require_u64(FIELD_TOTAL_BLOCK)?,
			block_size: msg.require_u64(FIELD_BLOCK_SIZE)?,
			md5: msg.get_str(FIELD_MD5).map(|s| s.to_string()),
		})
	}

	/// Reject plans that cannot carry `file_size` bytes within `max_block`
	///
	/// The plan stays authoritative; this only refuses plans that would
	/// truncate the file or exceed the frame ceiling.
	pub fn validate_for(&self, file_size: u64, max_block: u64) -> Result<(), ProtocolError> {
		if self.total_block > 0 && self.block_size == 0 {
			return Err(ProtocolError::InvalidPlan(format!(
				"{} blocks of zero bytes",
				self.total_block
			)));
		}
		if self.block_size > max_block {
			return Err(ProtocolError::InvalidPlan(format!(
				"block size {} exceeds the {} byte frame limit",
				self.block_size, max_block
			)));
		}
		let capacity = self.total_block.saturating_mul(self.block_size);
		if capacity < file_size {
			return Err(ProtocolError::InvalidPlan(format!(
				"plan covers {} of {} bytes",
				capacity, file_size
			)));
		}
		Ok(())
	}

	pub fn block_offset(&self, block_index: u64) -> u64 {
		block_index * self.block_size
	}

	/// Bytes block `block_index` carries for a file of `file_size` bytes
	pub fn block_len(&self, block_index: u64, file_size: u64) -> u64 {
		let offset = self.block_offset(block_index);
		file_size.saturating_sub(offset).min(self.block_size)
	}
}

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
	pub key: String,
	pub size: u64,
	pub total_block: u64,
	pub block_size: u64,

	/// Attempt that succeeded, starting at 1
	pub attempts: u32,

	/// Duration of the successful attempt
	pub elapsed: Duration,

	/// Audit signal only; a mismatch does not fail the upload by default
	pub integrity: IntegrityStatus,
}

impl UploadOutcome {
	pub fn average_speed_mbps(&self) -> f64 {
		let secs = self.elapsed.as_secs_f64();
		if secs <= 0.0 {
			0.0
		} else {
			self.size as f64 / secs / 1024.0 / 1024.0
		}
	}
}

/// Drives negotiation, transfer and finish with whole-attempt retry
pub struct Uploader<'a> {
	client: &'a StepClient,
	callback: Arc<dyn UploadCallback>,
}

impl<'a> Uploader<'a> {
	pub fn new(client: &'a StepClient) -> Self {
		Self { client, callback: Arc::new(NoCallback) }
	}

	pub fn with_callback(mut self, callback: Arc<dyn UploadCallback>) -> Self {
		self.callback = callback;
		self
	}

	/// Upload `path` under its base name
	pub async fn upload(&self, token: &str, path: &Path) -> Result<UploadOutcome, StepError> {
		let config = self.client.config();
		let local = |source: io::Error| StepError::LocalFile { path: path.display().to_string(), source };

		let metadata = tokio::fs::metadata(path).await.map_err(local)?;
		if !metadata.is_file() {
			return Err(local(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file")));
		}
		let size = metadata.len();
		let key = file_key(path)
			.ok_or_else(|| local(io::Error::new(io::ErrorKind::InvalidInput, "no file name")))?;

		if size > config.size_warning_limit {
			if !config.allow_oversize {
				return Err(StepError::SizeLimitExceeded { size, limit: config.size_warning_limit });
			}
			warn!(
				"File size ({}) exceeds the recommended limit of {}, continuing",
				human_size(size),
				human_size(config.size_warning_limit)
			);
		}

		info!("Start uploading file: {} (Size: {})", key, human_size(size));

		let max_attempts = config.upload.max_attempts.max(1);
		let mut attempt = 1;
		loop {
			self.callback.on_event(UploadEvent::AttemptStarted { attempt, max_attempts });
			let started = Instant::now();

			let failure = match self.attempt(token, path, &key, size, started).await {
				Ok(mut outcome) => {
					outcome.attempts = attempt;
					outcome.elapsed = started.elapsed();
					self.callback.on_event(UploadEvent::Finished(&outcome));
					return Ok(outcome);
				}
				Err(e) => e,
			};

			let will_retry = failure.is_retryable() && attempt < max_attempts;
			self.callback.on_event(UploadEvent::AttemptFailed {
				attempt,
				max_attempts,
				error: &failure,
				will_retry,
			});

			if !failure.is_retryable() {
				error!("Upload of {} failed: {}", key, failure);
				return Err(failure);
			}
			if !will_retry {
				error!("Upload of {} failed, maximum retry attempts reached", key);
				return Err(StepError::RetriesExhausted { attempts: attempt, source: Box::new(failure) });
			}

			info!("Waiting {:?} before retrying", config.upload.backoff());
			tokio::time::sleep(config.upload.backoff()).await;
			attempt += 1;
		}
	}

	async fn attempt(
		&self,
		token: &str,
		path: &Path,
		key: &str,
		size: u64,
		started: Instant,
	) -> Result<UploadOutcome, StepError> {
		let plan = self.negotiate(token, key, size).await?;
		self.callback.on_event(UploadEvent::PlanReceived(&plan));

		let last = self.transfer(token, path, size, &plan, started).await?;
		let integrity = self.finish(path, last.as_ref()).await?;

		Ok(UploadOutcome {
			key: plan.key,
			size,
			total_block: plan.total_block,
			block_size: plan.block_size,
			attempts: 0,
			elapsed: started.elapsed(),
			integrity,
		})
	}

	/// Step 1: request an upload plan
	async fn negotiate(&self, token: &str, key: &str, size: u64) -> Result<UploadPlan, StepError> {
		let request = Message::request(Operation::Save)
			.with(FIELD_TOKEN, token)
			.with(FIELD_KEY, key)
			.with(FIELD_SIZE, size);

		let response = self
			.client
			.request(&request, None)
			.await?
			.ok_or(StepError::Disconnected { operation: Operation::Save })?
			.message;

		if !response.is_ok() {
			return Err(StepError::Rejected {
				operation: Operation::Save,
				status: response.status(),
				message: response.status_msg().to_string(),
			});
		}

		let plan = UploadPlan::from_message(&response, key)?;
		let max_block = max_block_payload(token, &plan, self.client.config().max_frame_size)?;
		plan.validate_for(size, max_block)?;
		debug!("Plan for {}: {:?}", key, plan);
		Ok(plan)
	}

	/// Step 2: send every block in index order; returns the last acknowledgement
	async fn transfer(
		&self,
		token: &str,
		path: &Path,
		size: u64,
		plan: &UploadPlan,
		started: Instant,
	) -> Result<Option<Message>, StepError> {
		let mut file = File::open(path)
			.await
			.map_err(|source| StepError::LocalFile { path: path.display().to_string(), source })?;

		let mut shared: Option<BoxedStream> = if self.client.config().per_block_connection {
			None
		} else {
			Some(self.client.connect().await?)
		};

		let mut uploaded = 0u64;
		let mut last = None;
		for block_index in 0..plan.total_block {
			let data = read_block(&mut file, plan.block_offset(block_index), plan.block_size)
				.await
				.map_err(|source| StepError::LocalFile {
					path: path.display().to_string(),
					source,
				})?;

			let request = block_request(token, &plan.key, block_index);

			let response = match shared.as_mut() {
				Some(stream) => self.client.exchange(stream, &request, Some(&data[..])).await?,
				None => self.client.request(&request, Some(&data[..])).await?,
			}
			.ok_or(StepError::Disconnected { operation: Operation::Upload })?
			.message;

			if !response.is_ok() {
				warn!(
					"block {}/{} upload failed: {}",
					block_index + 1,
					plan.total_block,
					response.status_msg()
				);
				return Err(StepError::BlockRejected {
					key: plan.key.clone(),
					block_index,
					total_block: plan.total_block,
					status: response.status(),
					message: response.status_msg().to_string(),
				});
			}

			uploaded += data.len() as u64;
			let progress = BlockProgress {
				key: plan.key.clone(),
				block_index,
				total_block: plan.total_block,
				block_len: data.len() as u64,
				bytes_uploaded: uploaded,
				bytes_total: size,
				elapsed: started.elapsed(),
			};
			self.callback.on_event(UploadEvent::BlockAcknowledged(&progress));
			last = Some(response);
		}

		if let Some(mut stream) = shared {
			let _ = stream.shutdown().await;
		}
		Ok(last)
	}

	/// Step 3: compare the server digest with the local file
	async fn finish(&self, path: &Path, last: Option<&Message>) -> Result<IntegrityStatus, StepError> {
		let remote = match last.and_then(|m| m.get_str(FIELD_MD5)) {
			Some(remote) => remote.to_string(),
			None => return Ok(IntegrityStatus::NotReported),
		};

		let local = file_md5(path)
			.await
			.map_err(|source| StepError::LocalFile { path: path.display().to_string(), source })?;
		debug!("Server file MD5: {}, local file MD5: {}", remote, local);

		let status = IntegrityStatus::compare(&local, &remote);
		if let IntegrityStatus::Mismatch { local, remote } = &status {
			warn!("MD5 verification failed, file might be corrupted (local {}, server {})", local, remote);
			if self.client.config().retry_on_integrity_mismatch {
				return Err(StepError::IntegrityMismatch { local: local.clone(), remote: remote.clone() });
			}
		}
		Ok(status)
	}
}

fn block_request(token: &str, key: &str, block_index: u64) -> Message {
	Message::request(Operation::Upload)
		.with(FIELD_TOKEN, token)
		.with(FIELD_KEY, key)
		.with(FIELD_BLOCK_INDEX, block_index)
}

/// Largest block payload an `UPLOAD` frame of this plan can carry
///
/// The frame body holds the JSON header as well as the block, so the
/// header of the widest request (the last block index) is subtracted.
fn max_block_payload(
	token: &str,
	plan: &UploadPlan,
	max_frame_size: usize,
) -> Result<u64, ProtocolError> {
	let widest = block_request(token, &plan.key, plan.total_block.saturating_sub(1));
	let header_len = widest.to_json_bytes()?.len();
	Ok(max_frame_size.saturating_sub(header_len) as u64)
}

/// Read up to `block_size` bytes starting at `offset`
async fn read_block(file: &mut File, offset: u64, block_size: u64) -> io::Result<Vec<u8>> {
	file.seek(SeekFrom::Start(offset)).await?;
	let mut data = Vec::with_capacity(block_size as usize);
	(&mut *file).take(block_size).read_to_end(&mut data).await?;
	Ok(data)
}


// vim: ts=4
