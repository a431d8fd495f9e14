//! Connection reader
//!
//! Wraps [`decode_stream`] with a bounded retry on connection resets.
//! A clean end of stream is reported once as `None` and never retried.

use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use super::codec::{decode_stream, Frame};
use super::constants::DEFAULT_MAX_FRAME_SIZE;
use super::error::ProtocolError;

/// Retry policy for reading one response frame
#[derive(Debug, Clone)]
pub struct ReadPolicy {
	/// Total read attempts, including the first
	pub max_attempts: u32,
	/// Pause between attempts after a reset
	pub backoff: Duration,
	/// Hard ceiling on a decoded frame
	pub max_frame_size: usize,
}

impl Default for ReadPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			backoff: Duration::from_secs(2),
			max_frame_size: DEFAULT_MAX_FRAME_SIZE,
		}
	}
}

/// Read one frame, retrying after connection resets
///
/// The final reset is returned to the caller rather than swallowed.
pub async fn read_frame<R>(reader: &mut R, policy: &ReadPolicy) -> Result<Option<Frame>, ProtocolError>
where
	R: AsyncRead + Unpin,
{
	let max_attempts = policy.max_attempts.max(1);
	let mut attempt = 1;
	loop {
		match decode_stream(reader, policy.max_frame_size).await {
			Err(e) if e.is_connection_reset() && attempt < max_attempts => {
				warn!(
					"Connection reset while reading, retrying in {:?} (try {}/{})",
					policy.backoff, attempt, max_attempts
				);
				tokio::time::sleep(policy.backoff).await;
				attempt += 1;
			}
			Ok(Some(frame)) => {
				debug!(
					"Received {} frame ({} payload bytes)",
					frame.message.operation().map(|op| op.as_str()).unwrap_or("unknown"),
					frame.payload.len()
				);
				return Ok(Some(frame));
			}
			other => return other,
		}
	}
}


// vim: ts=4
