//! Callback traits for upload progress reporting
//!
//! Progress is purely observational; nothing reported here travels on the
//! wire.

use std::time::Duration;
use tracing::{info, warn};

use crate::error::StepError;
use crate::integrity::IntegrityStatus;
use crate::upload::{UploadOutcome, UploadPlan};
use crate::util::human_size;

/// Progress after one acknowledged block
#[derive(Debug, Clone)]
pub struct BlockProgress {
	pub key: String,

	/// Zero-based index of the acknowledged block
	pub block_index: u64,

	pub total_block: u64,

	/// Bytes carried by this block
	pub block_len: u64,

	/// Bytes acknowledged so far in this attempt
	pub bytes_uploaded: u64,

	/// Local file size
	pub bytes_total: u64,

	/// Time since the attempt started
	pub elapsed: Duration,
}

impl BlockProgress {
	/// Uploaded share of the file in percent
	pub fn percent(&self) -> f64 {
		if self.bytes_total == 0 {
			100.0
		} else {
			self.bytes_uploaded as f64 / self.bytes_total as f64 * 100.0
		}
	}
}

/// Events emitted by the upload orchestrator
#[derive(Debug)]
pub enum UploadEvent<'a> {
	AttemptStarted { attempt: u32, max_attempts: u32 },
	PlanReceived(&'a UploadPlan),
	BlockAcknowledged(&'a BlockProgress),
	AttemptFailed { attempt: u32, max_attempts: u32, error: &'a StepError, will_retry: bool },
	Finished(&'a UploadOutcome),
}

/// Callback for upload events
pub trait UploadCallback: Send + Sync {
	fn on_event(&self, event: UploadEvent<'_>);
}

/// Default callback that does nothing
pub struct NoCallback;

impl UploadCallback for NoCallback {
	fn on_event(&self, _event: UploadEvent<'_>) {}
}

/// Reports progress through `tracing`
pub struct LogCallback;

impl UploadCallback for LogCallback {
	fn on_event(&self, event: UploadEvent<'_>) {
		match event {
			UploadEvent::AttemptStarted { attempt, max_attempts } if attempt > 1 => {
				info!("Starting attempt {}/{}", attempt, max_attempts);
			}
			UploadEvent::AttemptStarted { .. } => {}
			UploadEvent::PlanReceived(plan) => {
				info!(
					"Upload plan for {}: {} blocks of {}",
					plan.key,
					plan.total_block,
					human_size(plan.block_size)
				);
			}
			UploadEvent::BlockAcknowledged(p) => {
				info!(
					"block {}/{} uploaded successfully ({:.1}%)",
					p.block_index + 1,
					p.total_block,
					p.percent()
				);
			}
			UploadEvent::AttemptFailed { attempt, max_attempts, error, .. } => {
				warn!("Try {}/{} failed: {}", attempt, max_attempts, error);
			}
			UploadEvent::Finished(outcome) => {
				info!("Upload completed:");
				info!("file size: {}", human_size(outcome.size));
				info!("time taken: {:.2} seconds", outcome.elapsed.as_secs_f64());
				info!("average speed: {:.2} MB/s", outcome.average_speed_mbps());
				match &outcome.integrity {
					IntegrityStatus::Verified { digest } => {
						info!("MD5 verification successful ({}), file uploaded correctly", digest)
					}
					IntegrityStatus::Mismatch { local, remote } => warn!(
						"MD5 verification failed (local {}, server {}), file might be corrupted",
						local, remote
					),
					IntegrityStatus::NotReported => info!("Server did not report an MD5 digest"),
				}
			}
		}
	}
}


// vim: ts=4
