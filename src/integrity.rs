//! End-to-end integrity: MD5 digests of buffers and files

use md5::{Digest, Md5};
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::protocol::constants::MAX_PACKET_SIZE;

/// Lowercase hex MD5 of a buffer
pub fn md5_hex(data: &[u8]) -> String {
	hex::encode(Md5::digest(data))
}

/// Lowercase hex MD5 of a whole file, read in packet-sized pieces
pub async fn file_md5(path: &Path) -> io::Result<String> {
	let mut file = tokio::fs::File::open(path).await?;
	let mut hasher = Md5::new();
	let mut buf = vec![0u8; MAX_PACKET_SIZE];
	loop {
		let n = file.read(&mut buf).await?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(hex::encode(hasher.finalize()))
}

/// Result of comparing the local digest with the one the server reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
	/// Server digest equals the local one
	Verified { digest: String },
	/// Digests differ; the stored object may be corrupted
	Mismatch { local: String, remote: String },
	/// Server did not report a digest
	NotReported,
}

impl IntegrityStatus {
	pub fn compare(local: &str, remote: &str) -> Self {
		if local.eq_ignore_ascii_case(remote) {
			IntegrityStatus::Verified { digest: local.to_string() }
		} else {
			IntegrityStatus::Mismatch { local: local.to_string(), remote: remote.to_string() }
		}
	}

	pub fn is_mismatch(&self) -> bool {
		matches!(self, IntegrityStatus::Mismatch { .. })
	}
}


// vim: ts=4
