//! Error types for STEP client and server operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::auth::TokenError;
use crate::protocol::{Operation, ProtocolError};

/// Broad failure class, used for retry decisions and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Connection refused, reset, timed out or closed early
	Transport,
	/// Malformed frame, header or token
	Protocol,
	/// Non-200 status from the remote side
	Application,
	/// Local and remote digests disagree
	Integrity,
	/// Local file, configuration or policy problem
	Local,
}

/// Main error type for STEP operations
#[derive(Debug)]
pub enum StepError {
	/// TCP connect failed
	ConnectFailed { address: String, source: io::Error },

	/// TCP connect did not complete in time
	ConnectTimeout { address: String },

	/// Remote closed the connection before a complete response arrived
	Disconnected { operation: Operation },

	/// I/O error while exchanging frames
	Transport { operation: Operation, source: io::Error },

	/// Malformed frame or message
	Protocol(ProtocolError),

	/// Token failed client-side verification
	Token(TokenError),

	/// Login refused by the server
	AuthFailed { status: Option<i64>, message: String },

	/// Non-200 response to a request
	Rejected { operation: Operation, status: Option<i64>, message: String },

	/// Non-200 response to one block of an upload
	BlockRejected {
		key: String,
		block_index: u64,
		total_block: u64,
		status: Option<i64>,
		message: String,
	},

	/// Stored object digest differs from the local file
	IntegrityMismatch { local: String, remote: String },

	/// Local file exceeds the advisory size ceiling and override is off
	SizeLimitExceeded { size: u64, limit: u64 },

	/// Local file cannot be read
	LocalFile { path: String, source: io::Error },

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Other I/O error
	Io(io::Error),

	/// Whole-attempt retries used up
	RetriesExhausted { attempts: u32, source: Box<StepError> },
}

impl StepError {
	/// Classify this error according to the failure taxonomy
	pub fn kind(&self) -> ErrorKind {
		match self {
			StepError::ConnectFailed { .. }
			| StepError::ConnectTimeout { .. }
			| StepError::Disconnected { .. }
			| StepError::Transport { .. }
			| StepError::Io(_) => ErrorKind::Transport,
			StepError::Protocol(_) | StepError::Token(_) => ErrorKind::Protocol,
			StepError::AuthFailed { .. }
			| StepError::Rejected { .. }
			| StepError::BlockRejected { .. } => ErrorKind::Application,
			StepError::IntegrityMismatch { .. } => ErrorKind::Integrity,
			StepError::SizeLimitExceeded { .. }
			| StepError::LocalFile { .. }
			| StepError::InvalidConfig { .. } => ErrorKind::Local,
			StepError::RetriesExhausted { source, .. } => source.kind(),
		}
	}

	/// Whether the whole-attempt upload loop may start over after this error
	///
	/// Login failures are application errors but are never retried; the
	/// upload loop does not see them.
	pub fn is_retryable(&self) -> bool {
		match self {
			StepError::AuthFailed { .. } | StepError::RetriesExhausted { .. } => false,
			_ => matches!(
				self.kind(),
				ErrorKind::Transport | ErrorKind::Application | ErrorKind::Integrity
			),
		}
	}

	/// Attach the operation to a protocol error raised during an exchange
	pub fn during(operation: Operation, e: ProtocolError) -> Self {
		match e {
			ProtocolError::Io(source) => StepError::Transport { operation, source },
			other => StepError::Protocol(other),
		}
	}
}

fn status_text(status: &Option<i64>) -> String {
	match status {
		Some(code) => code.to_string(),
		None => "none".to_string(),
	}
}

impl fmt::Display for StepError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StepError::ConnectFailed { address, source } => {
				write!(
					f,
					"Cannot connect to {}: {}. Make sure the server is running and the address is correct",
					address, source
				)
			}
			StepError::ConnectTimeout { address } => {
				write!(f, "Timed out connecting to {}", address)
			}
			StepError::Disconnected { operation } => {
				write!(f, "Server closed the connection without a valid {} response", operation)
			}
			StepError::Transport { operation, source } => {
				write!(f, "Transport error during {}: {}", operation, source)
			}
			StepError::Protocol(e) => write!(f, "Protocol error: {}", e),
			StepError::Token(e) => write!(f, "{}", e),
			StepError::AuthFailed { status, message } => {
				write!(f, "Login failure (status {}): {}", status_text(status), message)
			}
			StepError::Rejected { operation, status, message } => {
				write!(
					f,
					"{} rejected: status code {}, error message: {}",
					operation,
					status_text(status),
					message
				)
			}
			StepError::BlockRejected { key, block_index, total_block, status, message } => {
				write!(
					f,
					"block {}/{} of {} upload failed: status code {}, error message: {}",
					block_index + 1,
					total_block,
					key,
					status_text(status),
					message
				)
			}
			StepError::IntegrityMismatch { local, remote } => {
				write!(f, "MD5 verification failed: local {}, server {}", local, remote)
			}
			StepError::SizeLimitExceeded { size, limit } => {
				write!(
					f,
					"File size ({:.2}MB) exceeds the recommended limit of {:.2}MB",
					*size as f64 / 1024.0 / 1024.0,
					*limit as f64 / 1024.0 / 1024.0
				)
			}
			StepError::LocalFile { path, source } => {
				write!(f, "Cannot read local file {}: {}", path, source)
			}
			StepError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			StepError::Io(e) => write!(f, "I/O error: {}", e),
			StepError::RetriesExhausted { attempts, source } => {
				write!(f, "Upload failed after {} attempts, last error: {}", attempts, source)
			}
		}
	}
}

impl Error for StepError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			StepError::ConnectFailed { source, .. }
			| StepError::Transport { source, .. }
			| StepError::LocalFile { source, .. } => Some(source),
			StepError::Protocol(e) => Some(e),
			StepError::Token(e) => Some(e),
			StepError::Io(e) => Some(e),
			StepError::RetriesExhausted { source, .. } => Some(source.as_ref()),
			_ => None,
		}
	}
}

impl From<io::Error> for StepError {
	fn from(e: io::Error) -> Self {
		StepError::Io(e)
	}
}

impl From<ProtocolError> for StepError {
	fn from(e: ProtocolError) -> Self {
		match e {
			ProtocolError::Io(io) => StepError::Io(io),
			other => StepError::Protocol(other),
		}
	}
}

impl From<TokenError> for StepError {
	fn from(e: TokenError) -> Self {
		StepError::Token(e)
	}
}


// vim: ts=4
