//! Protocol error types
//!
//! Errors raised while framing, parsing or interpreting STEP messages.
//! I/O failures are carried through so the reader can tell a connection
//! reset apart from a malformed frame.

use std::fmt;
use std::io;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error from the underlying stream
	Io(io::Error),
	/// JSON serialization error while encoding a message
	Json(String),
	/// Declared frame length exceeds the configured ceiling
	FrameTooLarge { len: usize, max: usize },
	/// JSON header segment is not a valid JSON object
	MalformedHeader(String),
	/// A required field is absent from a message
	MissingField(&'static str),
	/// A field is present but has the wrong type or value
	InvalidField { field: &'static str, message: String },
	/// Server-issued upload plan cannot describe the local file
	InvalidPlan(String),
}

impl ProtocolError {
	/// True when the underlying I/O error is a connection reset
	pub fn is_connection_reset(&self) -> bool {
		matches!(self, ProtocolError::Io(e) if e.kind() == io::ErrorKind::ConnectionReset)
	}
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::Json(msg) => write!(f, "JSON encode error: {}", msg),
			ProtocolError::FrameTooLarge { len, max } => {
				write!(f, "Frame of {} bytes exceeds the {} byte limit", len, max)
			}
			ProtocolError::MalformedHeader(msg) => write!(f, "Malformed JSON header: {}", msg),
			ProtocolError::MissingField(field) => write!(f, "Missing field '{}'", field),
			ProtocolError::InvalidField { field, message } => {
				write!(f, "Invalid field '{}': {}", field, message)
			}
			ProtocolError::InvalidPlan(msg) => write!(f, "Invalid upload plan: {}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ProtocolError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::Io(e)
	}
}

impl From<serde_json::Error> for ProtocolError {
	fn from(e: serde_json::Error) -> Self {
		ProtocolError::Json(e.to_string())
	}
}


// vim: ts=4
