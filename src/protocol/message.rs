//! STEP message model
//!
//! A message is a JSON object that always carries `operation`, `direction`
//! and `type`, plus operation-specific fields. Requests and responses are
//! paired by connection only; there is no message identifier.

use serde_json::{Map, Value};
use std::fmt;

use super::constants::*;
use super::error::ProtocolError;

/// Operation named by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	Login,
	Save,
	Upload,
	Get,
}

impl Operation {
	pub fn as_str(&self) -> &'static str {
		match self {
			Operation::Login => "LOGIN",
			Operation::Save => "SAVE",
			Operation::Upload => "UPLOAD",
			Operation::Get => "GET",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"LOGIN" => Some(Operation::Login),
			"SAVE" => Some(Operation::Save),
			"UPLOAD" => Some(Operation::Upload),
			"GET" => Some(Operation::Get),
			_ => None,
		}
	}

	/// Message type an operation travels under
	pub fn message_type(&self) -> MessageType {
		match self {
			Operation::Login => MessageType::Auth,
			_ => MessageType::File,
		}
	}
}

impl fmt::Display for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Request,
	Response,
}

impl Direction {
	pub fn as_str(&self) -> &'static str {
		match self {
			Direction::Request => "REQUEST",
			Direction::Response => "RESPONSE",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"REQUEST" => Some(Direction::Request),
			"RESPONSE" => Some(Direction::Response),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
	Auth,
	File,
}

impl MessageType {
	pub fn as_str(&self) -> &'static str {
		match self {
			MessageType::Auth => "AUTH",
			MessageType::File => "FILE",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"AUTH" => Some(MessageType::Auth),
			"FILE" => Some(MessageType::File),
			_ => None,
		}
	}
}

/// A STEP message: string keys mapped to JSON values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
	fields: Map<String, Value>,
}

impl Message {
	/// Build a request for `operation`, typed according to the operation
	pub fn request(operation: Operation) -> Self {
		Self::with_header(operation, Direction::Request)
	}

	/// Build a response for `operation` carrying `status` and `status_msg`
	pub fn response(operation: Operation, status: i64, status_msg: &str) -> Self {
		Self::with_header(operation, Direction::Response)
			.with(FIELD_STATUS, status)
			.with(FIELD_STATUS_MSG, status_msg)
	}

	fn with_header(operation: Operation, direction: Direction) -> Self {
		Message::default()
			.with(FIELD_OPERATION, operation.as_str())
			.with(FIELD_DIRECTION, direction.as_str())
			.with(FIELD_TYPE, operation.message_type().as_str())
	}

	/// Parse a message from a JSON value, which must be an object
	pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
		match value {
			Value::Object(fields) => Ok(Self { fields }),
			other => Err(ProtocolError::MalformedHeader(format!(
				"expected a JSON object, got {}",
				json_kind(&other)
			))),
		}
	}

	/// Builder-style field setter
	pub fn with<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
		self.set(key, value);
		self
	}

	pub fn set<V: Into<Value>>(&mut self, key: &str, value: V) {
		self.fields.insert(key.to_string(), value.into());
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.fields.get(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.fields.contains_key(key)
	}

	pub fn operation(&self) -> Option<Operation> {
		self.get_str(FIELD_OPERATION).and_then(Operation::parse)
	}

	pub fn direction(&self) -> Option<Direction> {
		self.get_str(FIELD_DIRECTION).and_then(Direction::parse)
	}

	pub fn message_type(&self) -> Option<MessageType> {
		self.get_str(FIELD_TYPE).and_then(MessageType::parse)
	}

	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.fields.get(key).and_then(Value::as_str)
	}

	pub fn get_u64(&self, key: &str) -> Option<u64> {
		self.fields.get(key).and_then(Value::as_u64)
	}

	/// Response status, if present and integral
	pub fn status(&self) -> Option<i64> {
		self.fields.get(FIELD_STATUS).and_then(Value::as_i64)
	}

	pub fn is_ok(&self) -> bool {
		self.status() == Some(STATUS_OK)
	}

	/// Human-readable status message, empty when absent
	pub fn status_msg(&self) -> &str {
		self.get_str(FIELD_STATUS_MSG).unwrap_or("")
	}

	/// Required string field
	pub fn require_str(&self, key: &'static str) -> Result<&str, ProtocolError> {
		match self.fields.get(key) {
			None => Err(ProtocolError::MissingField(key)),
			Some(Value::String(s)) => Ok(s),
			Some(other) => Err(ProtocolError::InvalidField {
				field: key,
				message: format!("expected a string, got {}", json_kind(other)),
			}),
		}
	}

	/// Required non-negative integer field
	pub fn require_u64(&self, key: &'static str) -> Result<u64, ProtocolError> {
		match self.fields.get(key) {
			None => Err(ProtocolError::MissingField(key)),
			Some(v) => v.as_u64().ok_or_else(|| ProtocolError::InvalidField {
				field: key,
				message: format!("expected a non-negative integer, got {}", v),
			}),
		}
	}

	pub fn to_json_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
		Ok(serde_json::to_vec(&self.fields)?)
	}
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_request_header_fields() {
		let msg = Message::request(Operation::Login).with(FIELD_USERNAME, "alice");
		assert_eq!(msg.get_str(FIELD_OPERATION), Some("LOGIN"));
		assert_eq!(msg.get_str(FIELD_DIRECTION), Some("REQUEST"));
		assert_eq!(msg.get_str(FIELD_TYPE), Some("AUTH"));
		assert_eq!(msg.operation(), Some(Operation::Login));

		let save = Message::request(Operation::Save);
		assert_eq!(save.message_type(), Some(MessageType::File));
	}

	#[test]
	fn test_response_status() {
		let msg = Message::response(Operation::Upload, 500, "disk full");
		assert_eq!(msg.status(), Some(500));
		assert!(!msg.is_ok());
		assert_eq!(msg.status_msg(), "disk full");
		assert_eq!(msg.direction(), Some(Direction::Response));
	}

	#[test]
	fn test_non_object_rejected() {
		let err = Message::from_value(json!([1, 2, 3])).unwrap_err();
		assert!(matches!(err, ProtocolError::MalformedHeader(_)));
	}

	#[test]
	fn test_require_fields() {
		let msg = Message::from_value(json!({"size": "ten", "key": "a.txt"})).unwrap();
		assert_eq!(msg.require_str(FIELD_KEY).unwrap(), "a.txt");
		assert!(matches!(
			msg.require_u64(FIELD_SIZE),
			Err(ProtocolError::InvalidField { field: "size", .. })
		));
		assert!(matches!(
			msg.require_u64(FIELD_TOTAL_BLOCK),
			Err(ProtocolError::MissingField("total_block"))
		));
	}

	#[test]
	fn test_unknown_operation() {
		assert_eq!(Operation::parse("DELETE"), None);
		assert_eq!(Operation::parse("login"), None);
	}
}

// vim: ts=4
