//! Bearer tokens issued at login
//!
//! A token is opaque to the wire but self-verifiable: the Base64 text
//! decodes to `username.timestamp.nonce.signature`, where the signature is
//! `MD5(username.timestamp.nonce || secret)`. The signing scheme sits behind
//! [`TokenStrategy`] so framing and upload code never depend on it.

pub mod cache;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::integrity::md5_hex;

/// Shared secret of the reference deployment
pub const DEFAULT_TOKEN_SECRET: &str = "kjh20)*(1";

/// Claims recovered from a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
	pub username: String,
	/// Issue time as embedded by the issuer; inspectable, never enforced
	pub timestamp: String,
	pub nonce: String,
}

/// Token verification failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
	/// Not Base64, not UTF-8, or not exactly four dot-separated parts.
	/// Usually a protocol or version mismatch with the issuer.
	Malformed(String),
	/// Well-formed token whose signature does not match
	SignatureMismatch,
}

impl fmt::Display for TokenError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TokenError::Malformed(msg) => write!(f, "Malformed token: {}", msg),
			TokenError::SignatureMismatch => {
				write!(f, "Token signature mismatch: server issued a token this client cannot trust")
			}
		}
	}
}

impl std::error::Error for TokenError {}

/// Pluggable token scheme
pub trait TokenStrategy: Send + Sync {
	/// Issue a fresh token for `username`
	fn issue(&self, username: &str) -> String;

	/// Check a token's embedded signature and return its claims
	fn verify(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

/// Shared-secret MD5 signing
#[derive(Clone)]
pub struct Md5TokenStrategy {
	secret: String,
}

impl Md5TokenStrategy {
	pub fn new(secret: impl Into<String>) -> Self {
		Self { secret: secret.into() }
	}

	fn sign(&self, user_str: &str) -> String {
		md5_hex(format!("{}{}", user_str, self.secret).as_bytes())
	}

	/// Issue a token with explicit timestamp and nonce
	pub fn issue_with(&self, username: &str, timestamp: &str, nonce: &str) -> String {
		let user_str = format!("{}.{}.{}", username, timestamp, nonce);
		let signature = self.sign(&user_str);
		STANDARD.encode(format!("{}.{}", user_str, signature))
	}
}

impl Default for Md5TokenStrategy {
	fn default() -> Self {
		Self::new(DEFAULT_TOKEN_SECRET)
	}
}

impl fmt::Debug for Md5TokenStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Md5TokenStrategy").finish_non_exhaustive()
	}
}

impl TokenStrategy for Md5TokenStrategy {
	fn issue(&self, username: &str) -> String {
		let timestamp = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or_default();
		let nonce = uuid::Uuid::new_v4().simple().to_string();
		self.issue_with(username, &timestamp.to_string(), &nonce)
	}

	fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
		let raw = STANDARD
			.decode(token.trim())
			.map_err(|e| TokenError::Malformed(format!("not Base64: {}", e)))?;
		let decoded =
			String::from_utf8(raw).map_err(|_| TokenError::Malformed("not UTF-8".to_string()))?;

		let parts: Vec<&str> = decoded.split('.').collect();
		if parts.len() != 4 {
			return Err(TokenError::Malformed(format!(
				"expected 4 dot-separated parts, got {}",
				parts.len()
			)));
		}

		let user_str = parts[..3].join(".");
		if !self.sign(&user_str).eq_ignore_ascii_case(parts[3]) {
			return Err(TokenError::SignatureMismatch);
		}

		Ok(TokenClaims {
			username: parts[0].to_string(),
			timestamp: parts[1].to_string(),
			nonce: parts[2].to_string(),
		})
	}
}


// vim: ts=4
