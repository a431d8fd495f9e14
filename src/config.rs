//! Client configuration
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`ClientConfig::default()`)
//! 2. Config file (`--config PATH`, else ~/.config/step/config.toml)
//! 3. Environment variables (`STEP_*` prefix)
//! 4. CLI flags (highest priority, applied by the binary)
//!
//! Every operation receives the configuration explicitly; there is no
//! process-wide "current server".

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::DEFAULT_TOKEN_SECRET;
use crate::error::StepError;
use crate::protocol::constants::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT, MAX_PACKET_SIZE};
use crate::protocol::ReadPolicy;

/// Advisory upload size ceiling (10 MiB)
pub const DEFAULT_SIZE_WARNING_LIMIT: u64 = 10 * 1024 * 1024;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
	// ========================================================================
	// SERVER
	// ========================================================================
	/// Server host name or IP address
	pub server: String,

	/// Server TCP port
	pub port: u16,

	/// TCP connect timeout in milliseconds
	pub connect_timeout_ms: u64,

	// ========================================================================
	// FRAMING
	// ========================================================================
	/// Advisory packet size, used for buffer sizing
	pub max_packet_size: usize,

	/// Hard ceiling on a decoded frame; larger length fields are rejected
	pub max_frame_size: usize,

	// ========================================================================
	// RETRIES
	// ========================================================================
	/// Retry of a single response read after connection resets
	pub read: RetryConfig,

	/// Whole-attempt retry of negotiation, transfer and finish
	pub upload: RetryConfig,

	// ========================================================================
	// UPLOAD POLICY
	// ========================================================================
	/// Files above this size need `allow_oversize`
	pub size_warning_limit: u64,

	/// Proceed with files above `size_warning_limit`
	pub allow_oversize: bool,

	/// Open a new connection for every block (false: one per attempt)
	pub per_block_connection: bool,

	/// Treat a digest mismatch as a failed attempt
	pub retry_on_integrity_mismatch: bool,

	// ========================================================================
	// TOKENS
	// ========================================================================
	/// Plaintext token cache
	pub token_file: PathBuf,

	/// Shared secret used to verify token signatures
	pub token_secret: String,

	// ========================================================================
	// OUTPUT & LOGGING
	// ========================================================================
	/// Log level (trace, debug, info, warn, error)
	pub log_level: String,
}

/// Bounded retry with fixed backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
	/// Total attempts including the first
	pub max_attempts: u32,

	/// Delay between attempts in milliseconds
	pub backoff_ms: u64,
}

impl RetryConfig {
	pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
		Self { max_attempts, backoff_ms }
	}

	pub fn backoff(&self) -> Duration {
		Duration::from_millis(self.backoff_ms)
	}
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self::new(3, 2000)
	}
}

impl Default for ClientConfig {
	fn default() -> Self {
		ClientConfig {
			server: "127.0.0.1".to_string(),
			port: DEFAULT_PORT,
			connect_timeout_ms: 10_000,

			max_packet_size: MAX_PACKET_SIZE,
			max_frame_size: DEFAULT_MAX_FRAME_SIZE,

			read: RetryConfig::new(3, 2000),
			upload: RetryConfig::new(3, 5000),

			size_warning_limit: DEFAULT_SIZE_WARNING_LIMIT,
			allow_oversize: false,
			per_block_connection: true,
			retry_on_integrity_mismatch: false,

			token_file: PathBuf::from("token.txt"),
			token_secret: DEFAULT_TOKEN_SECRET.to_string(),

			log_level: "info".to_string(),
		}
	}
}

impl ClientConfig {
	/// `host:port` of the configured server
	pub fn address(&self) -> String {
		if self.server.contains(':') && !self.server.starts_with('[') {
			format!("[{}]:{}", self.server, self.port)
		} else {
			format!("{}:{}", self.server, self.port)
		}
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}

	/// Reader policy derived from `read` and `max_frame_size`
	pub fn read_policy(&self) -> ReadPolicy {
		ReadPolicy {
			max_attempts: self.read.max_attempts,
			backoff: self.read.backoff(),
			max_frame_size: self.max_frame_size,
		}
	}

	pub fn validate(&self) -> Result<(), StepError> {
		let fail = |message: &str| Err(StepError::InvalidConfig { message: message.to_string() });
		if self.server.trim().is_empty() {
			return fail("server address is empty");
		}
		if self.port == 0 {
			return fail("port must be non-zero");
		}
		if self.max_frame_size == 0 {
			return fail("maxFrameSize must be non-zero");
		}
		if self.read.max_attempts == 0 || self.upload.max_attempts == 0 {
			return fail("retry maxAttempts must be at least 1");
		}
		Ok(())
	}

	/// Parse a config file; `.json`/`.json5` as JSON5, anything else as TOML
	pub fn from_file(path: &Path) -> Result<Self, StepError> {
		let contents = std::fs::read_to_string(path).map_err(|e| StepError::InvalidConfig {
			message: format!("cannot read {}: {}", path.display(), e),
		})?;
		let is_json = matches!(
			path.extension().and_then(|e| e.to_str()),
			Some("json") | Some("json5")
		);
		let parsed = if is_json {
			json5::from_str(&contents).map_err(|e| e.to_string())
		} else {
			toml::from_str(&contents).map_err(|e| e.to_string())
		};
		parsed.map_err(|e| StepError::InvalidConfig {
			message: format!("cannot parse {}: {}", path.display(), e),
		})
	}

	/// Apply `STEP_*` overrides from `lookup`
	pub fn apply_env<F>(&mut self, lookup: F)
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(server) = lookup("STEP_SERVER") {
			self.server = server;
		}
		if let Some(port) = lookup("STEP_PORT").and_then(|p| p.parse().ok()) {
			self.port = port;
		}
		if let Some(secret) = lookup("STEP_TOKEN_SECRET") {
			self.token_secret = secret;
		}
		if let Some(level) = lookup("STEP_LOG") {
			self.log_level = level;
		}
	}
}

fn default_config_path() -> Option<PathBuf> {
	std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config/step/config.toml"))
}

/// Load configuration: defaults, then a config file, then the environment
///
/// An explicitly named file must exist; the default location is optional.
pub fn load(explicit: Option<&Path>) -> Result<ClientConfig, StepError> {
	let mut config = match explicit {
		Some(path) => ClientConfig::from_file(path)?,
		None => match default_config_path() {
			Some(path) if path.exists() => ClientConfig::from_file(&path)?,
			_ => ClientConfig::default(),
		},
	};
	config.apply_env(|key| std::env::var(key).ok());
	Ok(config)
}


// vim: ts=4
