//! Logging setup
//!
//! All output goes through `tracing`. The `RUST_LOG` environment variable,
//! when set, takes precedence over the configured level:
//!
//! ```bash
//! RUST_LOG=debug step upload --id 2254411 report.pdf
//! RUST_LOG=step::protocol=debug,step::upload=info step upload ...
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber, writing to stderr
///
/// `default_level` applies when `RUST_LOG` is unset or invalid.
pub fn init_tracing(default_level: &str) {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.with_target(false)
		.try_init();
}

// vim: ts=4
