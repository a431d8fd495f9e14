//! Plaintext token cache

use std::io;
use std::path::Path;
use tracing::info;

/// Write the token to `path`, replacing any previous one
pub async fn save_token(path: &Path, token: &str) -> io::Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			tokio::fs::create_dir_all(parent).await?;
		}
	}
	tokio::fs::write(path, token).await?;
	info!("Token has been saved to {}", path.display());
	Ok(())
}

/// Read a cached token; `None` when the file is missing or empty
pub async fn load_token(path: &Path) -> io::Result<Option<String>> {
	match tokio::fs::read_to_string(path).await {
		Ok(s) => {
			let token = s.trim();
			Ok(if token.is_empty() { None } else { Some(token.to_string()) })
		}
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e),
	}
}


// vim: ts=4
