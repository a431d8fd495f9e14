use std::path::Path;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Render a byte count with binary units and two decimals ("1.5 KB")
pub fn human_size(bytes: u64) -> String {
	if bytes == 0 {
		return "0B".to_string();
	}
	let mut unit = 0;
	let mut value = bytes as f64;
	while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
		value /= 1024.0;
		unit += 1;
	}
	let rounded = (value * 100.0).round() / 100.0;
	format!("{} {}", rounded, SIZE_UNITS[unit])
}

/// Destination key of a local file: its base name
pub fn file_key(path: &Path) -> Option<String> {
	path.file_name().and_then(|n| n.to_str()).map(|s| s.to_string())
}

/// A key is acceptable when it names a single file, not a path
pub fn is_valid_key(key: &str) -> bool {
	!key.is_empty()
		&& key != "."
		&& key != ".."
		&& !key.contains('/')
		&& !key.contains('\\')
		&& !key.contains('\0')
}


// vim: ts=4
