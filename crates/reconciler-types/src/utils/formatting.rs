//! String formatting utilities for log output.

/// Shortens an identifier for display.
///
/// Keeps the first 8 characters and appends ".." when the identifier is longer.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((cut, _)) => format!("{}..", &id[..cut]),
		None => id.to_string(),
	}
}
