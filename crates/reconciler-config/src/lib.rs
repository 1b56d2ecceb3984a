//! Configuration module for the member-order reconciler.
//!
//! Configuration is loaded from TOML. String values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`, which keeps credentials such as
//! the listing API token out of the file.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["storage.toml", "listings.toml"]` to include other files
//! - Each top-level section must be unique across all files

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound for `reconciler.max_concurrent_groups`.
const MAX_CONCURRENT_GROUPS_LIMIT: usize = 1024;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the full error embeds the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the reconciler.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Batch settings.
	pub reconciler: ReconcilerConfig,
	/// Document store holding member order submissions.
	pub storage: StorageConfig,
	/// Listing service holding plans and orders.
	pub listings: ListingsConfig,
}

/// Batch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcilerConfig {
	/// Identifier of this reconciler instance, used in logs.
	pub id: String,
	/// Maximum number of plan groups processed at the same time.
	#[serde(default = "default_max_concurrent_groups")]
	pub max_concurrent_groups: usize,
	/// When set, the service runs a batch every `interval_seconds` instead of once.
	#[serde(default)]
	pub interval_seconds: Option<u64>,
}

fn default_max_concurrent_groups() -> usize {
	16
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the listing backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListingsConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of listing implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of VAR_NAME, or with `default` for
/// `${VAR_NAME:-default}` when the variable is unset. Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match (std::env::var(var_name.as_str()), default_value) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)));
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path.display())))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.reconciler.id.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Reconciler ID cannot be empty".into(),
			));
		}
		if self.reconciler.max_concurrent_groups == 0 {
			return Err(ConfigError::Validation(
				"reconciler.max_concurrent_groups must be greater than 0".into(),
			));
		}
		if self.reconciler.max_concurrent_groups > MAX_CONCURRENT_GROUPS_LIMIT {
			return Err(ConfigError::Validation(format!(
				"reconciler.max_concurrent_groups cannot exceed {}",
				MAX_CONCURRENT_GROUPS_LIMIT
			)));
		}
		if self.reconciler.interval_seconds == Some(0) {
			return Err(ConfigError::Validation(
				"reconciler.interval_seconds must be greater than 0".into(),
			));
		}

		validate_backend_section("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_backend_section(
			"listings",
			&self.listings.primary,
			&self.listings.implementations,
		)?;

		Ok(())
	}
}

/// Checks that a backend section names a configured primary implementation.
fn validate_backend_section(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses and validates configuration from a TOML string.
///
/// Environment variables are resolved before parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
