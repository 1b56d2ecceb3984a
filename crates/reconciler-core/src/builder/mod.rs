//! Construction of a [`ReconcilerEngine`] from configuration.
//!
//! Backends are created through factory functions keyed by implementation
//! name, so the binary decides which implementations are available and the
//! configuration decides which one is used.

use crate::engine::ReconcilerEngine;
use reconciler_config::Config;
use reconciler_listing::{ListingError, ListingInterface, ListingService};
use reconciler_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every backend kind, keyed by implementation name.
pub struct ReconcilerFactories<SF, LF> {
	pub storage_factories: HashMap<String, SF>,
	pub listing_factories: HashMap<String, LF>,
}

/// Builds a [`ReconcilerEngine`] from a [`Config`].
pub struct ReconcilerBuilder {
	config: Config,
}

impl ReconcilerBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Creates every configured backend and wires the primary ones into an engine.
	///
	/// All configured implementations are instantiated so that an invalid table
	/// is reported even when it is not the primary one.
	pub fn build<SF, LF>(
		self,
		factories: ReconcilerFactories<SF, LF>,
	) -> Result<ReconcilerEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		LF: Fn(&toml::Value) -> Result<Box<dyn ListingInterface>, ListingError>,
	{
		let storage_backend = build_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let listing_backend = build_primary(
			"listings",
			&self.config.listings.primary,
			&self.config.listings.implementations,
			&factories.listing_factories,
		)?;

		Ok(ReconcilerEngine::new(
			self.config,
			Arc::new(StorageService::new(storage_backend)),
			Arc::new(ListingService::new(listing_backend)),
		))
	}
}

fn build_primary<T: ?Sized, E: Display, F>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	if !factories.contains_key(primary) {
		return Err(BuilderError::MissingComponent(format!(
			"No {} implementation named '{}' is available",
			component, primary
		)));
	}

	let mut built = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "Unknown implementation, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = name == primary;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				built.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	built.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' is not configured",
			component, primary
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{listing, submission};
	use reconciler_listing::ListingFactory;
	use reconciler_storage::implementations::file::FileStorage;
	use reconciler_storage::StorageFactory;
	use reconciler_types::{StorageKey, SubmissionStatus};
	use serde_json::json;
	use std::path::Path;
	use tempfile::TempDir;

	fn factories() -> ReconcilerFactories<StorageFactory, ListingFactory> {
		ReconcilerFactories {
			storage_factories: reconciler_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			listing_factories: reconciler_listing::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	fn file_config(storage_path: &Path, seed_path: &Path) -> Config {
		format!(
			r#"
[reconciler]
id = "builder-test"

[storage]
primary = "file"
[storage.implementations.file]
storage_path = '{}'

[listings]
primary = "memory"
[listings.implementations.memory]
seed_path = '{}'
"#,
			storage_path.display(),
			seed_path.display()
		)
		.parse()
		.unwrap()
	}

	#[tokio::test]
	async fn test_build_and_run_with_file_storage() {
		let temp_dir = TempDir::new().unwrap();
		let storage_path = temp_dir.path().join("storage");
		let seed_path = temp_dir.path().join("listings.json");
		std::fs::write(
			&seed_path,
			serde_json::to_string(&json!([
				listing("P1", json!({
					"orderId": "O1",
					"orderDetail": { "2024-01-01": { "memberOrders": {} } }
				})),
				listing("O1", json!({ "orderState": "picking" })),
			]))
			.unwrap(),
		)
		.unwrap();

		let submissions = StorageService::new(Box::new(FileStorage::new(storage_path.clone())));
		let pending = submission(
			"s-1",
			"P1",
			"B",
			"O1",
			0,
			json!({ "2024-01-01": { "B": { "item": "rice" } } }),
		);
		submissions
			.store(StorageKey::MemberOrders.as_str(), "s-1", &pending)
			.await
			.unwrap();

		let engine = ReconcilerBuilder::new(file_config(&storage_path, &seed_path))
			.build(factories())
			.unwrap();
		let report = engine.run_once().await.unwrap();

		assert_eq!(report.merged_groups, 1);
		assert_eq!(report.submissions_completed, 1);
		let stored: reconciler_types::MemberOrderSubmission = submissions
			.retrieve(StorageKey::MemberOrders.as_str(), "s-1")
			.await
			.unwrap();
		assert_eq!(stored.status, SubmissionStatus::Completed);
		assert!(stored.updated_at.is_some());
	}

	#[test]
	fn test_invalid_backend_table_fails_build() {
		let config: Config = r#"
[reconciler]
id = "builder-test"

[storage]
primary = "memory"
[storage.implementations.memory]
[storage.implementations.file]
storage_path = ""

[listings]
primary = "memory"
[listings.implementations.memory]
"#
		.parse()
		.unwrap();

		let err = ReconcilerBuilder::new(config)
			.build(factories())
			.err()
			.unwrap();
		assert!(matches!(err, BuilderError::Config(msg) if msg.contains("'file'")));
	}

	#[test]
	fn test_unregistered_primary_is_missing_component() {
		let config: Config = r#"
[reconciler]
id = "builder-test"

[storage]
primary = "postgres"
[storage.implementations.postgres]

[listings]
primary = "memory"
[listings.implementations.memory]
"#
		.parse()
		.unwrap();

		let err = ReconcilerBuilder::new(config)
			.build(factories())
			.err()
			.unwrap();
		assert!(matches!(err, BuilderError::MissingComponent(msg) if msg.contains("postgres")));
	}
}
