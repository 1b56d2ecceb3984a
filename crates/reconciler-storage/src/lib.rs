//! Storage module for the member-order reconciler.
//!
//! This module provides the document store the reconciler reads submissions from
//! and writes their final status to. A low-level [`StorageInterface`] backend holds
//! raw bytes under `namespace:id` keys; [`StorageService`] layers typed JSON
//! records and filtered queries on top of it.

use async_trait::async_trait;
use reconciler_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Keys have the form `namespace:id`. Backends must be able to enumerate the
/// ids stored under one namespace so collections can be queried.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key, overwriting any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists the ids stored under a namespace, without the namespace prefix.
	async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples used by the service to resolve
/// `storage.implementations.<name>` tables.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Builds the backend key for a record.
fn make_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

/// Filter applied to the JSON form of each record in a query.
///
/// Field names address top-level fields of the serialized record.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
	/// Matches every record.
	All,
	/// Matches records whose field equals the value.
	Equals(String, Value),
	/// Matches records whose field is absent or differs from the value.
	NotEquals(String, Value),
	/// Matches records whose field equals one of the values.
	In(String, Vec<Value>),
	/// Matches records whose field is absent or equals none of the values.
	NotIn(String, Vec<Value>),
}

impl QueryFilter {
	/// Returns true if the record matches this filter.
	pub fn matches(&self, record: &Value) -> bool {
		match self {
			QueryFilter::All => true,
			QueryFilter::Equals(field, expected) => record.get(field) == Some(expected),
			QueryFilter::NotEquals(field, expected) => record.get(field) != Some(expected),
			QueryFilter::In(field, values) => record
				.get(field)
				.is_some_and(|actual| values.contains(actual)),
			QueryFilter::NotIn(field, values) => record
				.get(field)
				.is_none_or(|actual| !values.contains(actual)),
		}
	}
}

/// High-level storage service that provides typed operations.
///
/// Records are stored as JSON. The namespace and id are combined into the
/// backend key.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&make_key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&make_key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Merges top-level fields into an existing record and returns the result.
	///
	/// Only the given keys are overwritten; every other stored field is kept.
	/// Returns `NotFound` if the record does not exist, so a patch never
	/// resurrects a missing record.
	pub async fn patch(
		&self,
		namespace: &str,
		id: &str,
		fields: Map<String, Value>,
	) -> Result<Value, StorageError> {
		let key = make_key(namespace, id);
		let bytes = self.backend.get_bytes(&key).await?;

		let mut record: Value = serde_json::from_slice(&bytes)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		let Some(object) = record.as_object_mut() else {
			return Err(StorageError::Serialization(format!(
				"record {} is not a JSON object",
				key
			)));
		};
		object.extend(fields);

		let bytes =
			serde_json::to_vec(&record).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await?;

		Ok(record)
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&make_key(namespace, id)).await
	}

	/// Returns every record of a namespace matching the filter, as `(id, record)`.
	///
	/// Records that disappear between listing and reading, or that cannot be
	/// decoded, are skipped with a warning. Backend failures abort the query.
	/// Results are in no particular order.
	pub async fn query<T: DeserializeOwned>(
		&self,
		namespace: &str,
		filter: QueryFilter,
	) -> Result<Vec<(String, T)>, StorageError> {
		let ids = self.backend.list_ids(namespace).await?;
		let mut results = Vec::with_capacity(ids.len());

		for id in ids {
			let bytes = match self.backend.get_bytes(&make_key(namespace, &id)).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};

			let value: Value = match serde_json::from_slice(&bytes) {
				Ok(value) => value,
				Err(e) => {
					tracing::warn!(namespace, id = %id, error = %e, "Skipping undecodable record");
					continue;
				},
			};

			if !filter.matches(&value) {
				continue;
			}

			match serde_json::from_value(value) {
				Ok(record) => results.push((id, record)),
				Err(e) => {
					tracing::warn!(namespace, id = %id, error = %e, "Skipping undecodable record");
				},
			}
		}

		Ok(results)
	}
}
