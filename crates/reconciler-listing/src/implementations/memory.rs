//! In-memory listing backend.
//!
//! Holds listings in a map, optionally seeded from a JSON file containing an
//! array of listings. Used by tests and for local dry runs.

use crate::{ListingError, ListingFactory, ListingInterface, ListingRegistry};
use async_trait::async_trait;
use reconciler_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Listing, MetadataPatch, Schema,
	ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory listing store.
#[derive(Clone, Default)]
pub struct MemoryListings {
	listings: Arc<RwLock<HashMap<String, Listing>>>,
}

impl MemoryListings {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a store holding the given listings.
	pub fn with_listings(listings: impl IntoIterator<Item = Listing>) -> Self {
		let map = listings
			.into_iter()
			.map(|listing| (listing.id.clone(), listing))
			.collect();
		Self {
			listings: Arc::new(RwLock::new(map)),
		}
	}

	/// Inserts or replaces a listing.
	pub async fn insert(&self, listing: Listing) {
		self.listings
			.write()
			.await
			.insert(listing.id.clone(), listing);
	}
}

#[async_trait]
impl ListingInterface for MemoryListings {
	async fn get_listing(&self, id: &str) -> Result<Listing, ListingError> {
		self.listings
			.read()
			.await
			.get(id)
			.cloned()
			.ok_or_else(|| ListingError::NotFound(id.to_string()))
	}

	async fn update_listing_metadata(
		&self,
		id: &str,
		patch: MetadataPatch,
	) -> Result<(), ListingError> {
		let mut listings = self.listings.write().await;
		let listing = listings
			.get_mut(id)
			.ok_or_else(|| ListingError::NotFound(id.to_string()))?;
		listing.apply_patch(patch);
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryListingsSchema)
	}
}

/// Configuration schema for MemoryListings.
pub struct MemoryListingsSchema;

impl ConfigSchema for MemoryListingsSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("seed_path", FieldType::String)]).validate(config)
	}
}

/// Factory function to create an in-memory listing backend.
///
/// Configuration parameters:
/// - `seed_path`: optional JSON file with an array of listings to preload
pub fn create_listings(config: &toml::Value) -> Result<Box<dyn ListingInterface>, ListingError> {
	MemoryListingsSchema
		.validate(config)
		.map_err(|e| ListingError::Configuration(e.to_string()))?;

	let Some(seed_path) = config.get("seed_path").and_then(|v| v.as_str()) else {
		return Ok(Box::new(MemoryListings::new()));
	};

	let content = std::fs::read_to_string(seed_path).map_err(|e| {
		ListingError::Configuration(format!("Cannot read seed file {}: {}", seed_path, e))
	})?;
	let listings: Vec<Listing> = serde_json::from_str(&content).map_err(|e| {
		ListingError::Configuration(format!("Invalid seed file {}: {}", seed_path, e))
	})?;
	tracing::info!(count = listings.len(), seed_path, "Seeded in-memory listings");

	Ok(Box::new(MemoryListings::with_listings(listings)))
}

/// Registry for the memory listing implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = ListingFactory;

	fn factory() -> Self::Factory {
		create_listings
	}
}

impl ListingRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::fs;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_get_and_update() {
		let store = MemoryListings::with_listings([Listing::new("order-1", Default::default())]);

		let mut patch = MetadataPatch::new();
		patch.insert("orderState".into(), json!("picking"));
		store.update_listing_metadata("order-1", patch).await.unwrap();

		let listing = store.get_listing("order-1").await.unwrap();
		assert_eq!(listing.metadata["orderState"], "picking");

		assert!(matches!(
			store.get_listing("missing").await,
			Err(ListingError::NotFound(id)) if id == "missing"
		));
		assert!(matches!(
			store.update_listing_metadata("missing", MetadataPatch::new()).await,
			Err(ListingError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_factory_seeds_from_file() {
		let temp_dir = TempDir::new().unwrap();
		let seed_path = temp_dir.path().join("listings.json");
		fs::write(
			&seed_path,
			json!([
				{ "id": "plan-1", "metadata": { "orderId": "order-1", "orderDetail": {} } },
				{ "id": "order-1", "metadata": { "orderState": "inProgress" } }
			])
			.to_string(),
		)
		.unwrap();

		let mut table = toml::map::Map::new();
		table.insert(
			"seed_path".into(),
			toml::Value::String(seed_path.to_string_lossy().into_owned()),
		);
		let backend = create_listings(&toml::Value::Table(table)).unwrap();

		let order = backend.get_listing("order-1").await.unwrap();
		assert_eq!(order.metadata["orderState"], "inProgress");
		assert!(backend.get_listing("plan-1").await.is_ok());
	}

	#[test]
	fn test_factory_rejects_missing_seed_file() {
		let config: toml::Value = toml::from_str(r#"seed_path = "/nonexistent/listings.json""#).unwrap();
		assert!(matches!(
			create_listings(&config),
			Err(ListingError::Configuration(_))
		));
	}
}
