//! Listing service module for the member-order reconciler.
//!
//! Plans and orders live in an external listing service. This module defines the
//! [`ListingInterface`] a backend must implement (fetch by id, metadata update)
//! and the [`ListingService`] the reconciler uses on top of it.

use async_trait::async_trait;
use reconciler_types::{
	ConfigSchema, ImplementationRegistry, Listing, MetadataPatch, OrderDetail, ORDER_DETAIL_KEY,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod memory;
}

/// Errors that can occur during listing operations.
#[derive(Debug, Error)]
pub enum ListingError {
	/// The listing does not exist.
	#[error("Listing not found: {0}")]
	NotFound(String),
	/// The request could not be sent or the connection failed.
	#[error("Transport error: {0}")]
	Transport(String),
	/// The listing service answered with an error status.
	#[error("Listing API error ({status}): {message}")]
	Api { status: u16, message: String },
	/// The response body could not be decoded.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// Error that occurs during serialization of a request payload.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for listing backends.
#[async_trait]
pub trait ListingInterface: Send + Sync {
	/// Fetches a listing by id.
	///
	/// Returns [`ListingError::NotFound`] when the listing does not exist.
	async fn get_listing(&self, id: &str) -> Result<Listing, ListingError>;

	/// Updates a listing's metadata.
	///
	/// Each top-level key of the patch replaces the stored value for that key.
	async fn update_listing_metadata(
		&self,
		id: &str,
		patch: MetadataPatch,
	) -> Result<(), ListingError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for listing factory functions.
pub type ListingFactory = fn(&toml::Value) -> Result<Box<dyn ListingInterface>, ListingError>;

/// Registry trait for listing implementations.
pub trait ListingRegistry: ImplementationRegistry<Factory = ListingFactory> {}

/// Get all registered listing implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ListingFactory)> {
	use implementations::{http, memory};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Service the reconciler uses to read plans and orders and write plan detail.
pub struct ListingService {
	backend: Box<dyn ListingInterface>,
}

impl ListingService {
	/// Creates a new ListingService with the specified backend.
	pub fn new(backend: Box<dyn ListingInterface>) -> Self {
		Self { backend }
	}

	/// Fetches a listing by id.
	pub async fn get_listing(&self, id: &str) -> Result<Listing, ListingError> {
		self.backend.get_listing(id).await
	}

	/// Applies a metadata patch to a listing.
	pub async fn update_listing_metadata(
		&self,
		id: &str,
		patch: MetadataPatch,
	) -> Result<(), ListingError> {
		self.backend.update_listing_metadata(id, patch).await
	}

	/// Replaces a plan's whole `orderDetail` metadata field.
	pub async fn replace_order_detail(
		&self,
		plan_id: &str,
		order_detail: &OrderDetail,
	) -> Result<(), ListingError> {
		let value = serde_json::to_value(order_detail)
			.map_err(|e| ListingError::Serialization(e.to_string()))?;
		let mut patch = MetadataPatch::new();
		patch.insert(ORDER_DETAIL_KEY.to_string(), value);
		self.update_listing_metadata(plan_id, patch).await
	}
}
