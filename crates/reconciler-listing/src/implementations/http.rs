//! HTTP listing backend for a marketplace integration API.
//!
//! Uses two endpoints relative to `base_url`:
//! - `GET  listings/show?id=<id>` returning `{ "data": { "id", "attributes": { "metadata" } } }`
//! - `POST listings/update` with `{ "id", "metadata" }`, which replaces the given
//!   top-level metadata keys.
//!
//! Requests carry `access_token` as a bearer token.

use crate::{ListingError, ListingFactory, ListingInterface, ListingRegistry};
use async_trait::async_trait;
use reconciler_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Listing, MetadataPatch, Schema,
	SecretString, ValidationError,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Listing backend talking to the integration API over HTTP.
pub struct HttpListings {
	client: reqwest::Client,
	base_url: String,
	access_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
	data: ListingResource,
}

#[derive(Debug, Deserialize)]
struct ListingResource {
	id: String,
	#[serde(default)]
	attributes: ListingAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct ListingAttributes {
	#[serde(default)]
	metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
	id: &'a str,
	metadata: &'a MetadataPatch,
}

impl HttpListings {
	/// Creates a new backend for the given API root.
	pub fn new(
		base_url: &str,
		access_token: SecretString,
		timeout: Duration,
	) -> Result<Self, ListingError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.pool_idle_timeout(Duration::from_secs(90))
			.build()
			.map_err(|e| ListingError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
			access_token,
		})
	}

	fn endpoint(&self, path: &str) -> String {
		format!("{}/{}", self.base_url, path)
	}

	/// Maps a non-success response to an error, consuming its body.
	async fn error_from_response(response: reqwest::Response) -> ListingError {
		let status = response.status().as_u16();
		let message = response
			.text()
			.await
			.unwrap_or_else(|e| format!("<unreadable body: {}>", e));
		ListingError::Api { status, message }
	}
}

/// Decodes a `listings/show` response body.
fn decode_show_response(body: &[u8]) -> Result<Listing, ListingError> {
	let response: ShowResponse =
		serde_json::from_slice(body).map_err(|e| ListingError::InvalidResponse(e.to_string()))?;
	Ok(Listing::new(
		response.data.id,
		response.data.attributes.metadata.unwrap_or_default(),
	))
}

#[async_trait]
impl ListingInterface for HttpListings {
	async fn get_listing(&self, id: &str) -> Result<Listing, ListingError> {
		let response = self
			.client
			.get(self.endpoint("listings/show"))
			.bearer_auth(self.access_token.expose_secret())
			.query(&[("id", id)])
			.send()
			.await
			.map_err(|e| ListingError::Transport(e.to_string()))?;

		match response.status() {
			StatusCode::NOT_FOUND => Err(ListingError::NotFound(id.to_string())),
			status if status.is_success() => {
				let body = response
					.bytes()
					.await
					.map_err(|e| ListingError::Transport(e.to_string()))?;
				decode_show_response(&body)
			},
			_ => Err(Self::error_from_response(response).await),
		}
	}

	async fn update_listing_metadata(
		&self,
		id: &str,
		patch: MetadataPatch,
	) -> Result<(), ListingError> {
		let response = self
			.client
			.post(self.endpoint("listings/update"))
			.bearer_auth(self.access_token.expose_secret())
			.json(&UpdateRequest {
				id,
				metadata: &patch,
			})
			.send()
			.await
			.map_err(|e| ListingError::Transport(e.to_string()))?;

		match response.status() {
			StatusCode::NOT_FOUND => Err(ListingError::NotFound(id.to_string())),
			status if status.is_success() => Ok(()),
			_ => Err(Self::error_from_response(response).await),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpListingsSchema)
	}
}

/// Configuration schema for HttpListings.
pub struct HttpListingsSchema;

impl ConfigSchema for HttpListingsSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("base_url", FieldType::String).with_validator(|v| {
					match v.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("base_url must start with http:// or https://".to_string()),
					}
				}),
				Field::new("access_token", FieldType::String).with_validator(|v| {
					match v.as_str() {
						Some(token) if !token.is_empty() => Ok(()),
						_ => Err("access_token cannot be empty".to_string()),
					}
				}),
			],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create an HTTP listing backend.
///
/// Configuration parameters:
/// - `base_url`: API root, e.g. `https://api.example.com/v1/integration_api`
/// - `access_token`: bearer token for the API
/// - `timeout_seconds`: request timeout (default: 30)
pub fn create_listings(config: &toml::Value) -> Result<Box<dyn ListingInterface>, ListingError> {
	HttpListingsSchema
		.validate(config)
		.map_err(|e| ListingError::Configuration(e.to_string()))?;

	// Presence and types were checked by the schema.
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or_default();
	let access_token = config
		.get("access_token")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.unwrap_or_else(|| SecretString::from(""));
	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(HttpListings::new(
		base_url,
		access_token,
		Duration::from_secs(timeout_seconds),
	)?))
}

/// Registry for the HTTP listing implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = ListingFactory;

	fn factory() -> Self::Factory {
		create_listings
	}
}

impl ListingRegistry for Registry {}
