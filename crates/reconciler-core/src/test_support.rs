//! Fixtures shared by the engine tests.

use crate::state::SubmissionStateMachine;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reconciler_listing::implementations::memory::MemoryListings;
use reconciler_listing::{ListingError, ListingInterface};
use reconciler_storage::implementations::memory::MemoryStorage;
use reconciler_storage::StorageService;
use reconciler_types::{
	ConfigSchema, Listing, MemberOrderSubmission, MetadataPatch, SubmissionStatus,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Builds a pending submission created `created_secs` after a fixed instant.
pub(crate) fn submission(
	id: &str,
	plan_id: &str,
	participant_id: &str,
	order_id: &str,
	created_secs: i64,
	plan_data: Value,
) -> MemberOrderSubmission {
	let base = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
	MemberOrderSubmission {
		id: id.to_string(),
		plan_id: plan_id.to_string(),
		participant_id: participant_id.to_string(),
		order_id: order_id.to_string(),
		plan_data: serde_json::from_value(plan_data).unwrap(),
		status: SubmissionStatus::Pending,
		created_at: base + Duration::seconds(created_secs),
		updated_at: None,
	}
}

pub(crate) fn submission_store() -> (Arc<StorageService>, SubmissionStateMachine) {
	let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
	(storage.clone(), SubmissionStateMachine::new(storage))
}

pub(crate) fn listing(id: &str, metadata: Value) -> Listing {
	match metadata {
		Value::Object(map) => Listing::new(id, map),
		other => panic!("listing metadata must be an object, got {}", other),
	}
}

/// In-memory listings with injectable failures per listing id.
#[derive(Clone)]
pub(crate) struct FlakyListings {
	inner: MemoryListings,
	failing_gets: Arc<Mutex<HashSet<String>>>,
	failing_updates: Arc<Mutex<HashSet<String>>>,
	panicking_gets: Arc<Mutex<HashSet<String>>>,
}

impl FlakyListings {
	pub(crate) fn new(listings: Vec<Listing>) -> Self {
		Self {
			inner: MemoryListings::with_listings(listings),
			failing_gets: Arc::default(),
			failing_updates: Arc::default(),
			panicking_gets: Arc::default(),
		}
	}

	pub(crate) fn fail_get(&self, id: &str) {
		self.failing_gets.lock().unwrap().insert(id.to_string());
	}

	pub(crate) fn fail_update(&self, id: &str) {
		self.failing_updates.lock().unwrap().insert(id.to_string());
	}

	pub(crate) fn panic_on_get(&self, id: &str) {
		self.panicking_gets.lock().unwrap().insert(id.to_string());
	}

	/// Current stored state of a listing.
	pub(crate) async fn snapshot(&self, id: &str) -> Listing {
		self.inner.get_listing(id).await.unwrap()
	}
}

#[async_trait]
impl ListingInterface for FlakyListings {
	async fn get_listing(&self, id: &str) -> Result<Listing, ListingError> {
		if self.panicking_gets.lock().unwrap().contains(id) {
			panic!("listing backend crashed on {}", id);
		}
		if self.failing_gets.lock().unwrap().contains(id) {
			return Err(ListingError::Transport(format!("connection reset fetching {}", id)));
		}
		self.inner.get_listing(id).await
	}

	async fn update_listing_metadata(
		&self,
		id: &str,
		patch: MetadataPatch,
	) -> Result<(), ListingError> {
		if self.failing_updates.lock().unwrap().contains(id) {
			return Err(ListingError::Api {
				status: 503,
				message: "service unavailable".into(),
			});
		}
		self.inner.update_listing_metadata(id, patch).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}
