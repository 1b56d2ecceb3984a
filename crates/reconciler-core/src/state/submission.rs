//! Submission state machine.
//!
//! Submissions are created by participants as `pending` and are finalized
//! exactly once, to `completed` or `canceled`. Every write stamps `updatedAt`
//! and touches only the fields it names.

use chrono::Utc;
use once_cell::sync::Lazy;
use reconciler_storage::{QueryFilter, StorageError, StorageService};
use reconciler_types::{MemberOrderSubmission, StorageKey, SubmissionStatus};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during submission state management.
#[derive(Debug, Error)]
pub enum SubmissionStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition {
		from: SubmissionStatus,
		to: SubmissionStatus,
	},
	#[error("Submission not found: {0}")]
	SubmissionNotFound(String),
}

impl SubmissionStateError {
	fn from_storage(id: &str, err: StorageError) -> Self {
		match err {
			StorageError::NotFound => SubmissionStateError::SubmissionNotFound(id.to_string()),
			other => SubmissionStateError::Storage(other.to_string()),
		}
	}
}

/// Reads and finalizes member order submissions.
pub struct SubmissionStateMachine {
	storage: Arc<StorageService>,
}

impl SubmissionStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Returns every submission with the given status, oldest first.
	///
	/// Ties on `createdAt` are broken by id so the order is total. The id of
	/// each returned submission is its storage key.
	pub async fn query_by_status(
		&self,
		status: SubmissionStatus,
	) -> Result<Vec<MemberOrderSubmission>, SubmissionStateError> {
		let filter = QueryFilter::Equals("status".into(), Value::from(status.as_str()));
		let records: Vec<(String, MemberOrderSubmission)> = self
			.storage
			.query(StorageKey::MemberOrders.as_str(), filter)
			.await
			.map_err(|e| SubmissionStateError::Storage(e.to_string()))?;

		let mut submissions: Vec<MemberOrderSubmission> = records
			.into_iter()
			.map(|(id, mut submission)| {
				submission.id = id;
				submission
			})
			.collect();
		submissions.sort_by(|a, b| {
			a.created_at
				.cmp(&b.created_at)
				.then_with(|| a.id.cmp(&b.id))
		});

		Ok(submissions)
	}

	/// Gets a submission by id. The returned id is always the storage key.
	pub async fn get_submission(
		&self,
		id: &str,
	) -> Result<MemberOrderSubmission, SubmissionStateError> {
		let mut submission: MemberOrderSubmission = self
			.storage
			.retrieve(StorageKey::MemberOrders.as_str(), id)
			.await
			.map_err(|e| SubmissionStateError::from_storage(id, e))?;
		submission.id = id.to_string();
		Ok(submission)
	}

	/// Stores a submission under its id.
	pub async fn store_submission(
		&self,
		submission: &MemberOrderSubmission,
	) -> Result<(), SubmissionStateError> {
		self.storage
			.store(StorageKey::MemberOrders.as_str(), &submission.id, submission)
			.await
			.map_err(|e| SubmissionStateError::Storage(e.to_string()))
	}

	/// Writes the fields returned by `updater` onto a stored submission.
	///
	/// The closure sees the current submission and returns the top-level
	/// fields to set. `updatedAt` is added to them; every other stored field,
	/// including ones this type does not model, is left as it is.
	pub async fn update_submission_with<F>(
		&self,
		id: &str,
		updater: F,
	) -> Result<MemberOrderSubmission, SubmissionStateError>
	where
		F: FnOnce(&MemberOrderSubmission) -> Map<String, Value>,
	{
		let submission = self.get_submission(id).await?;

		let mut fields = updater(&submission);
		let now = serde_json::to_value(Utc::now())
			.map_err(|e| SubmissionStateError::Storage(e.to_string()))?;
		fields.insert("updatedAt".to_string(), now);

		let record = self
			.storage
			.patch(StorageKey::MemberOrders.as_str(), id, fields)
			.await
			.map_err(|e| SubmissionStateError::from_storage(id, e))?;

		let mut updated: MemberOrderSubmission = serde_json::from_value(record)
			.map_err(|e| SubmissionStateError::Storage(e.to_string()))?;
		updated.id = id.to_string();
		Ok(updated)
	}

	/// Transitions a submission to a new status with validation.
	pub async fn transition_status(
		&self,
		id: &str,
		new_status: SubmissionStatus,
	) -> Result<MemberOrderSubmission, SubmissionStateError> {
		let submission = self.get_submission(id).await?;

		if !Self::is_valid_transition(submission.status, new_status) {
			return Err(SubmissionStateError::InvalidTransition {
				from: submission.status,
				to: new_status,
			});
		}

		self.update_submission_with(id, |_| {
			Map::from_iter([("status".to_string(), Value::from(new_status.as_str()))])
		})
		.await
	}

	/// Checks if a status transition is valid.
	fn is_valid_transition(from: SubmissionStatus, to: SubmissionStatus) -> bool {
		// Only the reconciler's own finalizations are allowed; every other
		// status belongs to actors outside this engine.
		static TRANSITIONS: Lazy<HashMap<SubmissionStatus, HashSet<SubmissionStatus>>> =
			Lazy::new(|| {
				HashMap::from([(
					SubmissionStatus::Pending,
					HashSet::from([SubmissionStatus::Completed, SubmissionStatus::Canceled]),
				)])
			});

		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}
}
