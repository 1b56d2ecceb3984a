//! Member order submission types.
//!
//! A submission is one participant's proposed order content for a shared plan.
//! Participants write submissions with a `pending` status; the reconciler merges
//! them into the plan and finalizes them as `completed` or `canceled`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Per-day payloads of a submission, keyed by day (date string).
///
/// Each value is kept in its wire form and decoded on demand with
/// [`DayEntry::from_wire`], so one malformed day never invalidates the rest of
/// the submission.
pub type PlanData = BTreeMap<String, Value>;

/// Lifecycle status of a member order submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionStatus {
	Pending,
	Canceled,
	CanceledByBooker,
	Picking,
	InProgress,
	PendingPayment,
	Completed,
	Reviewed,
	ExpiredStart,
}

impl SubmissionStatus {
	/// Returns the wire representation of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			SubmissionStatus::Pending => "pending",
			SubmissionStatus::Canceled => "canceled",
			SubmissionStatus::CanceledByBooker => "canceledByBooker",
			SubmissionStatus::Picking => "picking",
			SubmissionStatus::InProgress => "inProgress",
			SubmissionStatus::PendingPayment => "pendingPayment",
			SubmissionStatus::Completed => "completed",
			SubmissionStatus::Reviewed => "reviewed",
			SubmissionStatus::ExpiredStart => "expiredStart",
		}
	}
}

impl fmt::Display for SubmissionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One participant's proposed contribution to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberOrderSubmission {
	/// Storage key of the submission. Stored bodies may omit it.
	#[serde(default)]
	pub id: String,
	pub plan_id: String,
	pub participant_id: String,
	pub order_id: String,
	#[serde(default)]
	pub plan_data: PlanData,
	pub status: SubmissionStatus,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
}

/// Errors that can occur while decoding a day payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DayEntryError {
	#[error("Day payload is not an object")]
	NotAnObject,
	#[error("Day payload has no participant key")]
	MissingParticipant,
	#[error("Day payload has {0} participant keys, expected exactly one")]
	AmbiguousParticipant(usize),
}

/// A participant's item selection for one day.
///
/// On the wire a day payload wraps the items one level deeper, keyed by the
/// participant id: `{ "<participantId>": { ...items } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEntry {
	pub participant_id: String,
	pub items: Value,
}

impl DayEntry {
	/// Creates a new day entry.
	pub fn new(participant_id: impl Into<String>, items: Value) -> Self {
		Self {
			participant_id: participant_id.into(),
			items,
		}
	}

	/// Decodes a wire-format day payload.
	///
	/// The payload must be an object with exactly one key.
	pub fn from_wire(value: &Value) -> Result<Self, DayEntryError> {
		let object = value.as_object().ok_or(DayEntryError::NotAnObject)?;
		let mut entries = object.iter();
		match (entries.next(), entries.next()) {
			(Some((participant_id, items)), None) => Ok(Self::new(participant_id, items.clone())),
			(None, _) => Err(DayEntryError::MissingParticipant),
			_ => Err(DayEntryError::AmbiguousParticipant(object.len())),
		}
	}

	/// Encodes the entry in its wire format.
	pub fn into_wire(self) -> Value {
		let mut object = Map::new();
		object.insert(self.participant_id, self.items);
		Value::Object(object)
	}
}
