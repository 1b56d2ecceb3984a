//! Per-group and per-run reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Pipeline stages a group passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
	Grouped,
	Validated,
	Merged,
	Persisted,
	Finalized,
}

impl fmt::Display for PipelineStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			PipelineStage::Grouped => "grouped",
			PipelineStage::Validated => "validated",
			PipelineStage::Merged => "merged",
			PipelineStage::Persisted => "persisted",
			PipelineStage::Finalized => "finalized",
		};
		f.write_str(name)
	}
}

/// How a group's pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupOutcome {
	/// Plan data merged and submissions completed.
	Merged,
	/// Order no longer accepts member orders; submissions canceled.
	Canceled,
	/// Plan or order could not be used; submissions left pending.
	Aborted,
	/// A listing call failed or the task died; submissions left pending.
	Failed,
}

impl fmt::Display for GroupOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			GroupOutcome::Merged => "merged",
			GroupOutcome::Canceled => "canceled",
			GroupOutcome::Aborted => "aborted",
			GroupOutcome::Failed => "failed",
		};
		f.write_str(name)
	}
}

/// Result of one group's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReport {
	pub plan_id: String,
	pub order_id: String,
	pub outcome: GroupOutcome,
	/// Last stage the group completed.
	pub stage: PipelineStage,
	/// Number of raw submissions in the group.
	pub submissions: usize,
	/// Submissions successfully moved to their final status.
	pub finalized: usize,
	/// Ids of submissions whose status write failed.
	pub failed_writes: Vec<String>,
	/// Day entries written into the plan.
	pub entries_merged: usize,
	/// Reason the group was aborted or failed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl GroupReport {
	pub(crate) fn new(plan_id: &str, order_id: &str, submissions: usize) -> Self {
		Self {
			plan_id: plan_id.to_string(),
			order_id: order_id.to_string(),
			outcome: GroupOutcome::Failed,
			stage: PipelineStage::Grouped,
			submissions,
			finalized: 0,
			failed_writes: Vec::new(),
			entries_merged: 0,
			error: None,
		}
	}
}

/// Summary of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
	pub run_id: String,
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
	/// Pending submissions fetched at the start of the run.
	pub fetched: usize,
	pub merged_groups: usize,
	pub canceled_groups: usize,
	pub aborted_groups: usize,
	pub failed_groups: usize,
	pub submissions_completed: usize,
	pub submissions_canceled: usize,
	pub failed_writes: usize,
	pub groups: Vec<GroupReport>,
}

impl RunReport {
	pub(crate) fn new(
		run_id: String,
		started_at: DateTime<Utc>,
		fetched: usize,
		groups: Vec<GroupReport>,
	) -> Self {
		let count = |outcome: GroupOutcome| groups.iter().filter(|g| g.outcome == outcome).count();
		let finalized = |outcome: GroupOutcome| -> usize {
			groups
				.iter()
				.filter(|g| g.outcome == outcome)
				.map(|g| g.finalized)
				.sum()
		};

		Self {
			run_id,
			started_at,
			finished_at: Utc::now(),
			fetched,
			merged_groups: count(GroupOutcome::Merged),
			canceled_groups: count(GroupOutcome::Canceled),
			aborted_groups: count(GroupOutcome::Aborted),
			failed_groups: count(GroupOutcome::Failed),
			submissions_completed: finalized(GroupOutcome::Merged),
			submissions_canceled: finalized(GroupOutcome::Canceled),
			failed_writes: groups.iter().map(|g| g.failed_writes.len()).sum(),
			groups,
		}
	}

	/// Total number of groups processed.
	pub fn total_groups(&self) -> usize {
		self.groups.len()
	}
}
