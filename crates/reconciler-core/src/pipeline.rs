//! Per-group reconciliation pipeline.
//!
//! Stages run in order and each is gated on the previous one:
//! validate, merge, persist the plan, finalize the submissions. A merged group's
//! submissions are completed only after the plan update succeeded.

use crate::grouper::PlanGroup;
use crate::merger::merge_order_detail;
use crate::report::{GroupOutcome, GroupReport, PipelineStage};
use crate::state::SubmissionStateMachine;
use crate::validator::{validate_group, Eligibility, GroupAbort};
use futures::future::join_all;
use reconciler_listing::ListingService;
use reconciler_types::{truncate_id, PlanListing, SubmissionStatus};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that stop a group's pipeline.
#[derive(Debug, Error)]
pub enum GroupError {
	/// The plan or order cannot be used.
	#[error("Group aborted: {0}")]
	Aborted(#[from] GroupAbort),
	/// The listing service could not be reached or answered with an error.
	#[error("Listing error: {0}")]
	Listing(String),
	/// The merged order detail could not be written to the plan.
	#[error("Plan update failed: {0}")]
	PlanUpdate(String),
}

impl GroupError {
	fn outcome(&self) -> GroupOutcome {
		match self {
			GroupError::Aborted(_) => GroupOutcome::Aborted,
			GroupError::Listing(_) | GroupError::PlanUpdate(_) => GroupOutcome::Failed,
		}
	}
}

/// Runs the reconciliation stages for one group at a time.
pub struct GroupPipeline {
	listings: Arc<ListingService>,
	state_machine: Arc<SubmissionStateMachine>,
}

impl GroupPipeline {
	pub fn new(listings: Arc<ListingService>, state_machine: Arc<SubmissionStateMachine>) -> Self {
		Self {
			listings,
			state_machine,
		}
	}

	/// Processes a group and reports how far it got.
	///
	/// Never fails: every error is logged and recorded in the report.
	#[instrument(skip_all, fields(
		plan_id = %truncate_id(&group.plan_id),
		order_id = %truncate_id(&group.order_id),
	))]
	pub async fn process(&self, group: PlanGroup) -> GroupReport {
		let mut report = GroupReport::new(&group.plan_id, &group.order_id, group.submissions.len());

		if let Err(e) = self.run_stages(&group, &mut report).await {
			report.outcome = e.outcome();
			report.error = Some(e.to_string());
			match &e {
				GroupError::Aborted(_) => {
					tracing::warn!(error = %e, submissions = report.submissions, "Group skipped, submissions left pending");
				},
				_ => {
					tracing::error!(error = %e, stage = %report.stage, "Group failed, submissions left pending");
				},
			}
			return report;
		}

		tracing::info!(
			outcome = %report.outcome,
			finalized = report.finalized,
			failed_writes = report.failed_writes.len(),
			entries_merged = report.entries_merged,
			"Group processed"
		);
		report
	}

	async fn run_stages(
		&self,
		group: &PlanGroup,
		report: &mut GroupReport,
	) -> Result<(), GroupError> {
		let eligibility = validate_group(&self.listings, group).await?;
		report.stage = PipelineStage::Validated;

		match eligibility {
			Eligibility::Eligible(plan) => {
				self.merge_and_persist(group, plan, report).await?;
				self.finalize(group, SubmissionStatus::Completed, report)
					.await;
				report.outcome = GroupOutcome::Merged;
			},
			Eligibility::Ineligible(state) => {
				tracing::info!(
					order_state = ?state,
					"Order no longer accepts member orders, canceling submissions"
				);
				self.finalize(group, SubmissionStatus::Canceled, report)
					.await;
				report.outcome = GroupOutcome::Canceled;
			},
		}

		Ok(())
	}

	async fn merge_and_persist(
		&self,
		group: &PlanGroup,
		plan: PlanListing,
		report: &mut GroupReport,
	) -> Result<(), GroupError> {
		let merged = merge_order_detail(&plan.order_detail, &group.participant_submissions);
		report.stage = PipelineStage::Merged;
		report.entries_merged = merged.entries_merged;
		if merged.entries_skipped > 0 {
			tracing::warn!(
				skipped = merged.entries_skipped,
				"Some day payloads were malformed and not merged"
			);
		}

		self.listings
			.replace_order_detail(&plan.id, &merged.order_detail)
			.await
			.map_err(|e| GroupError::PlanUpdate(e.to_string()))?;
		report.stage = PipelineStage::Persisted;

		Ok(())
	}

	/// Moves every submission of the group to `status`.
	///
	/// Writes run concurrently; a failed write is recorded and does not stop
	/// the others.
	async fn finalize(&self, group: &PlanGroup, status: SubmissionStatus, report: &mut GroupReport) {
		let writes = group.submission_ids().map(|id| async move {
			let result = self.state_machine.transition_status(id, status).await;
			(id, result)
		});

		for (id, result) in join_all(writes).await {
			match result {
				Ok(_) => report.finalized += 1,
				Err(e) => {
					tracing::error!(
						submission_id = %truncate_id(id),
						status = %status,
						error = %e,
						"Failed to finalize submission"
					);
					report.failed_writes.push(id.to_string());
				},
			}
		}

		report.stage = PipelineStage::Finalized;
	}
}
