//! Batch orchestration.
//!
//! A run fetches every pending submission, groups them, and fans out one
//! [`GroupPipeline`] task per group, bounded by `max_concurrent_groups`. Only
//! a failed fetch fails the run; group errors end up in the [`RunReport`].

use crate::grouper::{group_submissions, PlanGroup};
use crate::pipeline::GroupPipeline;
use crate::report::{GroupReport, RunReport};
use crate::state::SubmissionStateMachine;
use chrono::Utc;
use reconciler_config::Config;
use reconciler_listing::ListingService;
use reconciler_storage::StorageService;
use reconciler_types::{truncate_id, SubmissionStatus};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{instrument, Instrument};
use uuid::Uuid;

/// Errors that fail a whole run.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Failed to fetch pending submissions: {0}")]
	Fetch(String),
}

/// Reconciles pending member order submissions into their plans.
#[derive(Clone)]
pub struct ReconcilerEngine {
	config: Config,
	state_machine: Arc<SubmissionStateMachine>,
	pipeline: Arc<GroupPipeline>,
}

impl ReconcilerEngine {
	pub fn new(config: Config, storage: Arc<StorageService>, listings: Arc<ListingService>) -> Self {
		let state_machine = Arc::new(SubmissionStateMachine::new(storage));
		let pipeline = Arc::new(GroupPipeline::new(listings, state_machine.clone()));
		Self {
			config,
			state_machine,
			pipeline,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Runs a single batch.
	#[instrument(skip_all, fields(reconciler = %self.config.reconciler.id, run_id = tracing::field::Empty))]
	pub async fn run_once(&self) -> Result<RunReport, EngineError> {
		let run_id = Uuid::new_v4().to_string();
		tracing::Span::current().record("run_id", tracing::field::display(&run_id));
		let started_at = Utc::now();

		let pending = self
			.state_machine
			.query_by_status(SubmissionStatus::Pending)
			.await
			.map_err(|e| EngineError::Fetch(e.to_string()))?;
		let fetched = pending.len();
		let groups = group_submissions(pending);

		tracing::info!(fetched, groups = groups.len(), "Starting reconciliation run");

		let semaphore = Arc::new(Semaphore::new(self.config.reconciler.max_concurrent_groups));
		let mut tasks = Vec::with_capacity(groups.len());
		for group in groups {
			let fallback =
				GroupReport::new(&group.plan_id, &group.order_id, group.submissions.len());
			let handle = self.spawn_group(&semaphore, group).await;
			tasks.push((fallback, handle));
		}

		let mut reports = Vec::with_capacity(tasks.len());
		for (fallback, handle) in tasks {
			let report = match handle {
				Some(handle) => match handle.await {
					Ok(report) => report,
					Err(e) => {
						tracing::error!(
							plan_id = %truncate_id(&fallback.plan_id),
							order_id = %truncate_id(&fallback.order_id),
							error = %e,
							"Group task did not complete"
						);
						GroupReport {
							error: Some(format!("Group task did not complete: {}", e)),
							..fallback
						}
					},
				},
				None => GroupReport {
					error: Some("Group was not scheduled".into()),
					..fallback
				},
			};
			reports.push(report);
		}

		let report = RunReport::new(run_id, started_at, fetched, reports);
		tracing::info!(
			groups = report.total_groups(),
			merged = report.merged_groups,
			canceled = report.canceled_groups,
			aborted = report.aborted_groups,
			failed = report.failed_groups,
			submissions_completed = report.submissions_completed,
			submissions_canceled = report.submissions_canceled,
			failed_writes = report.failed_writes,
			"Reconciliation run finished"
		);

		Ok(report)
	}

	/// Runs batches on the configured interval until the future is dropped.
	///
	/// Without `interval_seconds` a single batch runs. A failed scheduled run
	/// is logged and the next one still happens.
	pub async fn run(&self) -> Result<(), EngineError> {
		let Some(seconds) = self.config.reconciler.interval_seconds else {
			self.run_once().await?;
			return Ok(());
		};

		tracing::info!(interval_seconds = seconds, "Running on schedule");
		let mut interval = tokio::time::interval(Duration::from_secs(seconds));
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			interval.tick().await;
			if let Err(e) = self.run_once().await {
				tracing::error!(error = %e, "Reconciliation run failed");
			}
		}
	}

	/// Waits for a permit, then processes the group on its own task.
	///
	/// Returns `None` if no permit could be acquired.
	async fn spawn_group(
		&self,
		semaphore: &Arc<Semaphore>,
		group: PlanGroup,
	) -> Option<JoinHandle<GroupReport>> {
		match semaphore.clone().acquire_owned().await {
			Ok(permit) => {
				let pipeline = self.pipeline.clone();
				let task = async move {
					let _permit = permit;
					pipeline.process(group).await
				};
				Some(tokio::spawn(task.in_current_span()))
			},
			Err(e) => {
				tracing::error!(
					plan_id = %truncate_id(&group.plan_id),
					order_id = %truncate_id(&group.order_id),
					error = %e,
					"Failed to acquire group permit"
				);
				None
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::report::{GroupOutcome, PipelineStage};
	use crate::test_support::{listing, submission, FlakyListings};
	use reconciler_storage::implementations::memory::MemoryStorage;
	use reconciler_types::{Listing, MemberOrderSubmission, PlanListing};
	use serde_json::{json, Value};

	fn config(max_concurrent_groups: usize) -> Config {
		format!(
			r#"
[reconciler]
id = "test-reconciler"
max_concurrent_groups = {max_concurrent_groups}

[storage]
primary = "memory"
[storage.implementations.memory]

[listings]
primary = "memory"
[listings.implementations.memory]
"#
		)
		.parse()
		.unwrap()
	}

	struct Harness {
		engine: ReconcilerEngine,
		listings: FlakyListings,
		storage: Arc<StorageService>,
		state: SubmissionStateMachine,
	}

	impl Harness {
		async fn new(
			listings: Vec<Listing>,
			submissions: Vec<MemberOrderSubmission>,
			max_concurrent_groups: usize,
		) -> Self {
			let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
			let state = SubmissionStateMachine::new(storage.clone());
			for s in &submissions {
				state.store_submission(s).await.unwrap();
			}
			let listings = FlakyListings::new(listings);
			let engine = ReconcilerEngine::new(
				config(max_concurrent_groups),
				storage.clone(),
				Arc::new(ListingService::new(Box::new(listings.clone()))),
			);
			Self {
				engine,
				listings,
				storage,
				state,
			}
		}

		async fn status(&self, id: &str) -> SubmissionStatus {
			self.state.get_submission(id).await.unwrap().status
		}

		async fn member_orders(&self, plan_id: &str, day: &str) -> Value {
			let plan = PlanListing::try_from(&self.listings.snapshot(plan_id).await).unwrap();
			Value::Object(plan.order_detail[day].member_orders.clone())
		}

		fn group<'a>(report: &'a RunReport, plan_id: &str) -> &'a GroupReport {
			report
				.groups
				.iter()
				.find(|g| g.plan_id == plan_id)
				.unwrap()
		}
	}

	fn plan(id: &str, order_id: &str) -> Listing {
		listing(
			id,
			json!({
				"orderId": order_id,
				"title": "Team lunch",
				"orderDetail": {
					"2024-01-01": {
						"restaurant": { "id": "r-1" },
						"memberOrders": { "A": { "item": "pho" } }
					},
					"2024-01-02": { "memberOrders": {} }
				}
			}),
		)
	}

	fn order(id: &str, state: &str) -> Listing {
		listing(id, json!({ "orderState": state }))
	}

	fn lunch(id: &str, plan_id: &str, participant: &str, order_id: &str, at: i64, item: &str) -> MemberOrderSubmission {
		submission(
			id,
			plan_id,
			participant,
			order_id,
			at,
			json!({ "2024-01-01": { participant: { "item": item } } }),
		)
	}

	#[tokio::test]
	async fn test_merges_open_orders_and_cancels_closed_ones() {
		let h = Harness::new(
			vec![
				plan("P1", "O1"),
				order("O1", "inProgress"),
				plan("P2", "O2"),
				order("O2", "completed"),
			],
			vec![
				lunch("s-1", "P1", "B", "O1", 10, "soup"),
				lunch("s-2", "P1", "B", "O1", 20, "rice"),
				lunch("s-3", "P2", "C", "O2", 5, "banh mi"),
				lunch("s-4", "P2", "D", "O2", 6, "bun"),
			],
			16,
		)
		.await;

		let report = h.engine.run_once().await.unwrap();

		assert_eq!(report.fetched, 4);
		assert_eq!(report.merged_groups, 1);
		assert_eq!(report.canceled_groups, 1);
		assert_eq!(report.submissions_completed, 2);
		assert_eq!(report.submissions_canceled, 2);
		assert_eq!(report.failed_writes, 0);

		assert_eq!(
			h.member_orders("P1", "2024-01-01").await,
			json!({ "A": { "item": "pho" }, "B": { "item": "rice" } })
		);
		assert_eq!(h.member_orders("P1", "2024-01-02").await, json!({}));
		let p1 = h.listings.snapshot("P1").await;
		assert_eq!(p1.metadata["title"], "Team lunch");
		assert_eq!(
			p1.metadata["orderDetail"]["2024-01-01"]["restaurant"],
			json!({ "id": "r-1" })
		);
		assert_eq!(h.status("s-1").await, SubmissionStatus::Completed);
		assert_eq!(h.status("s-2").await, SubmissionStatus::Completed);

		assert_eq!(h.listings.snapshot("P2").await, plan("P2", "O2"));
		assert_eq!(h.status("s-3").await, SubmissionStatus::Canceled);
		assert_eq!(h.status("s-4").await, SubmissionStatus::Canceled);
	}

	#[tokio::test]
	async fn test_second_run_changes_nothing() {
		let h = Harness::new(
			vec![plan("P1", "O1"), order("O1", "picking")],
			vec![lunch("s-1", "P1", "B", "O1", 0, "rice")],
			4,
		)
		.await;

		h.engine.run_once().await.unwrap();
		let plan_after_first = h.listings.snapshot("P1").await;
		let submission_after_first = h.state.get_submission("s-1").await.unwrap();

		let second = h.engine.run_once().await.unwrap();
		assert_eq!(second.fetched, 0);
		assert_eq!(second.total_groups(), 0);
		assert_ne!(second.run_id, "");
		assert_eq!(h.listings.snapshot("P1").await, plan_after_first);
		assert_eq!(
			h.state.get_submission("s-1").await.unwrap(),
			submission_after_first
		);
	}

	#[tokio::test]
	async fn test_failing_group_does_not_stop_siblings() {
		let h = Harness::new(
			vec![
				plan("P1", "O1"),
				order("O1", "inProgress"),
				plan("P2", "O2"),
				order("O2", "inProgress"),
			],
			vec![
				lunch("s-1", "P1", "B", "O1", 0, "rice"),
				lunch("s-2", "P2", "C", "O2", 1, "pho"),
				lunch("s-3", "P3", "D", "O3", 2, "bun"),
			],
			1,
		)
		.await;
		h.listings.fail_get("P2");

		let report = h.engine.run_once().await.unwrap();

		assert_eq!(report.total_groups(), 3);
		assert_eq!(Harness::group(&report, "P1").outcome, GroupOutcome::Merged);
		assert_eq!(Harness::group(&report, "P2").outcome, GroupOutcome::Failed);
		assert_eq!(Harness::group(&report, "P3").outcome, GroupOutcome::Aborted);
		assert_eq!(h.status("s-1").await, SubmissionStatus::Completed);
		assert_eq!(h.status("s-2").await, SubmissionStatus::Pending);
		assert_eq!(h.status("s-3").await, SubmissionStatus::Pending);
	}

	#[tokio::test]
	async fn test_panicking_group_is_recorded_as_failed() {
		let h = Harness::new(
			vec![plan("P1", "O1"), order("O1", "inProgress")],
			vec![
				lunch("s-1", "P1", "B", "O1", 0, "rice"),
				lunch("s-2", "P9", "C", "O9", 1, "pho"),
			],
			2,
		)
		.await;
		h.listings.panic_on_get("P9");

		let report = h.engine.run_once().await.unwrap();

		let crashed = Harness::group(&report, "P9");
		assert_eq!(crashed.outcome, GroupOutcome::Failed);
		assert_eq!(crashed.stage, PipelineStage::Grouped);
		assert!(crashed.error.as_deref().unwrap().contains("did not complete"));
		assert_eq!(Harness::group(&report, "P1").outcome, GroupOutcome::Merged);
		assert_eq!(h.status("s-2").await, SubmissionStatus::Pending);
	}

	#[tokio::test]
	async fn test_stale_order_is_never_merged_or_canceled() {
		let h = Harness::new(
			vec![
				plan("P1", "O1"),
				order("O1", "inProgress"),
				order("O-old", "completed"),
			],
			vec![lunch("s-1", "P1", "B", "O-old", 0, "rice")],
			4,
		)
		.await;

		let report = h.engine.run_once().await.unwrap();

		let group = Harness::group(&report, "P1");
		assert_eq!(group.outcome, GroupOutcome::Aborted);
		assert!(group.error.as_deref().unwrap().contains("O-old"));
		assert_eq!(h.status("s-1").await, SubmissionStatus::Pending);
		assert_eq!(h.listings.snapshot("P1").await, plan("P1", "O1"));
	}

	#[tokio::test]
	async fn test_plan_update_failure_keeps_submissions_pending() {
		let h = Harness::new(
			vec![plan("P1", "O1"), order("O1", "inProgress")],
			vec![lunch("s-1", "P1", "B", "O1", 0, "rice")],
			4,
		)
		.await;
		h.listings.fail_update("P1");

		let report = h.engine.run_once().await.unwrap();
		assert_eq!(report.failed_groups, 1);
		assert_eq!(report.submissions_completed, 0);
		assert_eq!(h.status("s-1").await, SubmissionStatus::Pending);

		// The next run picks the submission up again once the plan accepts writes.
		let retry = ReconcilerEngine::new(
			h.engine.config().clone(),
			h.storage.clone(),
			Arc::new(ListingService::new(Box::new(FlakyListings::new(vec![
				h.listings.snapshot("P1").await,
				order("O1", "inProgress"),
			])))),
		);
		let report = retry.run_once().await.unwrap();
		assert_eq!(report.submissions_completed, 1);
		assert_eq!(h.status("s-1").await, SubmissionStatus::Completed);
	}

	#[tokio::test]
	async fn test_scheduled_run_without_interval_runs_once() {
		let h = Harness::new(
			vec![plan("P1", "O1"), order("O1", "picking")],
			vec![lunch("s-1", "P1", "B", "O1", 0, "rice")],
			4,
		)
		.await;

		h.engine.run().await.unwrap();
		assert_eq!(h.status("s-1").await, SubmissionStatus::Completed);
	}
}
