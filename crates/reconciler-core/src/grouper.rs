//! Grouping of pending submissions by plan and parent order.

use reconciler_types::{MemberOrderSubmission, PlanData};
use std::collections::BTreeMap;

/// All pending submissions for one `(plan, order)` pair.
///
/// Built fresh for each run and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanGroup {
	pub plan_id: String,
	pub order_id: String,
	/// Latest plan data per participant.
	pub participant_submissions: BTreeMap<String, PlanData>,
	/// Every submission of the pair, including superseded ones.
	pub submissions: Vec<MemberOrderSubmission>,
}

impl PlanGroup {
	fn new(plan_id: String, order_id: String) -> Self {
		Self {
			plan_id,
			order_id,
			participant_submissions: BTreeMap::new(),
			submissions: Vec::new(),
		}
	}

	/// Ids of every submission in the group.
	pub fn submission_ids(&self) -> impl Iterator<Item = &str> {
		self.submissions.iter().map(|s| s.id.as_str())
	}
}

/// Partitions submissions into one group per `(plan_id, order_id)`.
///
/// The input must be ordered oldest first: a later submission from the same
/// participant replaces the earlier one's plan data. Groups are returned sorted
/// by plan id, then order id.
pub fn group_submissions(submissions: Vec<MemberOrderSubmission>) -> Vec<PlanGroup> {
	let mut groups: BTreeMap<(String, String), PlanGroup> = BTreeMap::new();

	for submission in submissions {
		let key = (submission.plan_id.clone(), submission.order_id.clone());
		let group = groups
			.entry(key)
			.or_insert_with_key(|(plan_id, order_id)| {
				PlanGroup::new(plan_id.clone(), order_id.clone())
			});

		group.participant_submissions.insert(
			submission.participant_id.clone(),
			submission.plan_data.clone(),
		);
		group.submissions.push(submission);
	}

	groups.into_values().collect()
}
