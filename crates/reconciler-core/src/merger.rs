//! Merging of participant day entries into a plan's order detail.

use reconciler_types::{truncate_id, DayEntry, DayEntryError, OrderDetail, PlanData};
use std::collections::BTreeMap;

/// Result of merging a group's plan data into an order detail.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDetail {
	/// The new order detail, with the same days as the original.
	pub order_detail: OrderDetail,
	/// Number of day entries written into `memberOrders`.
	pub entries_merged: usize,
	/// Number of day payloads skipped because they were malformed.
	pub entries_skipped: usize,
}

/// Overlays each participant's latest plan data onto the existing order detail.
///
/// Only days already present in `existing` are touched, and within a day only
/// the `memberOrders` map changes. Participants without an entry for a day
/// leave it as it was. A day payload must be an object with exactly one
/// participant key; anything else is skipped.
pub fn merge_order_detail(
	existing: &OrderDetail,
	participant_submissions: &BTreeMap<String, PlanData>,
) -> MergedDetail {
	let mut order_detail = existing.clone();
	let mut entries_merged = 0;
	let mut entries_skipped = 0;

	for (day, record) in order_detail.iter_mut() {
		for (participant_id, plan_data) in participant_submissions {
			let Some(payload) = plan_data.get(day) else {
				continue;
			};

			match DayEntry::from_wire(payload) {
				Ok(entry) => {
					tracing::debug!(
						day = %day,
						participant = %truncate_id(participant_id),
						entry_participant = %truncate_id(&entry.participant_id),
						"Merging day entry"
					);
					record.member_orders.insert(entry.participant_id, entry.items);
					entries_merged += 1;
				},
				Err(DayEntryError::NotAnObject) => {
					tracing::debug!(
						day = %day,
						participant = %truncate_id(participant_id),
						"Skipping non-object day payload"
					);
					entries_skipped += 1;
				},
				Err(e) => {
					tracing::warn!(
						day = %day,
						participant = %truncate_id(participant_id),
						error = %e,
						"Skipping malformed day payload"
					);
					entries_skipped += 1;
				},
			}
		}
	}

	for (participant_id, plan_data) in participant_submissions {
		for day in plan_data.keys().filter(|day| !existing.contains_key(*day)) {
			tracing::debug!(
				day = %day,
				participant = %truncate_id(participant_id),
				"Ignoring day not present in plan"
			);
		}
	}

	MergedDetail {
		order_detail,
		entries_merged,
		entries_skipped,
	}
}
