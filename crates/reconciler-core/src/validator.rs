//! Eligibility checks for a plan group.
//!
//! A group may be merged only when its plan exists with a usable order detail,
//! still belongs to the group's order, and that order is in a state that
//! accepts member orders.

use crate::grouper::PlanGroup;
use crate::pipeline::GroupError;
use reconciler_listing::{ListingError, ListingService};
use reconciler_types::{OrderListing, OrderState, PlanListing, PlanMetadataError};
use thiserror::Error;

/// Reasons a group is skipped, leaving its submissions pending.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupAbort {
	#[error("Plan not found: {0}")]
	PlanNotFound(String),
	#[error("Plan has no order id")]
	MissingOrderId,
	#[error("Plan has no order detail")]
	MissingOrderDetail,
	#[error("Plan order detail is malformed: {0}")]
	MalformedOrderDetail(String),
	#[error("Submissions reference order {group_order_id} but the plan belongs to {plan_order_id}")]
	OrderMismatch {
		group_order_id: String,
		plan_order_id: String,
	},
	#[error("Order not found: {0}")]
	OrderNotFound(String),
}

impl From<PlanMetadataError> for GroupAbort {
	fn from(err: PlanMetadataError) -> Self {
		match err {
			PlanMetadataError::MissingOrderId => GroupAbort::MissingOrderId,
			PlanMetadataError::MissingOrderDetail => GroupAbort::MissingOrderDetail,
			PlanMetadataError::MalformedOrderDetail(reason) => {
				GroupAbort::MalformedOrderDetail(reason)
			},
		}
	}
}

/// Decision for a group that passed the plan checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
	/// The order accepts member orders; merge into this plan.
	Eligible(PlanListing),
	/// The order is in another state, or has none.
	Ineligible(Option<OrderState>),
}

/// Loads the group's plan and order and decides whether merging may proceed.
pub async fn validate_group(
	listings: &ListingService,
	group: &PlanGroup,
) -> Result<Eligibility, GroupError> {
	let plan_listing = listings
		.get_listing(&group.plan_id)
		.await
		.map_err(|e| lookup_error(e, || GroupAbort::PlanNotFound(group.plan_id.clone())))?;
	let plan = PlanListing::try_from(&plan_listing).map_err(GroupAbort::from)?;

	if plan.order_id != group.order_id {
		return Err(GroupAbort::OrderMismatch {
			group_order_id: group.order_id.clone(),
			plan_order_id: plan.order_id,
		}
		.into());
	}

	let order_listing = listings
		.get_listing(&plan.order_id)
		.await
		.map_err(|e| lookup_error(e, || GroupAbort::OrderNotFound(plan.order_id.clone())))?;
	let order = OrderListing::from(&order_listing);

	if order.accepts_member_orders() {
		Ok(Eligibility::Eligible(plan))
	} else {
		Ok(Eligibility::Ineligible(order.order_state))
	}
}

fn lookup_error(err: ListingError, not_found: impl FnOnce() -> GroupAbort) -> GroupError {
	match err {
		ListingError::NotFound(_) => GroupError::Aborted(not_found()),
		other => GroupError::Listing(other.to_string()),
	}
}
