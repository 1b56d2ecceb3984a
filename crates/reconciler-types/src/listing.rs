//! Listing types for plans and their parent orders.
//!
//! The listing service stores every entity as a [`Listing`] with free-form JSON
//! metadata. Plans and orders are typed views over that metadata, decoded with
//! [`PlanListing::try_from`] and [`OrderListing::from`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Metadata key holding a plan's parent order id.
pub const ORDER_ID_KEY: &str = "orderId";
/// Metadata key holding a plan's per-day order detail.
pub const ORDER_DETAIL_KEY: &str = "orderDetail";
/// Metadata key holding an order's lifecycle state.
pub const ORDER_STATE_KEY: &str = "orderState";

/// Top-level metadata keys to replace on a listing.
///
/// Each key in the patch replaces the stored value for that key wholesale;
/// keys absent from the patch are left untouched.
pub type MetadataPatch = Map<String, Value>;

/// A listing as returned by the listing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
	pub id: String,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

impl Listing {
	/// Creates a listing with the given metadata.
	pub fn new(id: impl Into<String>, metadata: Map<String, Value>) -> Self {
		Self {
			id: id.into(),
			metadata,
		}
	}

	/// Applies a metadata patch, replacing each patched key.
	pub fn apply_patch(&mut self, patch: MetadataPatch) {
		for (key, value) in patch {
			self.metadata.insert(key, value);
		}
	}
}

/// Lifecycle state of a parent order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderState {
	Canceled,
	CanceledByBooker,
	Picking,
	InProgress,
	PendingPayment,
	Completed,
	Reviewed,
	ExpiredStart,
	/// Any state this crate does not know about.
	#[serde(other)]
	Unknown,
}

impl OrderState {
	/// Whether pending member orders may still be merged into the order's plans.
	pub fn accepts_member_orders(&self) -> bool {
		matches!(self, OrderState::Picking | OrderState::InProgress)
	}
}

/// One day of a plan's order detail.
///
/// Only `memberOrders` is interpreted; every other field of the day is carried
/// through unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
	/// Participant id to that participant's items for the day.
	#[serde(default, deserialize_with = "null_as_empty")]
	pub member_orders: Map<String, Value>,
	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

/// A plan's order detail, keyed by day.
pub type OrderDetail = BTreeMap<String, DayRecord>;

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Errors that can occur while decoding plan metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanMetadataError {
	#[error("Plan has no order id")]
	MissingOrderId,
	#[error("Plan has no order detail")]
	MissingOrderDetail,
	#[error("Plan order detail is malformed: {0}")]
	MalformedOrderDetail(String),
}

/// Typed view of a plan listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanListing {
	pub id: String,
	pub order_id: String,
	pub order_detail: OrderDetail,
}

impl TryFrom<&Listing> for PlanListing {
	type Error = PlanMetadataError;

	fn try_from(listing: &Listing) -> Result<Self, Self::Error> {
		let order_id = listing
			.metadata
			.get(ORDER_ID_KEY)
			.and_then(Value::as_str)
			.filter(|id| !id.is_empty())
			.ok_or(PlanMetadataError::MissingOrderId)?;

		let raw_detail = listing
			.metadata
			.get(ORDER_DETAIL_KEY)
			.filter(|detail| detail.is_object())
			.ok_or(PlanMetadataError::MissingOrderDetail)?;

		let order_detail = OrderDetail::deserialize(raw_detail)
			.map_err(|e| PlanMetadataError::MalformedOrderDetail(e.to_string()))?;

		Ok(Self {
			id: listing.id.clone(),
			order_id: order_id.to_string(),
			order_detail,
		})
	}
}

/// Typed view of an order listing.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderListing {
	pub id: String,
	/// `None` when the listing carries no state at all.
	pub order_state: Option<OrderState>,
}

impl OrderListing {
	/// Whether the order still accepts member orders.
	///
	/// An order without a state does not.
	pub fn accepts_member_orders(&self) -> bool {
		self.order_state
			.is_some_and(|state| state.accepts_member_orders())
	}
}

impl From<&Listing> for OrderListing {
	fn from(listing: &Listing) -> Self {
		let order_state = listing
			.metadata
			.get(ORDER_STATE_KEY)
			.and_then(|state| OrderState::deserialize(state).ok());
		Self {
			id: listing.id.clone(),
			order_state,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn listing(id: &str, metadata: Value) -> Listing {
		match metadata {
			Value::Object(map) => Listing::new(id, map),
			_ => panic!("metadata must be an object"),
		}
	}

	#[test]
	fn test_plan_listing_decodes_detail() {
		let plan = listing(
			"plan-1",
			json!({
				"orderId": "order-1",
				"orderDetail": {
					"2024-01-01": {
						"restaurant": { "id": "r-1" },
						"memberOrders": { "A": { "item": "pho" } }
					},
					"2024-01-02": { "memberOrders": null },
					"2024-01-03": {}
				}
			}),
		);

		let plan = PlanListing::try_from(&plan).unwrap();
		assert_eq!(plan.order_id, "order-1");
		assert_eq!(plan.order_detail.len(), 3);
		let first = &plan.order_detail["2024-01-01"];
		assert_eq!(first.member_orders["A"], json!({ "item": "pho" }));
		assert_eq!(first.fields["restaurant"], json!({ "id": "r-1" }));
		assert!(plan.order_detail["2024-01-02"].member_orders.is_empty());
		assert!(plan.order_detail["2024-01-03"].member_orders.is_empty());
	}

	#[test]
	fn test_day_record_round_trip_keeps_other_fields() {
		let raw = json!({
			"restaurant": { "id": "r-1" },
			"memberOrders": { "A": { "item": "pho" } }
		});
		let record: DayRecord = serde_json::from_value(raw.clone()).unwrap();
		assert_eq!(serde_json::to_value(&record).unwrap(), raw);
	}

	#[test]
	fn test_plan_listing_metadata_errors() {
		let no_order = listing("p", json!({ "orderDetail": {} }));
		assert_eq!(
			PlanListing::try_from(&no_order),
			Err(PlanMetadataError::MissingOrderId)
		);

		let empty_order = listing("p", json!({ "orderId": "", "orderDetail": {} }));
		assert_eq!(
			PlanListing::try_from(&empty_order),
			Err(PlanMetadataError::MissingOrderId)
		);

		let no_detail = listing("p", json!({ "orderId": "o" }));
		assert_eq!(
			PlanListing::try_from(&no_detail),
			Err(PlanMetadataError::MissingOrderDetail)
		);

		let scalar_detail = listing("p", json!({ "orderId": "o", "orderDetail": "x" }));
		assert_eq!(
			PlanListing::try_from(&scalar_detail),
			Err(PlanMetadataError::MissingOrderDetail)
		);

		let bad_day = listing("p", json!({ "orderId": "o", "orderDetail": { "d": 3 } }));
		assert!(matches!(
			PlanListing::try_from(&bad_day),
			Err(PlanMetadataError::MalformedOrderDetail(_))
		));
	}

	#[test]
	fn test_order_state_eligibility() {
		let picking = listing("o", json!({ "orderState": "picking" }));
		assert!(OrderListing::from(&picking).accepts_member_orders());

		let in_progress = listing("o", json!({ "orderState": "inProgress" }));
		assert!(OrderListing::from(&in_progress).accepts_member_orders());

		let completed = listing("o", json!({ "orderState": "completed" }));
		let completed = OrderListing::from(&completed);
		assert_eq!(completed.order_state, Some(OrderState::Completed));
		assert!(!completed.accepts_member_orders());

		let unknown = listing("o", json!({ "orderState": "archived" }));
		assert_eq!(
			OrderListing::from(&unknown).order_state,
			Some(OrderState::Unknown)
		);

		let missing = listing("o", json!({}));
		assert_eq!(OrderListing::from(&missing).order_state, None);
		assert!(!OrderListing::from(&missing).accepts_member_orders());
	}

	#[test]
	fn test_apply_patch_replaces_whole_keys() {
		let mut plan = listing(
			"p",
			json!({ "orderId": "o", "orderDetail": { "d": { "memberOrders": { "A": 1 } } } }),
		);
		let mut patch = MetadataPatch::new();
		patch.insert(ORDER_DETAIL_KEY.to_string(), json!({ "d": { "memberOrders": {} } }));
		plan.apply_patch(patch);

		assert_eq!(plan.metadata["orderId"], "o");
		assert_eq!(plan.metadata["orderDetail"], json!({ "d": { "memberOrders": {} } }));
	}
}
