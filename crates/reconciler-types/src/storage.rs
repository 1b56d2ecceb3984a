//! Storage-related types for the reconciler.

use std::str::FromStr;

/// Storage keys for persisted collections.
///
/// Each key is the namespace prefix under which a collection's records are
/// stored, so backends can list one collection without scanning the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Member order submissions written by participants.
	MemberOrders,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::MemberOrders => "member_orders",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::MemberOrders].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"member_orders" => Ok(Self::MemberOrders),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
