//! Common types for the member-order reconciler.
//!
//! This crate defines the domain records shared by every reconciler component:
//! member order submissions, plan and order listings, storage keys, and the
//! configuration validation framework used by pluggable backends.

/// Listing types for plans and their parent orders.
pub mod listing;
/// Registry trait for self-registering backend implementations.
pub mod registry;
/// Secret string wrapper for credentials held in configuration.
pub mod secret_string;
/// Storage keys for persisted collections.
pub mod storage;
/// Member order submission types.
pub mod submission;
/// Formatting helpers for log output.
pub mod utils;
/// Configuration validation types for backend schemas.
pub mod validation;

pub use listing::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::*;
pub use submission::*;
pub use utils::truncate_id;
pub use validation::*;
