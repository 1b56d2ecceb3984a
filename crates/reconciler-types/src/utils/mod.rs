//! Formatting helpers shared across reconciler crates.

pub mod formatting;

pub use formatting::truncate_id;
