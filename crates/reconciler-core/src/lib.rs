//! Reconciliation engine for member order submissions.
//!
//! A batch fetches every pending submission, groups them by plan and order,
//! and runs one pipeline per group: validate the plan and its parent order,
//! merge the participants' day entries into the plan's order detail, persist
//! the detail, and finalize the submissions. Groups run concurrently and fail
//! independently; the batch returns a [`RunReport`].

pub mod builder;
pub mod engine;
pub mod grouper;
pub mod merger;
pub mod pipeline;
pub mod report;
pub mod state;
pub mod validator;

pub use builder::{BuilderError, ReconcilerBuilder, ReconcilerFactories};
pub use engine::{EngineError, ReconcilerEngine};
pub use grouper::{group_submissions, PlanGroup};
pub use report::{GroupOutcome, GroupReport, PipelineStage, RunReport};
pub use state::{SubmissionStateError, SubmissionStateMachine};

#[cfg(test)]
pub(crate) mod test_support;
