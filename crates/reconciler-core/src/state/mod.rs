//! State management for member order submissions.

mod submission;

pub use submission::{SubmissionStateError, SubmissionStateMachine};
