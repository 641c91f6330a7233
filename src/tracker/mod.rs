//! Status tracking for single submissions.
//!
//! This module provides the polling state machine that follows one
//! analysis from submission to resolution.

pub mod policy;
pub mod status;

pub use policy::PollPolicy;
pub use status::{PollEvent, StatusTracker, TrackerState};
