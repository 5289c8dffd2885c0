//! Core domain model types.
//!
//! This module contains the small enums and payload type shared by the
//! executor, runner and report:
//! - Output kind, failure policy and stage status
//! - Run state machine
//! - Stage payloads

mod output;
mod status;

pub use output::StagePayload;
pub use status::{FailurePolicy, OutputKind, RunState, StageStatus};
