//! Run lifecycle events.
//!
//! The runner reports progress through an [`EventSink`] supplied by the
//! caller. Event types are the constants in [`types`]; payloads are JSON
//! objects carrying at least the run id.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the runner.
pub mod types {
    /// A run passed validation and is about to start its first stage.
    pub const RUN_STARTED: &str = "run.started";
    /// A stage is about to call the generation capability.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A transient failure is being retried.
    pub const STAGE_RETRYING: &str = "stage.retrying";
    /// A stage produced a valid payload.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A run produced a report.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// A run ended with a terminal error.
    pub const RUN_FAILED: &str = "run.failed";
}
