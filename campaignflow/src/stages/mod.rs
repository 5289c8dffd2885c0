//! Stage execution.
//!
//! A stage is one named generation step. The [`StageExecutor`] runs a single
//! stage against the generation provider and produces an immutable
//! [`StageResult`].

mod executor;
mod result;

pub use executor::{extract_json, parse_structured, validate, StageExecutor, CORRECTIVE_INSTRUCTION};
pub use result::{FailureKind, StageFailure, StageResult};
