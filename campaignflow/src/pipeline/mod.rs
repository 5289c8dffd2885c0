//! Pipeline planning and execution.
//!
//! This module provides:
//! - Plan validation and dependency layering
//! - The campaign runner
//! - Retry policy for transient generation failures

mod plan;
pub mod retry;
mod runner;


pub use plan::PipelinePlan;
pub use retry::{
    BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState, should_retry,
};
pub use runner::CampaignRunner;
