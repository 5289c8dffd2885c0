//! Testing utilities for campaign pipelines.
//!
//! This module provides:
//! - `ScriptedProvider`, a deterministic generation provider with a call log
//! - Fixtures for the sample product and a three-stage pipeline

mod fixtures;
mod mocks;

pub use fixtures::{
    fast_settings, research_strategy_qa_config, research_strategy_qa_stages, sample_product,
};
pub use mocks::ScriptedProvider;
