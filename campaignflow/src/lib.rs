//! # Campaignflow
//!
//! A pipeline executor for multi-stage marketing campaign generation.
//!
//! A campaign is a fixed table of stages (product research, audience research,
//! strategy, content, image prompts, QA, content revision, final report). Each
//! stage renders a prompt from the
//! product profile and earlier stage outputs, asks a generation provider for a
//! structured or document reply, and feeds the validated result forward.
//!
//! - **Static configuration**: YAML tables validated into an immutable plan
//!   before any run, with cycles and unresolvable placeholders rejected
//! - **Layered execution**: independent stages run concurrently, dependent
//!   stages never do
//! - **Failure policy**: critical stages abort the run, advisory stages
//!   degrade the report
//! - **Retry and cancellation**: bounded backoff for transient failures and
//!   cooperative cancellation with run-scoped cleanup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use campaignflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = CampaignConfig::builtin()?;
//! let provider = Arc::new(HttpGenerationProvider::new(config.settings.clone().from_env()?));
//! let runner = CampaignRunner::new(config, provider)?;
//!
//! let report = runner.run_product("hashicorp_vault").await?;
//! println!("{}", report.render_text());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod generation;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod template;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, CleanupRegistry};
    pub use crate::config::{
        AgentRole, CampaignConfig, GenerationSettings, ProductProfile, StageDefinition,
    };
    pub use crate::context::PipelineContext;
    pub use crate::core::{FailurePolicy, OutputKind, RunState, StagePayload, StageStatus};
    pub use crate::errors::{
        CampaignError, ConfigError, ContractErrorInfo, CycleDetectedError,
        MissingVariableError, PipelineValidationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    #[cfg(feature = "http")]
    pub use crate::generation::HttpGenerationProvider;
    pub use crate::generation::{
        GenerationError, GenerationProvider, GenerationRequest, GenerationResponse,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{CampaignRunner, PipelinePlan, RetryConfig};
    pub use crate::report::{CampaignReport, ReportStatus, ReportSummary};
    pub use crate::stages::{FailureKind, StageResult};
}
