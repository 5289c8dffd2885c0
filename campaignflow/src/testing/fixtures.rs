//! Test fixtures for campaign pipelines.

use crate::config::{AgentRole, CampaignConfig, GenerationSettings, ProductProfile, StageDefinition};
use crate::pipeline::retry::RetryConfig;

/// The product `{id: "x", name: "X", description: "d"}`.
#[must_use]
pub fn sample_product() -> ProductProfile {
    ProductProfile::new("x", "X", "d")
}

/// Settings with millisecond backoff so retry paths run quickly.
#[must_use]
pub fn fast_settings() -> GenerationSettings {
    GenerationSettings::default()
        .with_stage_timeout_secs(5)
        .with_retry(RetryConfig::default().with_base_delay_ms(1).with_max_delay_ms(4))
}

/// Three stages: `research` (critical), `strategy` (critical, after
/// research) and `qa` (advisory, after strategy).
#[must_use]
pub fn research_strategy_qa_stages() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new("research", "Research {product_name}: {product_description}")
            .with_agent("analyst"),
        StageDefinition::new("strategy", "Plan a campaign for {product_name} using {research}")
            .with_agent("analyst")
            .with_dependencies(["research"]),
        StageDefinition::new("qa", "Review the strategy {strategy}")
            .with_agent("reviewer")
            .with_dependencies(["strategy"])
            .advisory(),
    ]
}

/// A configuration holding the sample product and the three-stage pipeline.
#[must_use]
pub fn research_strategy_qa_config() -> CampaignConfig {
    CampaignConfig::new(
        vec![sample_product()],
        vec![
            AgentRole::new("analyst", "Marketing Analyst").with_instructions("Be precise."),
            AgentRole::new("reviewer", "QA Reviewer"),
        ],
        research_strategy_qa_stages(),
    )
    .with_settings(fast_settings())
}
