//! Static campaign configuration.
//!
//! Four YAML tables are loaded once at process start:
//! - `products.yaml`: the product catalog
//! - `agents.yaml`: agent roles and instructions
//! - `tasks.yaml`: stage definitions
//! - `settings.yaml` (optional): generation settings
//!
//! The built-in tables are compiled into the crate and used by
//! [`CampaignConfig::builtin`].

mod settings;

pub use settings::GenerationSettings;

use crate::core::{FailurePolicy, OutputKind};
use crate::errors::{CampaignError, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const BUILTIN_PRODUCTS: &str = include_str!("../../config/products.yaml");
const BUILTIN_AGENTS: &str = include_str!("../../config/agents.yaml");
const BUILTIN_TASKS: &str = include_str!("../../config/tasks.yaml");
const BUILTIN_SETTINGS: &str = include_str!("../../config/settings.yaml");

/// A product a campaign can be generated for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductProfile {
    /// Catalog key, e.g. `hashicorp_vault`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
}

impl ProductProfile {
    /// Creates a new product profile.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// An agent role attached to stage requests as system instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRole {
    /// Role key referenced by stages.
    pub id: String,
    /// Short role title.
    pub role: String,
    /// What the agent is trying to achieve.
    #[serde(default)]
    pub goal: String,
    /// Free-text instructions.
    #[serde(default)]
    pub instructions: String,
    /// Optional model id overriding the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentRole {
    /// Creates a new agent role.
    #[must_use]
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            goal: String::new(),
            instructions: String::new(),
            model: None,
        }
    }

    /// Sets the instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Builds the system prompt sent with each request for this agent.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("Role: {}", self.role);
        if !self.goal.trim().is_empty() {
            prompt.push_str("\nGoal: ");
            prompt.push_str(self.goal.trim());
        }
        if !self.instructions.trim().is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(self.instructions.trim());
        }
        prompt
    }
}

/// One named stage of the campaign pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique stage id; its output is stored in the context under this key.
    pub id: String,
    /// The agent role that performs the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Prompt template with `{variable}` placeholders.
    pub description: String,
    /// Expected output kind.
    #[serde(default)]
    pub expected_output: OutputKind,
    /// Upstream stages, in declaration order.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// What a failure of this stage means for the run.
    #[serde(default)]
    pub policy: FailurePolicy,
    /// Per-call timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl StageDefinition {
    /// Creates a critical structured stage with no dependencies.
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent: None,
            description: description.into(),
            expected_output: OutputKind::Structured,
            depends_on: Vec::new(),
            policy: FailurePolicy::Critical,
            timeout_seconds: None,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the agent role.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Sets the output kind.
    #[must_use]
    pub fn with_output(mut self, kind: OutputKind) -> Self {
        self.expected_output = kind;
        self
    }

    /// Marks the stage advisory.
    #[must_use]
    pub fn advisory(mut self) -> Self {
        self.policy = FailurePolicy::Advisory;
        self
    }

    /// Sets a per-call timeout.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

#[derive(Debug, Deserialize)]
struct ProductTable {
    products: Vec<ProductProfile>,
}

#[derive(Debug, Deserialize)]
struct AgentTable {
    #[serde(default)]
    agents: Vec<AgentRole>,
}

#[derive(Debug, Deserialize)]
struct StageTable {
    stages: Vec<StageDefinition>,
}

/// The complete, read-only campaign configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Product catalog, in declaration order.
    pub products: Vec<ProductProfile>,
    /// Agent roles.
    pub agents: Vec<AgentRole>,
    /// Stage definitions, in declaration order.
    pub stages: Vec<StageDefinition>,
    /// Generation settings.
    #[serde(default)]
    pub settings: GenerationSettings,
}

impl CampaignConfig {
    /// Creates a configuration from in-memory tables.
    #[must_use]
    pub fn new(
        products: Vec<ProductProfile>,
        agents: Vec<AgentRole>,
        stages: Vec<StageDefinition>,
    ) -> Self {
        Self {
            products,
            agents,
            stages,
            settings: GenerationSettings::default(),
        }
    }

    /// Sets the generation settings.
    #[must_use]
    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Loads the tables compiled into the crate.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded tables fail to parse or validate.
    pub fn builtin() -> Result<Self, ConfigError> {
        let settings = parse_yaml::<GenerationSettings>("settings.yaml", BUILTIN_SETTINGS)?;
        Ok(Self::from_yaml_strs(BUILTIN_PRODUCTS, BUILTIN_AGENTS, BUILTIN_TASKS)?
            .with_settings(settings))
    }

    /// Parses the three tables from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if any table fails to parse or validate.
    pub fn from_yaml_strs(products: &str, agents: &str, tasks: &str) -> Result<Self, ConfigError> {
        let products = parse_yaml::<ProductTable>("products.yaml", products)?.products;
        let agents = parse_yaml::<AgentTable>("agents.yaml", agents)?.agents;
        let stages = parse_yaml::<StageTable>("tasks.yaml", tasks)?.stages;

        let config = Self::new(products, agents, stages);
        config.validate()?;
        Ok(config)
    }

    /// Loads `products.yaml`, `agents.yaml`, `tasks.yaml` and, when present,
    /// `settings.yaml` from a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a required file is missing or invalid.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        debug!(dir = %dir.display(), "Loading campaign configuration");

        let products = read_file(&dir.join("products.yaml"))?;
        let agents = read_file(&dir.join("agents.yaml"))?;
        let tasks = read_file(&dir.join("tasks.yaml"))?;

        let settings_path = dir.join("settings.yaml");
        let settings = if settings_path.exists() {
            parse_yaml::<GenerationSettings>("settings.yaml", &read_file(&settings_path)?)?
        } else {
            GenerationSettings::default()
        };

        Ok(Self::from_yaml_strs(&products, &agents, &tasks)?.with_settings(settings))
    }

    /// Checks table shape: non-empty unique ids and known agent references.
    ///
    /// Graph checks (unknown dependencies, cycles, placeholders) happen when
    /// the pipeline plan is built.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        unique_ids("product", self.products.iter().map(|p| p.id.as_str()))?;
        unique_ids("agent", self.agents.iter().map(|a| a.id.as_str()))?;
        unique_ids("stage", self.stages.iter().map(|s| s.id.as_str()))?;

        for stage in &self.stages {
            if stage.description.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "stage '{}' has an empty description",
                    stage.id
                )));
            }
            if let Some(agent) = &stage.agent {
                if self.agent(agent).is_none() {
                    return Err(ConfigError::UnknownAgent {
                        stage: stage.id.clone(),
                        agent: agent.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Looks up a product by catalog key.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProduct` listing the available keys.
    pub fn product(&self, key: &str) -> Result<&ProductProfile, CampaignError> {
        self.products
            .iter()
            .find(|p| p.id == key)
            .ok_or_else(|| CampaignError::UnknownProduct {
                key: key.to_string(),
                available: self.products.iter().map(|p| p.id.clone()).collect(),
            })
    }

    /// Looks up an agent role by id.
    #[must_use]
    pub fn agent(&self, id: &str) -> Option<&AgentRole> {
        self.agents.iter().find(|a| a.id == id)
    }
}

fn parse_yaml<T: serde::de::DeserializeOwned>(name: &str, text: &str) -> Result<T, ConfigError> {
    serde_yml::from_str(text).map_err(|source| ConfigError::Parse {
        name: name.to_string(),
        source,
    })
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{kind} with an empty id")));
        }
        if !seen.insert(id) {
            return Err(ConfigError::Invalid(format!("duplicate {kind} id '{id}'")));
        }
    }
    Ok(())
}
