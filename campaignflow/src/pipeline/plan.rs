//! Validated, immutable pipeline plan.
//!
//! A plan is built once from the stage table. Building checks shape and
//! acyclicity, computes a deterministic topological order grouped into
//! layers, and verifies that every template placeholder names a product
//! variable or a transitive upstream stage. No generation call can happen
//! for a plan that failed to build.

use crate::config::StageDefinition;
use crate::context::PRODUCT_VARIABLES;
use crate::errors::{
    CampaignError, ContractErrorInfo, CycleDetectedError, MissingVariableError,
    PipelineValidationError,
};
use crate::template;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A validated stage graph in execution order.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    stages: Vec<StageDefinition>,
    index: HashMap<String, usize>,
    layers: Vec<Vec<usize>>,
    upstream: Vec<BTreeSet<String>>,
    fingerprint: String,
}

impl PipelinePlan {
    /// Builds a plan from stages in declaration order.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty table, duplicate or reserved ids,
    ///   self-dependencies or unknown dependencies
    /// - `CyclicDependency` naming the cycle path
    /// - `MissingVariable` for a placeholder no upstream stage or product
    ///   field provides
    pub fn build(stages: &[StageDefinition]) -> Result<Self, CampaignError> {
        validate_shape(stages)?;
        detect_cycles(stages)?;

        let fingerprint = fingerprint(stages)?;
        let layers_by_decl = layer_stages(stages);

        let mut ordered = Vec::with_capacity(stages.len());
        let mut layers = Vec::with_capacity(layers_by_decl.len());
        for layer in layers_by_decl {
            let start = ordered.len();
            ordered.extend(layer.into_iter().map(|i| stages[i].clone()));
            layers.push((start..ordered.len()).collect());
        }

        let index: HashMap<String, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        let mut upstream: Vec<BTreeSet<String>> = Vec::with_capacity(ordered.len());
        for stage in &ordered {
            let mut set = BTreeSet::new();
            for dep in &stage.depends_on {
                set.insert(dep.clone());
                if let Some(&pos) = index.get(dep) {
                    set.extend(upstream[pos].iter().cloned());
                }
            }
            upstream.push(set);
        }

        let plan = Self {
            stages: ordered,
            index,
            layers,
            upstream,
            fingerprint,
        };
        plan.check_placeholders()?;
        Ok(plan)
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Returns the stage ids in execution order.
    #[must_use]
    pub fn execution_order(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }

    /// Returns the layers as indices into [`stages`](Self::stages).
    ///
    /// Every stage's dependencies live in earlier layers.
    #[must_use]
    pub fn layers(&self) -> &[Vec<usize>] {
        &self.layers
    }

    /// Looks up a stage by id.
    #[must_use]
    pub fn stage(&self, id: &str) -> Option<&StageDefinition> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    /// Returns a stage's position in execution order.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Returns every stage the given one depends on, directly or not.
    #[must_use]
    pub fn upstream_of(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.index.get(id).map(|&i| &self.upstream[i])
    }

    /// Returns every stage that depends on the given one, in execution order.
    #[must_use]
    pub fn downstream_of(&self, id: &str) -> Vec<&str> {
        self.stages
            .iter()
            .zip(&self.upstream)
            .filter(|(_, up)| up.contains(id))
            .map(|(s, _)| s.id.as_str())
            .collect()
    }

    /// Returns the SHA-256 fingerprint of the stage table.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false: empty plans are rejected at build time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn check_placeholders(&self) -> Result<(), MissingVariableError> {
        for (stage, upstream) in self.stages.iter().zip(&self.upstream) {
            for root in template::root_variables(&stage.description) {
                let known = PRODUCT_VARIABLES.contains(&root.as_str()) || upstream.contains(&root);
                if !known {
                    return Err(MissingVariableError::new(root).in_stage(&stage.id));
                }
            }
        }
        Ok(())
    }
}

fn validation_error(
    message: String,
    stages: Vec<String>,
    code: &str,
    summary: String,
    hint: &str,
) -> PipelineValidationError {
    PipelineValidationError::new(message)
        .with_stages(stages)
        .with_error_info(ContractErrorInfo::new(code, summary).with_fix_hint(hint))
}

fn validate_shape(stages: &[StageDefinition]) -> Result<(), PipelineValidationError> {
    if stages.is_empty() {
        return Err(validation_error(
            "Pipeline has no stages".to_string(),
            Vec::new(),
            "CAMPAIGN-001-EMPTY",
            "Cannot build an empty pipeline".to_string(),
            "Declare at least one stage in the task table.",
        ));
    }

    let mut seen = HashSet::new();
    for stage in stages {
        if PRODUCT_VARIABLES.contains(&stage.id.as_str()) {
            return Err(validation_error(
                format!("Stage id '{}' is reserved for product data", stage.id),
                vec![stage.id.clone()],
                "CAMPAIGN-001-RESERVED",
                format!("Stage id '{}' shadows a product variable", stage.id),
                "Rename the stage; product_id, product_key, product_name and product_description are reserved.",
            ));
        }
        if !seen.insert(stage.id.as_str()) {
            return Err(validation_error(
                format!("Stage '{}' is declared more than once", stage.id),
                vec![stage.id.clone()],
                "CAMPAIGN-001-DUPLICATE",
                format!("Duplicate stage id '{}'", stage.id),
                "Give every stage a unique id.",
            ));
        }
    }

    for stage in stages {
        for dep in &stage.depends_on {
            if dep == &stage.id {
                return Err(validation_error(
                    format!("Stage '{}' depends on itself", stage.id),
                    vec![stage.id.clone()],
                    "CAMPAIGN-001-SELF_DEP",
                    format!("Stage '{}' lists itself as a dependency", stage.id),
                    "Remove the stage from its own depends_on list.",
                ));
            }
            if !seen.contains(dep.as_str()) {
                return Err(validation_error(
                    format!("Stage '{}' depends on unknown stage '{}'", stage.id, dep),
                    vec![stage.id.clone(), dep.clone()],
                    "CAMPAIGN-001-MISSING_DEP",
                    format!("Dependency '{dep}' not found"),
                    "Declare the dependency in the task table or fix its id.",
                ));
            }
        }
    }
    Ok(())
}

fn detect_cycles(stages: &[StageDefinition]) -> Result<(), CycleDetectedError> {
    let deps: HashMap<&str, &[String]> = stages
        .iter()
        .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
        .collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for stage in stages {
        if !visited.contains(stage.id.as_str()) {
            if let Some(cycle) = dfs_cycle(&stage.id, &deps, &mut visited, &mut rec_stack, &mut path)
            {
                return Err(CycleDetectedError::new(cycle));
            }
        }
    }
    Ok(())
}

fn dfs_cycle<'a>(
    node: &'a str,
    deps: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for dep in deps.get(node).copied().unwrap_or_default() {
        let dep = dep.as_str();
        if !visited.contains(dep) {
            if let Some(cycle) = dfs_cycle(dep, deps, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(dep) {
            let start = path.iter().position(|n| *n == dep).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
            cycle.push(dep.to_string());
            return Some(cycle);
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

/// Groups an acyclic stage table into layers, declaration order within each.
fn layer_stages(stages: &[StageDefinition]) -> Vec<Vec<usize>> {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<usize> = (0..stages.len()).collect();
    let mut layers = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<usize>, Vec<usize>) = remaining
            .into_iter()
            .partition(|&i| stages[i].depends_on.iter().all(|d| placed.contains(d.as_str())));
        if ready.is_empty() {
            // Unreachable after cycle detection; keep the rest as one layer.
            layers.push(blocked);
            break;
        }
        placed.extend(ready.iter().map(|&i| stages[i].id.as_str()));
        layers.push(ready);
        remaining = blocked;
    }
    layers
}

fn fingerprint(stages: &[StageDefinition]) -> Result<String, CampaignError> {
    let canonical = serde_json::to_vec(stages)
        .map_err(|e| CampaignError::Internal(format!("cannot serialize stage table: {e}")))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}
