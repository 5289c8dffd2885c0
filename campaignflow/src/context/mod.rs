//! Run-scoped variable context.
//!
//! A `PipelineContext` is seeded from the product profile and grows by one
//! entry per succeeded stage, keyed by stage id. It is owned by a single run
//! and dropped when the run ends.

use crate::config::ProductProfile;
use crate::errors::DataConflictError;
use std::collections::BTreeMap;

/// Context keys contributed by the product profile.
pub const PRODUCT_VARIABLES: [&str; 4] = [
    "product_id",
    "product_key",
    "product_name",
    "product_description",
];

/// Mapping from variable name to value for one pipeline run.
///
/// Writing to an existing key raises a `DataConflictError`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineContext {
    data: BTreeMap<String, serde_json::Value>,
}

impl PipelineContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with the product fields.
    #[must_use]
    pub fn for_product(product: &ProductProfile) -> Self {
        let mut data = BTreeMap::new();
        data.insert("product_id".to_string(), serde_json::json!(product.id));
        data.insert("product_key".to_string(), serde_json::json!(product.id));
        data.insert("product_name".to_string(), serde_json::json!(product.name));
        data.insert(
            "product_description".to_string(),
            serde_json::json!(product.description),
        );
        Self { data }
    }

    /// Gets a top-level value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Resolves a dotted path such as `strategy.channels.0`.
    ///
    /// The first segment names a context key; later segments index into
    /// objects by key and into arrays by position.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&serde_json::Value> {
        let mut segments = path.split('.');
        let mut current = self.data.get(segments.next()?)?;

        for segment in segments {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Sets a value in the context.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if the key already exists.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), DataConflictError> {
        let key = key.into();
        if self.data.contains_key(&key) {
            return Err(DataConflictError::new(key));
        }
        self.data.insert(key, value);
        Ok(())
    }

    /// Returns the keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl FromIterator<(String, serde_json::Value)> for PipelineContext {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product() -> ProductProfile {
        ProductProfile::new("x", "X", "d")
    }

    #[test]
    fn test_seeded_from_product() {
        let ctx = PipelineContext::for_product(&product());

        assert_eq!(ctx.len(), PRODUCT_VARIABLES.len());
        assert_eq!(ctx.get("product_name"), Some(&json!("X")));
        assert_eq!(ctx.get("product_key"), Some(&json!("x")));
        assert!(PRODUCT_VARIABLES.iter().all(|key| ctx.contains_key(key)));
    }

    #[test]
    fn test_set_rejects_conflict() {
        let mut ctx = PipelineContext::for_product(&product());

        ctx.set("research", json!({"summary": "ok"})).unwrap();
        let err = ctx.set("research", json!({})).unwrap_err();

        assert_eq!(err.key, "research");
    }

    #[test]
    fn test_lookup_paths() {
        let mut ctx = PipelineContext::new();
        ctx.set(
            "strategy",
            json!({"channels": ["email", "linkedin"], "budget": {"total": 10}}),
        )
        .unwrap();

        assert_eq!(ctx.lookup("strategy.budget.total"), Some(&json!(10)));
        assert_eq!(ctx.lookup("strategy.channels.1"), Some(&json!("linkedin")));
        assert_eq!(ctx.lookup("strategy.channels.9"), None);
        assert_eq!(ctx.lookup("strategy.missing"), None);
        assert_eq!(ctx.lookup("nothing"), None);
    }
}
