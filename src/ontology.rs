//! Ontology validation hook
//!
//! A validator decides whether a payload is acceptable for a resource type
//! (the node label). The coordinator calls it before any write, so an invalid
//! node is never stored, and the [`ValidationPolicy`] decides whether a
//! rejection is an error or a silent discard.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Side-effect-free schema check
pub trait OntologyValidator: Send + Sync {
    fn validate(&self, resource_type: &str, data: &Map<String, Value>) -> bool;
}

/// What to do with a node that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Return `Error::Validation`
    #[default]
    Reject,
    /// Skip the write and report it as not inserted
    Discard,
}

/// Validator requiring a set of keys per resource type
///
/// Unknown resource types fail validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequiredKeysValidator {
    required: BTreeMap<String, Vec<String>>,
}

impl RequiredKeysValidator {
    pub fn new(required: BTreeMap<String, Vec<String>>) -> Self {
        Self { required }
    }

    pub fn with_type(mut self, resource_type: impl Into<String>, keys: &[&str]) -> Self {
        self.required
            .insert(resource_type.into(), keys.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.required.keys().map(String::as_str)
    }
}

impl OntologyValidator for RequiredKeysValidator {
    fn validate(&self, resource_type: &str, data: &Map<String, Value>) -> bool {
        match self.required.get(resource_type) {
            Some(keys) => keys.iter().all(|k| data.get(k).is_some_and(|v| !v.is_null())),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_required_keys() {
        let validator = RequiredKeysValidator::default().with_type("person", &["name"]);

        assert!(validator.validate("person", &object(json!({"name": "Ada"}))));
        assert!(!validator.validate("person", &object(json!({"name": null}))));
        assert!(!validator.validate("person", &object(json!({"age": 3}))));
        assert!(!validator.validate("planet", &object(json!({"name": "Mars"}))));
        assert_eq!(validator.resource_types().collect::<Vec<_>>(), vec!["person"]);
    }
}
