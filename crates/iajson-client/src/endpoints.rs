//! Operation index built once from a validated manifest.
//!
//! Tiers are walked in `public, protected, user_required` order. When a name
//! appears in more than one tier the first occurrence wins and later ones
//! are dropped with a warning.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::error::ValidationError;
use crate::manifest::{AccessTier, EndpointSpec, Manifest, ParameterSpec};
use crate::transport::HttpMethod;

/// A callable operation resolved to its tier.
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    pub method: HttpMethod,
    pub path_template: String,
    pub tier: AccessTier,
    pub parameters: BTreeMap<String, ParameterSpec>,
    pub body: BTreeMap<String, ParameterSpec>,
    pub required_scopes: Vec<String>,
    pub description: String,
    pub rate_limit: Option<String>,
    pub deprecated: bool,
}

impl Operation {
    fn from_spec(name: &str, spec: &EndpointSpec, tier: AccessTier) -> Self {
        Self {
            name: name.to_string(),
            method: spec.method,
            path_template: spec.path.clone(),
            tier,
            parameters: spec.parameters.clone(),
            body: spec.body.clone(),
            required_scopes: spec.scopes.clone(),
            description: spec.description.clone(),
            rate_limit: spec.rate_limit.clone(),
            deprecated: spec.deprecated,
        }
    }

    /// Placeholder names in the path template, in order of appearance.
    pub fn path_placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.path_template.as_str();
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    names.push(&after[..close]);
                    rest = &after[close + 1..];
                }
                None => break,
            }
        }
        names
    }
}

/// Operation lookup by name. Read-only after [`EndpointIndex::build`].
#[derive(Debug, Clone, Default)]
pub struct EndpointIndex {
    operations: HashMap<String, Operation>,
    /// Insertion order: tier order, then name order within a tier.
    order: Vec<String>,
}

impl EndpointIndex {
    pub fn build(manifest: &Manifest) -> Self {
        let mut operations: HashMap<String, Operation> = HashMap::new();
        let mut order = Vec::new();

        for tier in AccessTier::ALL {
            for (name, spec) in manifest.api.group(tier) {
                if let Some(existing) = operations.get(name) {
                    warn!(
                        operation = %name,
                        kept_tier = %existing.tier,
                        dropped_tier = %tier,
                        "operation declared in more than one tier; keeping first"
                    );
                    continue;
                }
                operations.insert(name.clone(), Operation::from_spec(name, spec, tier));
                order.push(name.clone());
            }
        }

        Self { operations, order }
    }

    pub fn resolve(&self, name: &str) -> Result<&Operation, ValidationError> {
        self.operations
            .get(name)
            .ok_or_else(|| ValidationError::UnknownOperation {
                name: name.to_string(),
                available: self.order.clone(),
            })
    }

    /// Operations, optionally restricted to one tier.
    pub fn list(&self, tier: Option<AccessTier>) -> Vec<&Operation> {
        self.order
            .iter()
            .filter_map(|name| self.operations.get(name))
            .filter(|op| tier.map_or(true, |t| op.tier == t))
            .collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
