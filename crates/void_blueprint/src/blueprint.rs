//! Blueprints and their registry

use crate::context::BlueprintContext;
use crate::error::BlueprintResult;
use crate::params::ParamDecl;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use void_core::{Namespace, StateRegistry, StateType, TypeRegistryError, Value};

/// Keyword arguments passed to a blueprint or callback
pub type Args = BTreeMap<String, Value>;

/// Blueprint body: declares objects and state under the given namespace
pub type BlueprintFn =
    dyn Fn(&mut BlueprintContext<'_>, &Namespace) -> BlueprintResult + Send + Sync;

/// A named, reusable generator of graph fragments
#[derive(Clone)]
pub struct Blueprint {
    name: String,
    params: Vec<ParamDecl>,
    body: Arc<BlueprintFn>,
}

impl Blueprint {
    /// Create a blueprint from a body
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut BlueprintContext<'_>, &Namespace) -> BlueprintResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// Declare a parameter
    pub fn with_param(mut self, param: impl Into<ParamDecl>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Registered name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters in declaration order
    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    pub(crate) fn run(&self, ctx: &mut BlueprintContext<'_>, namespace: &Namespace) -> BlueprintResult {
        (self.body)(ctx, namespace)
    }
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Blueprints and state types available to an expansion
#[derive(Debug, Default)]
pub struct BlueprintRegistry {
    blueprints: BTreeMap<String, Arc<Blueprint>>,
    states: StateRegistry,
}

impl BlueprintRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blueprint, replacing any previous one of the same name
    pub fn register(&mut self, blueprint: Blueprint) -> Option<Arc<Blueprint>> {
        let name = blueprint.name.clone();
        log::debug!("Registered blueprint '{}'", name);
        self.blueprints.insert(name, Arc::new(blueprint))
    }

    /// Register a state type
    pub fn register_state(&mut self, ty: StateType) -> Result<Arc<StateType>, TypeRegistryError> {
        self.states.register(ty)
    }

    /// Get a blueprint by name
    pub fn get(&self, name: &str) -> Option<&Arc<Blueprint>> {
        self.blueprints.get(name)
    }

    /// Check if a blueprint is registered
    pub fn contains(&self, name: &str) -> bool {
        self.blueprints.contains_key(name)
    }

    /// Registered state types
    pub fn states(&self) -> &StateRegistry {
        &self.states
    }

    /// Iterate over blueprint names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blueprints.keys().map(String::as_str)
    }

    /// Number of registered blueprints
    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_replace() {
        let mut registry = BlueprintRegistry::new();
        assert!(registry.register(Blueprint::new("cpu", |_, _| Ok(()))).is_none());
        assert!(registry.register(Blueprint::new("cpu", |_, _| Ok(()))).is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("cpu"));
        assert!(registry.get("gpu").is_none());
    }

    #[test]
    fn test_state_types_share_registry() {
        let mut registry = BlueprintRegistry::new();
        registry.register_state(StateType::config("Clock").field("freq", 100)).unwrap();
        assert!(registry.states().contains("Clock"));
        assert!(registry.register_state(StateType::config("Clock")).is_err());
    }
}
