//! Resolved graphs
//!
//! The output of a converged expansion: declared objects, the final
//! binding and value tables, surviving state instances and the callbacks
//! to run after materialization.

use crate::blueprint::BlueprintRegistry;
use crate::callback::PostInstantiate;
use crate::error::BuildError;
use std::collections::BTreeMap;
use std::sync::Arc;
use void_core::{FieldSpec, Namespace, StateRegistry, Value};
use void_state::{merge_container, BindingTable, InstanceCache, StoreError, ValueKey, ValueStore};

/// An object declared by a blueprint
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDescriptor {
    pub name: Namespace,
    pub class: String,
    pub attrs: BTreeMap<String, Value>,
    /// Registered name of the declaring blueprint
    pub declared_by: String,
}

/// The fixed point of an expansion
#[derive(Debug)]
pub struct ResolvedGraph {
    pub(crate) root: Namespace,
    pub(crate) blueprint: String,
    pub(crate) namespace_class: String,
    pub(crate) registry: Arc<BlueprintRegistry>,
    pub(crate) objects: BTreeMap<Namespace, ObjectDescriptor>,
    pub(crate) bindings: BindingTable,
    pub(crate) values: ValueStore,
    pub(crate) instances: InstanceCache,
    pub(crate) expanded: BTreeMap<Namespace, String>,
    pub(crate) callbacks: Vec<PostInstantiate>,
    pub(crate) errors: Vec<BuildError>,
    pub(crate) passes: usize,
}

impl ResolvedGraph {
    /// Namespace the entry point was expanded at
    pub fn root(&self) -> &Namespace {
        &self.root
    }

    /// Name of the entry-point blueprint
    pub fn blueprint(&self) -> &str {
        &self.blueprint
    }

    /// Class used for synthesized namespace nodes
    pub fn namespace_class(&self) -> &str {
        &self.namespace_class
    }

    /// Declared objects ordered by name (parents before children)
    pub fn objects(&self) -> &BTreeMap<Namespace, ObjectDescriptor> {
        &self.objects
    }

    /// Get a declared object
    pub fn object(&self, name: &Namespace) -> Option<&ObjectDescriptor> {
        self.objects.get(name)
    }

    /// Final binding table
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Final value store
    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    /// State instances that survived the final pass
    pub fn instances(&self) -> &InstanceCache {
        &self.instances
    }

    /// Blueprint expanded at each namespace
    pub fn expanded(&self) -> &BTreeMap<Namespace, String> {
        &self.expanded
    }

    /// Blueprint expanded exactly at `namespace`
    pub fn blueprint_at(&self, namespace: &Namespace) -> Option<&str> {
        self.expanded.get(namespace).map(String::as_str)
    }

    /// Post-instantiate callbacks in registration order
    pub fn callbacks(&self) -> &[PostInstantiate] {
        &self.callbacks
    }

    /// Errors accumulated in the final pass
    pub fn errors(&self) -> &[BuildError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Passes run until the fixed point
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Current value of a field, with redirects followed and containers merged
    pub fn value(&self, key: &ValueKey) -> Option<Value> {
        let spec = field_spec(self.registry.states(), key)?;
        read_value(&self.values, key, spec).ok()
    }

    /// Current value of a field of the record visible at `namespace`
    pub fn state_value(&self, namespace: &Namespace, state_type: &str, field: &str) -> Option<Value> {
        let (_, binding) = self.bindings.lookup(namespace, state_type)?;
        self.value(&binding.target.field(field))
    }
}

/// Field spec addressed by a value key, walking nested record fields
pub(crate) fn field_spec<'a>(states: &'a StateRegistry, key: &ValueKey) -> Option<&'a FieldSpec> {
    let mut ty = states.get(&key.state.state_type)?;
    for part in &key.sub {
        ty = states.get(ty.field_spec(part)?.nested_type()?)?;
    }
    ty.field_spec(&key.field)
}

/// Read a field: follow redirects, fall back to the default, merge contributions
pub(crate) fn read_value(store: &ValueStore, key: &ValueKey, spec: &FieldSpec) -> Result<Value, StoreError> {
    let target = store.resolve_key(key)?;
    let base = match store.resolve(&target)? {
        Some(value) => value.clone(),
        None => spec.default_value(),
    };
    Ok(match spec.container() {
        Some(kind) => merge_container(kind, base, store.contributions(&target)),
        None => base,
    })
}
