//! State instances and handles
//!
//! An instance is created the first time a record is exposed or read in a
//! pass and is cached by its `StateKey`. It carries bookkeeping only: who
//! exposed it, whether it was touched this pass, how often a binding was
//! read, and the layout of its nested records. Field values always live
//! in the value store.

use crate::error::StoreError;
use crate::key::{StateKey, ValueKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use void_core::{FieldSpec, StateKind, StateRegistry, StateType};

/// Handle to a state record (or a nested record inside one)
#[derive(Debug, Clone)]
pub struct StateRef {
    key: StateKey,
    sub: Vec<String>,
    ty: Arc<StateType>,
    writable: bool,
}

impl StateRef {
    /// Create a handle to a top-level record
    pub fn new(key: StateKey, ty: Arc<StateType>, writable: bool) -> Self {
        Self {
            key,
            sub: Vec::new(),
            ty,
            writable,
        }
    }

    /// The record this handle addresses
    pub fn key(&self) -> &StateKey {
        &self.key
    }

    /// Path of nested record fields below the record
    pub fn sub(&self) -> &[String] {
        &self.sub
    }

    /// State type at this level
    pub fn state_type(&self) -> &Arc<StateType> {
        &self.ty
    }

    /// Access discipline of the state type
    pub fn kind(&self) -> StateKind {
        self.ty.kind()
    }

    /// Whether writes through this handle are permitted
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// The same handle with write permission removed
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Resolve a field through the type's accessor table
    pub fn field(&self, field: &str) -> Result<(ValueKey, &FieldSpec), StoreError> {
        let spec = self
            .ty
            .field_spec(field)
            .ok_or_else(|| StoreError::UnknownField {
                state_type: self.ty.name().to_string(),
                field: field.to_string(),
            })?;
        Ok((ValueKey::new(self.key.clone(), self.sub.clone(), field), spec))
    }

    /// The same handle pointed at another record
    pub fn retarget(&self, key: StateKey) -> Self {
        Self {
            key,
            sub: self.sub.clone(),
            ty: Arc::clone(&self.ty),
            writable: self.writable,
        }
    }
}

impl PartialEq for StateRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.sub == other.sub
    }
}

/// Per-record bookkeeping
#[derive(Debug, Clone)]
pub struct StateInstance {
    ty: Arc<StateType>,
    exposed_by: Option<String>,
    private: bool,
    accessed: bool,
    reads: u32,
    nested: BTreeMap<Vec<String>, Arc<StateType>>,
}

impl StateInstance {
    fn new(ty: Arc<StateType>, registry: &StateRegistry) -> Self {
        let mut nested = BTreeMap::new();
        bind_nested(&ty, registry, &mut Vec::new(), &mut nested);
        Self {
            ty,
            exposed_by: None,
            private: false,
            accessed: false,
            reads: 0,
            nested,
        }
    }

    /// State type of the record
    pub fn state_type(&self) -> &Arc<StateType> {
        &self.ty
    }

    /// Registered name of the blueprint that exposed the record
    pub fn exposed_by(&self) -> Option<&str> {
        self.exposed_by.as_deref()
    }

    /// Whether the record is a private default that was never published
    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Whether the record was touched in the current pass
    pub fn is_accessed(&self) -> bool {
        self.accessed
    }

    /// Reads recorded in the current pass
    pub fn reads(&self) -> u32 {
        self.reads
    }

    /// Nested record layout, keyed by field path
    pub fn nested(&self) -> &BTreeMap<Vec<String>, Arc<StateType>> {
        &self.nested
    }
}

/// Nested record types are bound recursively when the owning record is
/// first materialized.
fn bind_nested(
    ty: &StateType,
    registry: &StateRegistry,
    path: &mut Vec<String>,
    out: &mut BTreeMap<Vec<String>, Arc<StateType>>,
) {
    for field in ty.fields() {
        let Some(nested) = field.nested_type().and_then(|name| registry.get(name)) else {
            continue;
        };
        path.push(field.name.clone());
        out.insert(path.clone(), Arc::clone(nested));
        bind_nested(nested, registry, path, out);
        path.pop();
    }
}

/// Instances alive across passes, pruned when a pass stops touching them
#[derive(Debug, Clone, Default)]
pub struct InstanceCache {
    instances: BTreeMap<StateKey, StateInstance>,
}

impl InstanceCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-pass access tracking
    pub fn begin_pass(&mut self) {
        for instance in self.instances.values_mut() {
            instance.accessed = false;
            instance.reads = 0;
        }
    }

    /// Get or create the instance for `key` and mark it accessed
    pub fn touch(
        &mut self,
        key: &StateKey,
        ty: &Arc<StateType>,
        registry: &StateRegistry,
    ) -> &mut StateInstance {
        let instance = self
            .instances
            .entry(key.clone())
            .or_insert_with(|| StateInstance::new(Arc::clone(ty), registry));
        instance.accessed = true;
        instance
    }

    /// Record who exposed a record
    pub fn mark_exposed(&mut self, key: &StateKey, blueprint: &str) {
        if let Some(instance) = self.instances.get_mut(key) {
            instance.exposed_by = Some(blueprint.to_string());
            instance.private = false;
        }
    }

    /// Record that a record is a private default
    pub fn mark_private(&mut self, key: &StateKey) {
        if let Some(instance) = self.instances.get_mut(key) {
            if instance.exposed_by.is_none() {
                instance.private = true;
            }
        }
    }

    /// Count a read of `key` in this pass, returning the new count
    pub fn record_read(&mut self, key: &StateKey) -> u32 {
        match self.instances.get_mut(key) {
            Some(instance) => {
                instance.reads += 1;
                instance.reads
            }
            None => 0,
        }
    }

    /// Handle to a nested record field of `parent`
    pub fn nested(&self, parent: &StateRef, field: &str) -> Result<StateRef, StoreError> {
        let spec = parent
            .ty
            .field_spec(field)
            .ok_or_else(|| StoreError::UnknownField {
                state_type: parent.ty.name().to_string(),
                field: field.to_string(),
            })?;
        let not_nested = || StoreError::NotNested {
            state_type: parent.ty.name().to_string(),
            field: field.to_string(),
        };
        if spec.nested_type().is_none() {
            return Err(not_nested());
        }

        let mut sub = parent.sub.clone();
        sub.push(field.to_string());
        let ty = self
            .instances
            .get(&parent.key)
            .and_then(|instance| instance.nested.get(&sub))
            .cloned()
            .ok_or_else(not_nested)?;

        Ok(StateRef {
            key: parent.key.clone(),
            sub,
            ty,
            writable: parent.writable,
        })
    }

    /// Drop every instance not touched in the current pass
    pub fn prune_unaccessed(&mut self) -> Vec<StateKey> {
        let stale: Vec<StateKey> = self
            .instances
            .iter()
            .filter(|(_, instance)| !instance.accessed)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.instances.remove(key);
        }
        if !stale.is_empty() {
            log::debug!("Pruned {} abandoned state instances", stale.len());
        }
        stale
    }

    /// Get an instance
    pub fn get(&self, key: &StateKey) -> Option<&StateInstance> {
        self.instances.get(key)
    }

    /// Check if an instance exists
    pub fn contains(&self, key: &StateKey) -> bool {
        self.instances.contains_key(key)
    }

    /// Iterate over all instances
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &StateInstance)> {
        self.instances.iter()
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
