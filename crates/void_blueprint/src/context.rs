//! The builder handle passed to blueprint bodies
//!
//! Everything a blueprint does goes through its `BlueprintContext`:
//! declaring objects, queueing sub-expansions, publishing and reading
//! state, and registering callbacks. Reads see the tables proposed by the
//! previous pass; writes go to the tables of the current pass.
//!
//! Graph operations (objects, sub-expansions, callbacks) record their
//! errors and carry on. State operations return their errors so the body
//! can decide; an error propagated out of the body with `?` is recorded by
//! the builder.

use crate::blueprint::{Args, BlueprintRegistry};
use crate::builder::PassState;
use crate::callback::{CallbackArgs, CallbackContext, PostInstantiate};
use crate::error::BuildError;
use crate::graph::{read_value, ObjectDescriptor};
use crate::host::HostError;
use crate::params::Preset;
use crate::task::Task;
use std::collections::BTreeSet;
use std::sync::Arc;
use void_core::{ContainerKind, Namespace, StateKind, StateType, Value};
use void_state::{
    Assignment, Binding, Lookup, StateKey, StateRef, StoreError, ValueKey,
};

/// Options for `read_state`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadFlags {
    /// Fall back to a private default record when nothing is published
    pub allow_private: bool,
}

impl ReadFlags {
    /// Allow a private default record
    pub fn private_default() -> Self {
        Self { allow_private: true }
    }
}

/// Builder handle for one blueprint invocation
pub struct BlueprintContext<'a> {
    state: &'a mut PassState,
    registry: &'a BlueprintRegistry,
    namespace: Namespace,
    blueprint: String,
    args: &'a Args,
}

impl<'a> BlueprintContext<'a> {
    pub(crate) fn new(state: &'a mut PassState, registry: &'a BlueprintRegistry, task: &'a Task) -> Self {
        Self {
            state,
            registry,
            namespace: task.namespace.clone(),
            blueprint: task.blueprint.name().to_string(),
            args: &task.args,
        }
    }

    /// Namespace this blueprint was expanded at
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Registered name of the running blueprint
    pub fn blueprint_name(&self) -> &str {
        &self.blueprint
    }

    /// Arguments given by the parent
    pub fn args(&self) -> &Args {
        self.args
    }

    /// A single argument
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Current pass number, starting at 1
    pub fn pass(&self) -> usize {
        self.state.pass
    }

    // Graph operations

    /// Declare an object
    pub fn add_object<K, V>(
        &mut self,
        name: impl Into<Namespace>,
        class: &str,
        attrs: impl IntoIterator<Item = (K, V)>,
    ) where
        K: Into<String>,
        V: Into<Value>,
    {
        let name = name.into();
        if let Err(e) = self.check_within("declare", &name) {
            self.record(e);
            return;
        }
        if let Some(existing) = self.state.objects.get(&name) {
            let error = BuildError::DuplicateObject {
                name,
                first: existing.declared_by.clone(),
                second: self.blueprint.clone(),
            };
            self.record(error);
            return;
        }

        let descriptor = ObjectDescriptor {
            name: name.clone(),
            class: class.to_string(),
            attrs: attrs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            declared_by: self.blueprint.clone(),
        };
        self.state.objects.insert(name, descriptor);
    }

    /// Merge attributes into an object declared earlier in this pass
    pub fn set_attributes<K, V>(&mut self, name: &Namespace, attrs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        if let Err(e) = self.check_within("set attributes of", name) {
            self.record(e);
            return;
        }
        match self.state.objects.get_mut(name) {
            Some(object) => object
                .attrs
                .extend(attrs.into_iter().map(|(k, v)| (k.into(), v.into()))),
            None => self.record(BuildError::UnknownObject(name.clone())),
        }
    }

    /// Queue another blueprint below this one
    pub fn add_subexpansion(&mut self, namespace: impl Into<Namespace>, blueprint: &str, args: Args) {
        let namespace = namespace.into();
        if let Err(e) = self.check_within("expand", &namespace) {
            self.record(e);
            return;
        }
        match self.registry.get(blueprint) {
            Some(found) => self.state.queue.push(Task {
                namespace,
                blueprint: Arc::clone(found),
                args,
            }),
            None => self.record(BuildError::UnknownBlueprint(blueprint.to_string())),
        }
    }

    /// Register a callback to run after materialization
    ///
    /// Reference values in `kwargs` are resolved to realized objects
    /// before the callback runs.
    pub fn register_post_instantiate<F>(&mut self, namespace: impl Into<Namespace>, callback: F, kwargs: Args)
    where
        F: Fn(&mut CallbackContext<'_>, &Namespace, &CallbackArgs) -> Result<(), HostError>
            + Send
            + Sync
            + 'static,
    {
        let namespace = namespace.into();
        if let Err(e) = self.check_within("register a callback at", &namespace) {
            self.record(e);
            return;
        }
        self.state.callbacks.push(PostInstantiate {
            namespace,
            callback: Arc::new(callback),
            kwargs,
            registered_by: self.blueprint.clone(),
        });
    }

    /// Record a blueprint-specific error without aborting the body
    pub fn report_error(&mut self, message: impl Into<String>) {
        let error = BuildError::Blueprint {
            namespace: self.namespace.clone(),
            blueprint: self.blueprint.clone(),
            message: message.into(),
        };
        self.record(error);
    }

    /// Add presets; they are seeded from the next pass on
    pub fn add_presets(&mut self, presets: impl IntoIterator<Item = Preset>) {
        self.state.pending_presets.extend(presets);
    }

    // State operations

    /// Publish a record of `state_type` at `namespace`
    ///
    /// The returned handle is writable, including for config records.
    pub fn expose_state(&mut self, namespace: &Namespace, state_type: &str) -> Result<StateRef, BuildError> {
        let ty = self.state_type(state_type)?;
        self.check_within("expose state at", namespace)?;

        let key = StateKey::new(namespace.clone(), state_type);
        self.state.bindings.publish(
            key.clone(),
            Binding {
                target: key.clone(),
                exposed_by: self.blueprint.clone(),
            },
        );
        self.state.instances.touch(&key, &ty, self.registry.states());
        self.state.instances.mark_exposed(&key, &self.blueprint);
        Ok(StateRef::new(key, ty, true))
    }

    /// Find the nearest record of `state_type` published at `namespace` or above
    pub fn read_state(
        &mut self,
        namespace: &Namespace,
        state_type: &str,
        flags: ReadFlags,
    ) -> Result<StateRef, BuildError> {
        let ty = self.state_type(state_type)?;
        let found = self
            .state
            .active_bindings
            .lookup(namespace, state_type)
            .map(|(_, binding)| binding.target.clone());

        let handle = match found {
            Some(target) => {
                self.state.instances.touch(&target, &ty, self.registry.states());
                if ty.kind() == StateKind::Binding && self.state.instances.record_read(&target) > 1 {
                    return Err(BuildError::BindingReread { key: target });
                }
                StateRef::new(target, ty, true)
            }
            None if flags.allow_private => {
                let key = StateKey::new(namespace.clone(), state_type);
                self.state.instances.touch(&key, &ty, self.registry.states());
                self.state.instances.mark_private(&key);
                StateRef::new(key, ty, true)
            }
            None => {
                return Err(BuildError::StateNotFound {
                    namespace: namespace.clone(),
                    state_type: state_type.to_string(),
                })
            }
        };

        Ok(match handle.kind() {
            StateKind::Config => handle.read_only(),
            _ => handle,
        })
    }

    /// Handle to a nested record field
    pub fn nested(&self, state: &StateRef, field: &str) -> Result<StateRef, BuildError> {
        Ok(self.state.instances.nested(state, field)?)
    }

    /// Read a field as of the previous pass
    pub fn get(&self, state: &StateRef, field: &str) -> Result<Value, BuildError> {
        let (key, spec) = state.field(field)?;
        Ok(read_value(&self.state.active_values, &key, spec)?)
    }

    /// Write a field at `Normal` priority
    pub fn set(&mut self, state: &StateRef, field: &str, value: impl Into<Value>) -> Result<(), BuildError> {
        self.set_with(state, field, Assignment::new(value))
    }

    /// Write a field with an explicit assignment
    pub fn set_with(&mut self, state: &StateRef, field: &str, assignment: Assignment) -> Result<(), BuildError> {
        let (key, spec) = state.field(field)?;
        if spec.nested_type().is_some() {
            return Err(wrong_kind(state, field, "scalar or container"));
        }
        self.check_writable(state, &key)?;
        let target = if assignment.is_alias() {
            key
        } else {
            self.write_target(&key)?
        };
        self.state.values.set(target, assignment, &self.blueprint);
        Ok(())
    }

    /// Contribute elements to a list or set field
    pub fn append(&mut self, state: &StateRef, field: &str, value: impl Into<Value>) -> Result<(), BuildError> {
        self.contribute(state, field, &[ContainerKind::List, ContainerKind::Set], "list or set", value.into())
    }

    /// Contribute elements to a set field
    pub fn add_to_set(&mut self, state: &StateRef, field: &str, value: impl Into<Value>) -> Result<(), BuildError> {
        self.contribute(state, field, &[ContainerKind::Set], "set", value.into())
    }

    /// Contribute an entry to a dict field
    pub fn insert(
        &mut self,
        state: &StateRef,
        field: &str,
        entry: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), BuildError> {
        let contribution = Value::Map([(entry.into(), value.into())].into_iter().collect());
        self.contribute(state, field, &[ContainerKind::Dict], "dict", contribution)
    }

    /// Redirect one field to another
    pub fn alias_field(
        &mut self,
        state: &StateRef,
        field: &str,
        target: &StateRef,
        target_field: &str,
    ) -> Result<(), BuildError> {
        let (from, _) = state.field(field)?;
        let (to, _) = target.field(target_field)?;
        self.check_writable(state, &from)?;
        self.state.values.set(from, Assignment::alias(to), &self.blueprint);
        Ok(())
    }

    /// Publish `target` again at `namespace`
    ///
    /// Every field of the new record, nested records included, redirects
    /// to the matching field of `target`.
    pub fn alias_state(&mut self, namespace: &Namespace, target: &StateRef) -> Result<StateRef, BuildError> {
        let alias = self.expose_state(namespace, target.state_type().name())?;
        self.alias_fields(&alias, target)?;
        Ok(alias)
    }

    fn alias_fields(&mut self, alias: &StateRef, target: &StateRef) -> Result<(), BuildError> {
        let ty = Arc::clone(alias.state_type());
        for field in ty.fields() {
            if field.nested_type().is_some() {
                let nested_alias = self.nested(alias, &field.name)?;
                let nested_target = self.nested(target, &field.name)?;
                self.alias_fields(&nested_alias, &nested_target)?;
            } else {
                self.alias_field(alias, &field.name, target, &field.name)?;
            }
        }
        Ok(())
    }

    // Internals

    fn record(&mut self, error: BuildError) {
        log::debug!("{} (pass {})", error, self.state.pass);
        self.state.errors.push(error);
    }

    fn state_type(&self, name: &str) -> Result<Arc<StateType>, BuildError> {
        self.registry
            .states()
            .get(name)
            .cloned()
            .ok_or_else(|| BuildError::UnknownStateType(name.to_string()))
    }

    fn check_within(&self, operation: &'static str, target: &Namespace) -> Result<(), BuildError> {
        if target.is_within(&self.namespace) {
            return Ok(());
        }
        Err(BuildError::OutsideSubtree {
            blueprint: self.blueprint.clone(),
            namespace: self.namespace.clone(),
            operation,
            target: target.clone(),
        })
    }

    fn check_writable(&self, state: &StateRef, key: &ValueKey) -> Result<(), BuildError> {
        if state.is_writable() {
            return Ok(());
        }
        Err(BuildError::ReadOnly {
            key: key.clone(),
            blueprint: self.blueprint.clone(),
        })
    }

    fn contribute(
        &mut self,
        state: &StateRef,
        field: &str,
        accepted: &[ContainerKind],
        expected: &'static str,
        value: Value,
    ) -> Result<(), BuildError> {
        let (key, spec) = state.field(field)?;
        if !spec.container().is_some_and(|kind| accepted.contains(&kind)) {
            return Err(wrong_kind(state, field, expected));
        }
        self.check_writable(state, &key)?;
        let target = self.write_target(&key)?;
        self.state.values.contribute(target, value, &self.blueprint);
        Ok(())
    }

    /// Field that finally receives a write to `key`
    ///
    /// Redirects written in this pass take precedence over those of the
    /// previous pass.
    fn write_target(&self, key: &ValueKey) -> Result<ValueKey, StoreError> {
        let mut visited = BTreeSet::new();
        let mut current = key.clone();
        loop {
            if !visited.insert(current.clone()) {
                return Err(StoreError::AliasCycle {
                    key: key.to_string(),
                    chain: visited.iter().map(ToString::to_string).collect(),
                });
            }
            let next = match self.state.values.get(&current) {
                Lookup::Redirect(target) => Some(target.clone()),
                Lookup::Value(_) => None,
                Lookup::Unset => match self.state.active_values.get(&current) {
                    Lookup::Redirect(target) => Some(target.clone()),
                    _ => None,
                },
            };
            match next {
                Some(target) => current = target,
                None => return Ok(current),
            }
        }
    }
}

fn wrong_kind(state: &StateRef, field: &str, expected: &'static str) -> BuildError {
    BuildError::Store(StoreError::WrongFieldKind {
        state_type: state.state_type().name().to_string(),
        field: field.to_string(),
        expected,
    })
}
