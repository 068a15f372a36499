//! Fixed-point expansion
//!
//! Expansion runs the entry-point blueprint repeatedly. Each pass starts
//! from empty proposed tables, reads through the tables the previous pass
//! proposed, and drains the task queue breadth-first. When a pass proposes
//! exactly the bindings and values it read, the graph is resolved.
//!
//! Per-pass ephemera (objects, queue, errors, callbacks, read counts,
//! the write sequence) are rebuilt every pass; only the proposed tables,
//! the state instance cache and accumulated presets carry over.

use crate::active::ActiveGuard;
use crate::blueprint::{Args, Blueprint, BlueprintRegistry};
use crate::callback::PostInstantiate;
use crate::config::ExpandConfig;
use crate::context::BlueprintContext;
use crate::error::{BlueprintError, BuildError, ExpandError, ParamError};
use crate::graph::{field_spec, ObjectDescriptor, ResolvedGraph};
use crate::params::{flat_parameters, FlatParam, Preset};
use crate::task::{Task, TaskQueue};
use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::Arc;
use void_core::{Namespace, StateRegistry};
use void_state::{BindingTable, InstanceCache, Lookup, StoreError, ValueStore};

/// Tables and ephemera of the pass in progress
#[derive(Debug, Default)]
pub(crate) struct PassState {
    pub(crate) pass: usize,
    pub(crate) active_values: ValueStore,
    pub(crate) active_bindings: BindingTable,
    pub(crate) values: ValueStore,
    pub(crate) bindings: BindingTable,
    pub(crate) instances: InstanceCache,
    pub(crate) objects: BTreeMap<Namespace, ObjectDescriptor>,
    pub(crate) queue: TaskQueue,
    pub(crate) errors: Vec<BuildError>,
    pub(crate) expanded: BTreeMap<Namespace, String>,
    pub(crate) callbacks: Vec<PostInstantiate>,
    pub(crate) presets: Vec<Preset>,
    pub(crate) pending_presets: Vec<Preset>,
}

impl PassState {
    fn new(presets: Vec<Preset>) -> Self {
        Self {
            presets,
            ..Default::default()
        }
    }

    /// Promote the proposed tables to active and reset the ephemera
    fn begin_pass(&mut self, pass: usize) {
        self.pass = pass;
        self.active_values = mem::take(&mut self.values);
        self.active_bindings = mem::take(&mut self.bindings);
        for preset in &self.presets {
            self.values.seed_preset(preset.key.clone(), preset.value.clone());
        }
        self.instances.begin_pass();
        self.objects.clear();
        self.queue.reset();
        self.errors.clear();
        self.expanded.clear();
        self.callbacks.clear();
    }

    /// Collect conflicts and alias cycles, prune instances, fold in new presets
    ///
    /// Returns whether the preset set changed.
    fn finish_pass(&mut self) -> bool {
        for conflict in self.values.conflicts() {
            self.errors.push(BuildError::Conflict(conflict));
        }

        let mut cycles = BTreeSet::new();
        for key in self.values.keys() {
            if !matches!(self.values.get(key), Lookup::Redirect(_)) {
                continue;
            }
            if let Err(StoreError::AliasCycle { key, chain }) = self.values.resolve_key(key) {
                if cycles.insert(chain.clone()) {
                    self.errors.push(BuildError::Store(StoreError::AliasCycle { key, chain }));
                }
            }
        }

        self.instances.prune_unaccessed();

        let mut changed = false;
        for preset in mem::take(&mut self.pending_presets) {
            match self.presets.iter_mut().find(|p| p.key == preset.key) {
                Some(existing) if existing.value == preset.value => {}
                Some(existing) => {
                    existing.value = preset.value;
                    changed = true;
                }
                None => {
                    self.presets.push(preset);
                    changed = true;
                }
            }
        }
        changed
    }

    fn is_stable(&self) -> bool {
        self.values == self.active_values && self.bindings == self.active_bindings
    }
}

/// Expands blueprints against a registry
pub struct Builder {
    registry: Arc<BlueprintRegistry>,
    config: ExpandConfig,
}

impl Builder {
    /// Create a builder with the default configuration
    pub fn new(registry: Arc<BlueprintRegistry>) -> Self {
        Self {
            registry,
            config: ExpandConfig::default(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ExpandConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExpandConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BlueprintRegistry> {
        &self.registry
    }

    /// Flattened parameter catalog of `blueprint`, named with the
    /// configured separator
    pub fn parameters(&self, blueprint: &str) -> Result<Vec<FlatParam>, ParamError> {
        flat_parameters(&self.registry, blueprint, &self.config.param_separator)
    }

    /// Expand `blueprint` at `root` until the tables stop changing
    pub fn expand(
        &self,
        root: Namespace,
        blueprint: &str,
        presets: Vec<Preset>,
    ) -> Result<ResolvedGraph, ExpandError> {
        let entry = self
            .registry
            .get(blueprint)
            .cloned()
            .ok_or_else(|| ExpandError::UnknownBlueprint(blueprint.to_string()))?;
        for preset in &presets {
            validate_preset(self.registry.states(), preset)?;
        }

        let active = ActiveGuard::begin(root.clone(), blueprint);
        let mut state = PassState::new(presets);

        for pass in 1..=self.config.max_iterations {
            active.set_pass(pass);
            state.begin_pass(pass);
            state.queue.push(Task {
                namespace: root.clone(),
                blueprint: Arc::clone(&entry),
                args: Args::new(),
            });
            self.drain(&mut state);
            let presets_changed = state.finish_pass();

            log::debug!(
                "Pass {} of '{}' at {}: {} tasks, {} objects, {} bindings, {} values, {} errors",
                pass,
                blueprint,
                root,
                state.queue.executed(),
                state.objects.len(),
                state.bindings.len(),
                state.values.len(),
                state.errors.len()
            );

            if state.is_stable() && !presets_changed {
                return self.finish(state, root, &entry);
            }
        }

        log::error!(
            "Expansion of '{}' at {} did not converge within {} passes",
            blueprint,
            root,
            self.config.max_iterations
        );
        Err(ExpandError::MaxIterationsExceeded {
            limit: self.config.max_iterations,
        })
    }

    fn drain(&self, state: &mut PassState) {
        while let Some(task) = state.queue.pop() {
            state
                .expanded
                .entry(task.namespace.clone())
                .or_insert_with(|| task.blueprint.name().to_string());

            let mut ctx = BlueprintContext::new(state, &self.registry, &task);
            let result = task.blueprint.run(&mut ctx, &task.namespace);

            if let Err(e) = result {
                let error = match e {
                    BlueprintError::Build(error) => error,
                    BlueprintError::Message(message) => BuildError::Blueprint {
                        namespace: task.namespace.clone(),
                        blueprint: task.blueprint.name().to_string(),
                        message,
                    },
                };
                log::debug!(
                    "Blueprint '{}' at {} stopped in pass {}: {}",
                    task.blueprint.name(),
                    task.namespace,
                    state.pass,
                    error
                );
                state.errors.push(error);
            }
        }
    }

    fn finish(
        &self,
        mut state: PassState,
        root: Namespace,
        entry: &Blueprint,
    ) -> Result<ResolvedGraph, ExpandError> {
        let errors = mem::take(&mut state.errors);
        log::info!(
            "Expansion of '{}' at {} converged after {} passes: {} objects, {} bindings, {} errors",
            entry.name(),
            root,
            state.pass,
            state.objects.len(),
            state.bindings.len(),
            errors.len()
        );

        if !errors.is_empty() {
            if !self.config.ignore_errors {
                return Err(ExpandError::Failed { errors });
            }
            for error in &errors {
                log::warn!("Ignoring expansion error: {}", error);
            }
        }

        Ok(ResolvedGraph {
            root,
            blueprint: entry.name().to_string(),
            namespace_class: self.config.namespace_class.clone(),
            registry: Arc::clone(&self.registry),
            objects: state.objects,
            bindings: state.bindings,
            values: state.values,
            instances: state.instances,
            expanded: state.expanded,
            callbacks: state.callbacks,
            errors,
            passes: state.pass,
        })
    }
}

/// Expand with an explicit pass cap and error policy
pub fn expand(
    registry: Arc<BlueprintRegistry>,
    root: Namespace,
    blueprint: &str,
    presets: Vec<Preset>,
    max_iterations: usize,
    ignore_errors: bool,
) -> Result<ResolvedGraph, ExpandError> {
    let config = ExpandConfig {
        max_iterations,
        ignore_errors,
        ..ExpandConfig::default()
    };
    Builder::new(registry).with_config(config).expand(root, blueprint, presets)
}

fn validate_preset(states: &StateRegistry, preset: &Preset) -> Result<(), ExpandError> {
    let invalid = |reason: String| ExpandError::InvalidPreset {
        key: preset.key.to_string(),
        reason,
    };
    if !states.contains(&preset.key.state.state_type) {
        return Err(invalid(format!(
            "state type '{}' is not registered",
            preset.key.state.state_type
        )));
    }
    let spec = field_spec(states, &preset.key).ok_or_else(|| invalid("no such field".to_string()))?;
    if spec.nested_type().is_some() {
        return Err(invalid("field is a nested record".to_string()));
    }
    Ok(())
}
