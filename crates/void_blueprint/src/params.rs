//! Blueprint parameters
//!
//! A blueprint declares leaf parameters, each bound to one field of a state
//! type published at the blueprint's namespace, and groups, which import
//! another blueprint's parameters under a name. A group may be gated by a
//! boolean leaf (present or absent) or replicated by an integer leaf.
//!
//! The parameter tree is evaluated against defaults, or against a nested
//! value map supplied by a user, in which case it also yields the presets
//! that carry those values into expansion.

use crate::blueprint::BlueprintRegistry;
use crate::error::ParamError;
use std::collections::{BTreeMap, BTreeSet};
use void_core::{Namespace, StateKind, Value, ValueKind};
use void_state::{StateKey, ValueKey};

/// Default separator of flattened parameter names
pub const DEFAULT_SEPARATOR: &str = ":";

/// Largest replication count a count-gated group accepts
pub const MAX_GROUP_COUNT: i64 = 4096;

/// A value injected into the value store before any blueprint runs
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub key: ValueKey,
    pub value: Value,
}

impl Preset {
    pub fn new(key: ValueKey, value: impl Into<Value>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// A parameter bound to a state field
#[derive(Debug, Clone, PartialEq)]
pub struct LeafParam {
    pub name: String,
    pub state_type: String,
    pub field: String,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl LeafParam {
    /// Override the field's declared default
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// How a group's presence is decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Always,
    /// Present when the named boolean leaf is true
    Enabled(String),
    /// Replicated as many times as the named integer leaf says
    Count(String),
}

/// An imported sub-blueprint
#[derive(Debug, Clone, PartialEq)]
pub struct GroupParam {
    pub name: String,
    pub blueprint: String,
    /// Child namespace the sub-blueprint is expanded at, defaults to `name`
    pub namespace: Option<String>,
    pub gate: Gate,
}

impl GroupParam {
    pub fn enabled_by(mut self, leaf: impl Into<String>) -> Self {
        self.gate = Gate::Enabled(leaf.into());
        self
    }

    pub fn count_by(mut self, leaf: impl Into<String>) -> Self {
        self.gate = Gate::Count(leaf.into());
        self
    }

    /// Expand the sub-blueprint at another child namespace
    pub fn at(mut self, child: impl Into<String>) -> Self {
        self.namespace = Some(child.into());
        self
    }

    fn child(&self) -> &str {
        self.namespace.as_deref().unwrap_or(&self.name)
    }
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamDecl {
    Leaf(LeafParam),
    Group(GroupParam),
}

impl ParamDecl {
    /// Leaf bound to `state_type.field`
    pub fn leaf(name: impl Into<String>, state_type: impl Into<String>, field: impl Into<String>) -> LeafParam {
        LeafParam {
            name: name.into(),
            state_type: state_type.into(),
            field: field.into(),
            default: None,
            description: None,
        }
    }

    /// Group importing `blueprint`'s parameters
    pub fn group(name: impl Into<String>, blueprint: impl Into<String>) -> GroupParam {
        GroupParam {
            name: name.into(),
            blueprint: blueprint.into(),
            namespace: None,
            gate: Gate::Always,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParamDecl::Leaf(leaf) => &leaf.name,
            ParamDecl::Group(group) => &group.name,
        }
    }
}

impl From<LeafParam> for ParamDecl {
    fn from(leaf: LeafParam) -> Self {
        ParamDecl::Leaf(leaf)
    }
}

impl From<GroupParam> for ParamDecl {
    fn from(group: GroupParam) -> Self {
        ParamDecl::Group(group)
    }
}

/// A resolved leaf
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    /// Field the parameter writes
    pub key: ValueKey,
    pub kind: ValueKind,
    pub default: Value,
    /// The default comes from the parameter rather than the field
    pub overrides_default: bool,
    /// Supplied value, if any
    pub value: Option<Value>,
    pub description: Option<String>,
}

impl ParamInfo {
    /// Supplied value, else the default
    pub fn effective(&self) -> &Value {
        self.value.as_ref().unwrap_or(&self.default)
    }
}

/// A node of the parameter tree
#[derive(Debug, Clone, PartialEq)]
pub enum ParamNode {
    Leaf(ParamInfo),
    Group(ParamTree),
    Replicated(Vec<ParamTree>),
}

/// Parameters of one blueprint, in declaration order
///
/// Disabled groups are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTree {
    pub entries: Vec<(String, ParamNode)>,
}

impl ParamTree {
    /// Look an entry up by name
    pub fn get(&self, name: &str) -> Option<&ParamNode> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    /// Presets for every supplied value and overriding default, depth first
    ///
    /// Expanding with these presets builds the configuration the tree
    /// describes.
    pub fn presets(&self) -> Vec<Preset> {
        let mut out = Vec::new();
        self.collect_presets(&mut out);
        out
    }

    fn collect_presets(&self, out: &mut Vec<Preset>) {
        for (_, node) in &self.entries {
            match node {
                ParamNode::Leaf(info) => {
                    if info.value.is_some() || info.overrides_default {
                        out.push(Preset::new(info.key.clone(), info.effective().clone()));
                    }
                }
                ParamNode::Group(tree) => tree.collect_presets(out),
                ParamNode::Replicated(trees) => {
                    for tree in trees {
                        tree.collect_presets(out);
                    }
                }
            }
        }
    }

    /// Flatten into separator-joined names
    pub fn flatten(&self, separator: &str) -> Vec<FlatParam> {
        let mut out = Vec::new();
        self.flatten_into("", separator, &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, separator: &str, out: &mut Vec<FlatParam>) {
        let join = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}{}{}", prefix, separator, name)
            }
        };
        for (name, node) in &self.entries {
            match node {
                ParamNode::Leaf(info) => out.push(FlatParam {
                    name: join(name),
                    kind: info.kind,
                    default: info.effective().clone(),
                    description: info.description.clone(),
                }),
                ParamNode::Group(tree) => tree.flatten_into(&join(name), separator, out),
                ParamNode::Replicated(trees) => {
                    for (index, tree) in trees.iter().enumerate() {
                        tree.flatten_into(&format!("{}[{}]", join(name), index), separator, out);
                    }
                }
            }
        }
    }
}

/// A parameter in flat form
#[derive(Debug, Clone, PartialEq)]
pub struct FlatParam {
    pub name: String,
    pub kind: ValueKind,
    pub default: Value,
    pub description: Option<String>,
}

/// Parameter tree of `blueprint` expanded at `root`, using defaults
pub fn param_tree(registry: &BlueprintRegistry, blueprint: &str, root: &Namespace) -> Result<ParamTree, ParamError> {
    Walker::new(registry).walk(blueprint, root, None)
}

/// Flattened parameters of `blueprint` with their defaults
pub fn flat_parameters(registry: &BlueprintRegistry, blueprint: &str, separator: &str) -> Result<Vec<FlatParam>, ParamError> {
    Ok(param_tree(registry, blueprint, &Namespace::root())?.flatten(separator))
}

/// Presets carrying a nested value map into an expansion of `blueprint` at `root`
///
/// Unknown names and type mismatches fail before any pass runs.
pub fn preset_from_nested_values(
    registry: &BlueprintRegistry,
    blueprint: &str,
    root: &Namespace,
    values: &Value,
) -> Result<Vec<Preset>, ParamError> {
    Ok(Walker::new(registry).walk(blueprint, root, Some(values))?.presets())
}

struct Walker<'a> {
    registry: &'a BlueprintRegistry,
    stack: Vec<String>,
}

impl<'a> Walker<'a> {
    fn new(registry: &'a BlueprintRegistry) -> Self {
        Self {
            registry,
            stack: Vec::new(),
        }
    }

    fn walk(&mut self, blueprint: &str, namespace: &Namespace, values: Option<&Value>) -> Result<ParamTree, ParamError> {
        let found = self
            .registry
            .get(blueprint)
            .ok_or_else(|| ParamError::UnknownBlueprint(blueprint.to_string()))?;
        if self.stack.iter().any(|b| b == blueprint) {
            return Err(ParamError::RecursiveGroup(blueprint.to_string()));
        }

        let supplied = match values {
            None | Some(Value::Null) => None,
            Some(Value::Map(map)) => Some(map),
            Some(_) => {
                return Err(ParamError::Shape {
                    name: blueprint.to_string(),
                    expected: "map",
                })
            }
        };

        let mut names = BTreeSet::new();
        for decl in found.params() {
            if !names.insert(decl.name()) {
                return Err(ParamError::DuplicateParameter {
                    blueprint: blueprint.to_string(),
                    name: decl.name().to_string(),
                });
            }
        }
        if let Some(map) = supplied {
            if let Some(unknown) = map.keys().find(|k| !names.contains(k.as_str())) {
                return Err(ParamError::UnknownParameter {
                    blueprint: blueprint.to_string(),
                    name: unknown.clone(),
                });
            }
        }

        // Leaves first, so gates may refer to leaves declared after the group
        let mut leaves = BTreeMap::new();
        for decl in found.params() {
            if let ParamDecl::Leaf(leaf) = decl {
                let info = self.leaf(leaf, namespace, supplied.and_then(|m| m.get(&leaf.name)))?;
                leaves.insert(leaf.name.as_str(), info);
            }
        }

        self.stack.push(blueprint.to_string());
        let mut tree = ParamTree::default();
        for decl in found.params() {
            let node = match decl {
                ParamDecl::Leaf(leaf) => match leaves.remove(leaf.name.as_str()) {
                    Some(info) => ParamNode::Leaf(info),
                    None => continue,
                },
                ParamDecl::Group(group) => {
                    match self.group(blueprint, group, namespace, &tree, &leaves, supplied)? {
                        Some(node) => node,
                        None => continue,
                    }
                }
            };
            tree.entries.push((decl.name().to_string(), node));
        }
        self.stack.pop();
        Ok(tree)
    }

    fn leaf(&self, leaf: &LeafParam, namespace: &Namespace, value: Option<&Value>) -> Result<ParamInfo, ParamError> {
        let ty = self
            .registry
            .states()
            .get(&leaf.state_type)
            .ok_or_else(|| ParamError::UnknownStateType {
                param: leaf.name.clone(),
                state_type: leaf.state_type.clone(),
            })?;
        if ty.kind() == StateKind::Binding {
            return Err(ParamError::IncompatibleState {
                param: leaf.name.clone(),
                state_type: leaf.state_type.clone(),
                kind: ty.kind(),
            });
        }
        let spec = ty.field_spec(&leaf.field).ok_or_else(|| ParamError::UnknownField {
            param: leaf.name.clone(),
            state_type: leaf.state_type.clone(),
            field: leaf.field.clone(),
        })?;
        if spec.nested_type().is_some() {
            return Err(ParamError::NestedField {
                param: leaf.name.clone(),
                field: leaf.field.clone(),
            });
        }

        let field_default = spec.default_value();
        let overrides_default = leaf.default.as_ref().is_some_and(|d| *d != field_default);
        let default = leaf.default.clone().unwrap_or(field_default);
        let kind = match spec.kind() {
            ValueKind::Null => default.kind(),
            declared => declared,
        };
        if let Some(value) = value {
            if !kind.accepts(value.kind()) {
                return Err(ParamError::TypeMismatch {
                    name: leaf.name.clone(),
                    expected: kind,
                    found: value.kind(),
                });
            }
        }

        Ok(ParamInfo {
            key: StateKey::new(namespace.clone(), leaf.state_type.as_str()).field(leaf.field.as_str()),
            kind,
            default,
            overrides_default,
            value: value.cloned(),
            description: leaf.description.clone(),
        })
    }

    fn group(
        &mut self,
        blueprint: &str,
        group: &GroupParam,
        namespace: &Namespace,
        tree: &ParamTree,
        leaves: &BTreeMap<&str, ParamInfo>,
        supplied: Option<&BTreeMap<String, Value>>,
    ) -> Result<Option<ParamNode>, ParamError> {
        let values = supplied.and_then(|m| m.get(&group.name));
        let gate_value = |gate: &str, expected: ValueKind| -> Result<Value, ParamError> {
            let info = leaves
                .get(gate)
                .or_else(|| match tree.get(gate) {
                    Some(ParamNode::Leaf(info)) => Some(info),
                    _ => None,
                })
                .ok_or_else(|| ParamError::UnknownGate {
                    blueprint: blueprint.to_string(),
                    group: group.name.clone(),
                    gate: gate.to_string(),
                })?;
            if info.kind != expected {
                return Err(ParamError::GateType {
                    gate: gate.to_string(),
                    expected,
                    found: info.kind,
                });
            }
            Ok(info.effective().clone())
        };

        match &group.gate {
            Gate::Always => {
                let child = namespace.child(group.child());
                Ok(Some(ParamNode::Group(self.walk(&group.blueprint, &child, values)?)))
            }
            Gate::Enabled(gate) => {
                if gate_value(gate, ValueKind::Bool)?.as_bool() != Some(true) {
                    return Ok(None);
                }
                let child = namespace.child(group.child());
                Ok(Some(ParamNode::Group(self.walk(&group.blueprint, &child, values)?)))
            }
            Gate::Count(gate) => {
                let requested = gate_value(gate, ValueKind::Int)?.as_int().unwrap_or(0);
                if !(0..=MAX_GROUP_COUNT).contains(&requested) {
                    return Err(ParamError::InvalidCount {
                        gate: gate.clone(),
                        value: requested,
                        max: MAX_GROUP_COUNT,
                    });
                }
                let count = requested as usize;
                let items = match values {
                    None | Some(Value::Null) => &[][..],
                    Some(Value::List(items)) => items.as_slice(),
                    Some(_) => {
                        return Err(ParamError::Shape {
                            name: group.name.clone(),
                            expected: "list",
                        })
                    }
                };
                if items.len() > count {
                    return Err(ParamError::Shape {
                        name: group.name.clone(),
                        expected: "list no longer than its count",
                    });
                }
                let mut trees = Vec::new();
                for index in 0..count {
                    let child = namespace.indexed(group.child(), index);
                    trees.push(self.walk(&group.blueprint, &child, items.get(index))?);
                }
                Ok(Some(ParamNode::Replicated(trees)))
            }
        }
    }
}
