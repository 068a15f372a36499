//! State type registry
//!
//! Every state record is an instance of a registered state type. A type
//! declares a fixed field set with defaults; inherited fields are merged
//! with the type's own fields exactly once, at registration, producing the
//! accessor table that all later field lookups go through.

use crate::error::TypeRegistryError;
use crate::value::{Value, ValueKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The access discipline of a state type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// Shared record, any blueprint may read and write
    State,
    /// Read-only for everyone except the blueprint that exposed it
    Config,
    /// Single-read hand-off channel
    Binding,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::State => write!(f, "state"),
            StateKind::Config => write!(f, "config"),
            StateKind::Binding => write!(f, "binding"),
        }
    }
}

/// Multi-writer container discipline of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Contributions concatenate in write order
    List,
    /// Contributions merge key-wise
    Dict,
    /// Contributions union, first occurrence keeps its position
    Set,
}

/// Declared default of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// Scalar field with a default value
    Value(Value),
    /// List container with initial elements
    List(Vec<Value>),
    /// Dict container with initial entries
    Dict(BTreeMap<String, Value>),
    /// Set container with initial elements
    Set(Vec<Value>),
    /// Nested record of another registered state type
    Nested(String),
}

/// A resolved field in a type's accessor table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Field name
    pub name: String,
    /// Position in the merged field list
    pub index: usize,
    /// Declared default
    pub default: FieldDefault,
    /// Type that originally declared the field
    pub declared_by: String,
}

impl FieldSpec {
    /// The container discipline, if this is a container field
    pub fn container(&self) -> Option<ContainerKind> {
        match self.default {
            FieldDefault::List(_) => Some(ContainerKind::List),
            FieldDefault::Dict(_) => Some(ContainerKind::Dict),
            FieldDefault::Set(_) => Some(ContainerKind::Set),
            _ => None,
        }
    }

    /// The nested state type, if this is a nested record field
    pub fn nested_type(&self) -> Option<&str> {
        match &self.default {
            FieldDefault::Nested(name) => Some(name),
            _ => None,
        }
    }

    /// Whether the field holds a single overridable value
    pub fn is_scalar(&self) -> bool {
        matches!(self.default, FieldDefault::Value(_))
    }

    /// The default rendered as a value (nested records render as null)
    pub fn default_value(&self) -> Value {
        match &self.default {
            FieldDefault::Value(v) => v.clone(),
            FieldDefault::List(items) | FieldDefault::Set(items) => Value::List(items.clone()),
            FieldDefault::Dict(entries) => Value::Map(entries.clone()),
            FieldDefault::Nested(_) => Value::Null,
        }
    }

    /// Type inferred from the default
    pub fn kind(&self) -> ValueKind {
        self.default_value().kind()
    }
}

/// A state type declaration
#[derive(Debug, Clone)]
pub struct StateType {
    name: String,
    kind: StateKind,
    parent: Option<String>,
    declared: Vec<(String, FieldDefault)>,
    fields: Vec<FieldSpec>,
    accessors: BTreeMap<String, usize>,
}

impl StateType {
    /// Start declaring a state type
    pub fn new(name: impl Into<String>, kind: StateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            declared: Vec::new(),
            fields: Vec::new(),
            accessors: BTreeMap::new(),
        }
    }

    /// Shorthand for a `State` kind type
    pub fn state(name: impl Into<String>) -> Self {
        Self::new(name, StateKind::State)
    }

    /// Shorthand for a `Config` kind type
    pub fn config(name: impl Into<String>) -> Self {
        Self::new(name, StateKind::Config)
    }

    /// Shorthand for a `Binding` kind type
    pub fn binding(name: impl Into<String>) -> Self {
        Self::new(name, StateKind::Binding)
    }

    /// Inherit the fields of a registered type
    pub fn inherits(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declare a scalar field
    pub fn field(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.declared.push((name.into(), FieldDefault::Value(default.into())));
        self
    }

    /// Declare a list container field
    pub fn list(mut self, name: impl Into<String>) -> Self {
        self.declared.push((name.into(), FieldDefault::List(Vec::new())));
        self
    }

    /// Declare a dict container field
    pub fn dict(mut self, name: impl Into<String>) -> Self {
        self.declared.push((name.into(), FieldDefault::Dict(BTreeMap::new())));
        self
    }

    /// Declare a set container field
    pub fn set(mut self, name: impl Into<String>) -> Self {
        self.declared.push((name.into(), FieldDefault::Set(Vec::new())));
        self
    }

    /// Declare a nested record field
    pub fn nested(mut self, name: impl Into<String>, state_type: impl Into<String>) -> Self {
        self.declared.push((name.into(), FieldDefault::Nested(state_type.into())));
        self
    }

    /// Declare a field with an explicit default
    pub fn with_default(mut self, name: impl Into<String>, default: FieldDefault) -> Self {
        self.declared.push((name.into(), default));
        self
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access discipline
    pub fn kind(&self) -> StateKind {
        self.kind
    }

    /// Inherited type, if any
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Look up a field in the accessor table
    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.accessors.get(name).map(|&i| &self.fields[i])
    }

    /// All fields, inherited first, in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Merge inherited and own fields into the accessor table
    fn resolve(&mut self, parent: Option<&StateType>) -> Result<(), TypeRegistryError> {
        let mut fields: Vec<FieldSpec> = parent.map(|p| p.fields.clone()).unwrap_or_default();
        let mut seen_own = BTreeMap::new();

        for (name, default) in &self.declared {
            if seen_own.insert(name.clone(), ()).is_some() {
                return Err(TypeRegistryError::DuplicateField {
                    state_type: self.name.as_str().into(),
                    field: name.as_str().into(),
                });
            }
            let spec = FieldSpec {
                name: name.clone(),
                index: 0,
                default: default.clone(),
                declared_by: self.name.clone(),
            };
            // own declarations shadow inherited ones in place
            match fields.iter_mut().find(|f| &f.name == name) {
                Some(existing) => *existing = spec,
                None => fields.push(spec),
            }
        }

        self.accessors.clear();
        for (i, field) in fields.iter_mut().enumerate() {
            field.index = i;
            self.accessors.insert(field.name.clone(), i);
        }
        self.fields = fields;
        Ok(())
    }
}

/// Central registry for all state types of an expansion
#[derive(Default)]
pub struct StateRegistry {
    by_name: BTreeMap<String, Arc<StateType>>,
}

impl StateRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state type
    ///
    /// The parent and every nested record type must already be registered.
    pub fn register(&mut self, mut ty: StateType) -> Result<Arc<StateType>, TypeRegistryError> {
        if self.by_name.contains_key(&ty.name) {
            return Err(TypeRegistryError::AlreadyRegistered(ty.name.as_str().into()));
        }

        let parent = match &ty.parent {
            Some(parent) => Some(self.by_name.get(parent).cloned().ok_or_else(|| {
                TypeRegistryError::UnknownParent {
                    state_type: ty.name.as_str().into(),
                    parent: parent.as_str().into(),
                }
            })?),
            None => None,
        };
        ty.resolve(parent.as_deref())?;

        for field in &ty.fields {
            if let Some(nested) = field.nested_type() {
                if nested == ty.name {
                    return Err(TypeRegistryError::NestedCycle(ty.name.as_str().into()));
                }
                if !self.by_name.contains_key(nested) {
                    return Err(TypeRegistryError::UnknownNested {
                        state_type: ty.name.as_str().into(),
                        nested: nested.into(),
                    });
                }
            }
        }

        let ty = Arc::new(ty);
        self.by_name.insert(ty.name.clone(), Arc::clone(&ty));
        Ok(ty)
    }

    /// Get a type by name
    pub fn get(&self, name: &str) -> Option<&Arc<StateType>> {
        self.by_name.get(name)
    }

    /// Get a type by name or fail
    pub fn require(&self, name: &str) -> Result<&Arc<StateType>, TypeRegistryError> {
        self.get(name)
            .ok_or_else(|| TypeRegistryError::NotRegistered(name.into()))
    }

    /// Check if a type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Iterate over all registered types
    pub fn iter(&self) -> impl Iterator<Item = &Arc<StateType>> {
        self.by_name.values()
    }

    /// Get the number of registered types
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRegistry")
            .field("types", &self.by_name.len())
            .finish()
    }
}
