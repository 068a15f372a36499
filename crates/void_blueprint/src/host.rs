//! Host interface
//!
//! The host owns the real object system. Materialization hands it the
//! whole staged configuration in one call so creation is atomic from the
//! graph's point of view; callbacks then talk to it one attribute at a
//! time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use void_core::{Namespace, Value};

/// Handle of an object created by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of an object in a staged configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StagedHandle(pub usize);

/// A resolved object reference
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectRef {
    /// An object staged in the same configuration
    Staged(StagedHandle),
    /// An object the host already created
    Realized(ObjectId),
    /// A sub-object reached through attribute access on `base`
    Port { base: Box<ObjectRef>, path: Vec<String> },
    /// A name outside the graph, passed through unchanged
    External(String),
}

/// Attribute value as the host receives it
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttrValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
    Object(ObjectRef),
}

impl AttrValue {
    /// Convert a value, resolving every reference with `resolve`
    pub fn from_value(value: &Value, resolve: &mut impl FnMut(&Namespace) -> ObjectRef) -> Self {
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(*b),
            Value::Int(i) => AttrValue::Int(*i),
            Value::Float(x) => AttrValue::Float(*x),
            Value::String(s) => AttrValue::String(s.clone()),
            Value::List(items) => {
                AttrValue::List(items.iter().map(|v| AttrValue::from_value(v, resolve)).collect())
            }
            Value::Map(map) => AttrValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), AttrValue::from_value(v, resolve)))
                    .collect(),
            ),
            Value::Ref(ns) => AttrValue::Object(resolve(ns)),
        }
    }

    /// Try to get as object reference
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            AttrValue::Object(r) => Some(r),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// One object of a staged configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpec {
    /// Fully qualified name, including the instantiation prefix
    pub name: String,
    pub class: String,
    pub attrs: BTreeMap<String, AttrValue>,
    /// Blueprint expanded at this node, for host-side introspection
    pub blueprint: Option<String>,
    /// Intermediate namespace node nobody declared
    pub synthesized: bool,
}

/// Error reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The object system that realizes resolved graphs
pub trait Host {
    /// Create every object of a configuration at once
    ///
    /// Returns one handle per spec, in spec order. On error nothing may
    /// have been committed.
    fn create_configuration(&mut self, objects: &[ObjectSpec]) -> Result<Vec<ObjectId>, HostError>;

    /// Read an attribute of a realized object
    fn get_attribute(&self, object: ObjectId, attr: &str) -> Result<AttrValue, HostError>;

    /// Write an attribute of a realized object
    fn set_attribute(&mut self, object: ObjectId, attr: &str, value: AttrValue) -> Result<(), HostError>;
}
