//! Hierarchical namespaces
//!
//! A namespace is a dotted path (`board.cpu[0].core`) that anchors a
//! blueprint's declarations in the eventual object tree. The empty path is
//! the root and is an ancestor of every other namespace.

use crate::error::NamespaceError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between path components
pub const SEPARATOR: char = '.';

/// An immutable hierarchical path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// The root namespace
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Create a namespace from a path without validation
    ///
    /// Use [`Namespace::parse`] for untrusted input.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Parse and validate a dotted path
    pub fn parse(path: &str) -> Result<Self, NamespaceError> {
        if path.is_empty() {
            return Ok(Self::root());
        }
        for component in path.split(SEPARATOR) {
            validate_component(path, component)?;
        }
        Ok(Self(path.to_string()))
    }

    /// Get the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is the root namespace
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a child component
    pub fn child(&self, name: &str) -> Self {
        if self.is_root() {
            Self(name.to_string())
        } else {
            Self(format!("{}{}{}", self.0, SEPARATOR, name))
        }
    }

    /// Append an indexed child component (`name[index]`)
    pub fn indexed(&self, name: &str, index: usize) -> Self {
        self.child(&format!("{}[{}]", name, index))
    }

    /// Concatenate another namespace below this one
    pub fn join(&self, other: &Namespace) -> Self {
        match (self.is_root(), other.is_root()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => Self(format!("{}{}{}", self.0, SEPARATOR, other.0)),
        }
    }

    /// The parent namespace, or `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(pos) => Some(Self(self.0[..pos].to_string())),
            None => Some(Self::root()),
        }
    }

    /// The last path component (empty for the root)
    pub fn name(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    /// Iterate over the path components
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|c| !c.is_empty())
    }

    /// Number of components (0 for the root)
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// Equal to `other` or located below it
    pub fn is_within(&self, other: &Namespace) -> bool {
        self == other || self.is_descendant_of(other)
    }

    /// Strictly below `other`
    pub fn is_descendant_of(&self, other: &Namespace) -> bool {
        if self == other {
            return false;
        }
        if other.is_root() {
            return true;
        }
        self.0.len() > other.0.len()
            && self.0.starts_with(&other.0)
            && self.0[other.0.len()..].starts_with(SEPARATOR)
    }

    /// The remaining path below `ancestor`
    ///
    /// Returns `None` when `ancestor` does not contain this namespace.
    pub fn relative_to(&self, ancestor: &Namespace) -> Option<Namespace> {
        if self == ancestor {
            return Some(Self::root());
        }
        if !self.is_descendant_of(ancestor) {
            return None;
        }
        if ancestor.is_root() {
            return Some(self.clone());
        }
        Some(Self(self.0[ancestor.0.len() + 1..].to_string()))
    }

    /// Iterate from this namespace up to and including the root
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }
}

fn validate_component(path: &str, component: &str) -> Result<(), NamespaceError> {
    if component.is_empty() {
        return Err(NamespaceError::EmptyComponent(path.into()));
    }
    if let Some(open) = component.find('[') {
        let well_formed = open > 0
            && component.ends_with(']')
            && component[open + 1..component.len() - 1]
                .parse::<usize>()
                .is_ok();
        if !well_formed {
            return Err(NamespaceError::MalformedIndex(component.into()));
        }
    } else if component.contains(']') {
        return Err(NamespaceError::MalformedIndex(component.into()));
    }
    Ok(())
}

/// Iterator over a namespace and its ancestors
pub struct Ancestors {
    next: Option<Namespace>,
}

impl Iterator for Ancestors {
    type Item = Namespace;

    fn next(&mut self) -> Option<Namespace> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for Namespace {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for Namespace {
    fn from(path: String) -> Self {
        Self(path)
    }
}
