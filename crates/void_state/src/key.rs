//! Keys addressing state records and their fields

use serde::{Deserialize, Serialize};
use std::fmt;
use void_core::Namespace;

/// Identifies one state record: a state type published at a namespace
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    /// Namespace the record is bound to
    pub namespace: Namespace,
    /// Registered state type name
    pub state_type: String,
}

impl StateKey {
    /// Create a new state key
    pub fn new(namespace: Namespace, state_type: impl Into<String>) -> Self {
        Self {
            namespace,
            state_type: state_type.into(),
        }
    }

    /// Key of a top-level field of this record
    pub fn field(&self, field: impl Into<String>) -> ValueKey {
        ValueKey::new(self.clone(), Vec::new(), field)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.state_type, self.namespace)
    }
}

/// Identifies one field of a state record
///
/// `sub` holds the names of the nested record fields leading to `field`,
/// empty for top-level fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueKey {
    pub state: StateKey,
    pub sub: Vec<String>,
    pub field: String,
}

impl ValueKey {
    /// Create a new value key
    pub fn new(state: StateKey, sub: Vec<String>, field: impl Into<String>) -> Self {
        Self {
            state,
            sub,
            field: field.into(),
        }
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        for part in &self.sub {
            write!(f, ".{}", part)?;
        }
        write!(f, ".{}", self.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let state = StateKey::new(Namespace::new("board"), "Clock");
        assert_eq!(state.to_string(), "Clock@board");
        assert_eq!(state.field("freq").to_string(), "Clock@board.freq");

        let nested = ValueKey::new(state, vec!["timing".into()], "skew");
        assert_eq!(nested.to_string(), "Clock@board.timing.skew");
    }

    #[test]
    fn test_key_ordering_groups_by_record() {
        let a = StateKey::new(Namespace::new("a"), "T");
        let b = StateKey::new(Namespace::new("b"), "T");
        assert!(a.field("z") < b.field("a"));
    }
}
