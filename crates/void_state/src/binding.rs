//! Binding table - which state record is published where
//!
//! A binding maps a (namespace, state type) pair to the record published
//! there. Readers look a type up from their own namespace and walk towards
//! the root until a binding is found, so a record published at a node is
//! visible to its whole subtree unless a descendant publishes its own.

use crate::key::StateKey;
use std::collections::BTreeMap;
use void_core::Namespace;

/// A published state record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// The record reads and writes go to
    pub target: StateKey,
    /// Registered name of the publishing blueprint
    pub exposed_by: String,
}

/// Published records of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    bindings: BTreeMap<StateKey, Binding>,
}

impl BindingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a record at `at`, returning any binding it replaced
    pub fn publish(&mut self, at: StateKey, binding: Binding) -> Option<Binding> {
        self.bindings.insert(at, binding)
    }

    /// Exact lookup without walking ancestors
    pub fn get(&self, at: &StateKey) -> Option<&Binding> {
        self.bindings.get(at)
    }

    /// Find the nearest binding of `state_type` at `namespace` or above
    ///
    /// Returns the namespace the binding was found at together with it.
    pub fn lookup(&self, namespace: &Namespace, state_type: &str) -> Option<(Namespace, &Binding)> {
        namespace.ancestors().find_map(|ns| {
            let at = StateKey::new(ns, state_type);
            let binding = self.bindings.get(&at)?;
            Some((at.namespace, binding))
        })
    }

    /// Iterate over all bindings
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &Binding)> {
        self.bindings.iter()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Remove all bindings
    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(table: &mut BindingTable, ns: &str) {
        let key = StateKey::new(Namespace::new(ns), "Clock");
        table.publish(
            key.clone(),
            Binding {
                target: key,
                exposed_by: "bp".into(),
            },
        );
    }

    #[test]
    fn test_lookup_walks_to_nearest_ancestor() {
        let mut table = BindingTable::new();
        publish(&mut table, "");
        publish(&mut table, "board.cpu");

        let (found, _) = table.lookup(&Namespace::new("board.cpu.core[0]"), "Clock").unwrap();
        assert_eq!(found.as_str(), "board.cpu");

        let (found, _) = table.lookup(&Namespace::new("board.uart"), "Clock").unwrap();
        assert!(found.is_root());

        assert!(table.lookup(&Namespace::new("board"), "Other").is_none());
    }

    #[test]
    fn test_tables_compare_pointwise() {
        let mut a = BindingTable::new();
        let mut b = BindingTable::new();
        publish(&mut a, "x");
        publish(&mut b, "x");
        assert_eq!(a, b);

        publish(&mut b, "y");
        assert_ne!(a, b);
    }
}
