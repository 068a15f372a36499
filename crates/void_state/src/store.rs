//! Value store - versioned, priority-ranked field history
//!
//! Field values are never stored on state instances. Every write appends an
//! entry to the history of its `ValueKey`; the current value is the entry
//! maximal under (priority, sequence). Sequences are pass-local and grow
//! with every write, so within a tier the later write wins.
//!
//! Container fields (list, dict, set) additionally accept contributions
//! from any number of writers. Contributions merge instead of overriding
//! and never conflict with each other.

use crate::error::StoreError;
use crate::key::ValueKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use void_core::{ContainerKind, Value};

/// Source name attributed to externally supplied presets
pub const PRESET_SOURCE: &str = "<preset>";

/// Write-conflict tier, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Default,
    Normal,
    Override,
    Alias,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Default => write!(f, "default"),
            Priority::Normal => write!(f, "normal"),
            Priority::Override => write!(f, "override"),
            Priority::Alias => write!(f, "alias"),
        }
    }
}

/// What an entry writes
#[derive(Debug, Clone, PartialEq)]
pub enum Written {
    /// Direct scalar assignment
    Value(Value),
    /// Forward reads and writes to another field
    Redirect(ValueKey),
    /// Elements or entries merged into a container field
    Contribution(Value),
}

/// A write request with an optional explicit priority
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    priority: Option<Priority>,
    written: Written,
}

impl Assignment {
    /// Assignment at the implied priority
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            priority: None,
            written: Written::Value(value.into()),
        }
    }

    /// Assignment at `Default` priority
    pub fn default_value(value: impl Into<Value>) -> Self {
        Self::new(value).with_priority(Priority::Default)
    }

    /// Assignment at `Normal` priority
    pub fn normal(value: impl Into<Value>) -> Self {
        Self::new(value).with_priority(Priority::Normal)
    }

    /// Assignment at `Override` priority
    pub fn overriding(value: impl Into<Value>) -> Self {
        Self::new(value).with_priority(Priority::Override)
    }

    /// Alias marker redirecting the field to `target`
    pub fn alias(target: ValueKey) -> Self {
        Self {
            priority: None,
            written: Written::Redirect(target),
        }
    }

    /// Set an explicit priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// The explicit priority, else `Alias` for alias markers, else `Normal`
    pub fn priority(&self) -> Priority {
        self.priority.unwrap_or(match self.written {
            Written::Redirect(_) => Priority::Alias,
            _ => Priority::Normal,
        })
    }

    /// The written payload
    pub fn written(&self) -> &Written {
        &self.written
    }

    /// Whether this is an alias marker
    pub fn is_alias(&self) -> bool {
        matches!(self.written, Written::Redirect(_))
    }
}

impl From<Value> for Assignment {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// One entry in a field's history
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEntry {
    pub priority: Priority,
    pub sequence: u64,
    pub written: Written,
    /// Registered name of the writing blueprint
    pub source: String,
}

impl ValueEntry {
    fn rank(&self) -> (Priority, u64) {
        (self.priority, self.sequence)
    }

    fn is_contribution(&self) -> bool {
        matches!(self.written, Written::Contribution(_))
    }
}

/// Outcome of a single-step lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// The maximal entry assigns a value
    Value(&'a Value),
    /// The maximal entry forwards to another field
    Redirect(&'a ValueKey),
    /// No scalar entry exists for the key
    Unset,
}

/// Disagreeing writers at the highest tier present for one key
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub key: ValueKey,
    pub priority: Priority,
    /// Every writer at that tier with what it wrote, in write order
    pub contributors: Vec<(String, String)>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conflicting {} writes to {}:", self.priority, self.key)?;
        for (source, value) in &self.contributors {
            write!(f, " {}={}", source, value)?;
        }
        Ok(())
    }
}

/// Priority-ranked history of every written field in one pass
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    entries: BTreeMap<ValueKey, Vec<ValueEntry>>,
    sequence: u64,
}

impl ValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all entries and restart the sequence counter
    pub fn clear(&mut self) {
        self.entries.clear();
        self.sequence = 0;
    }

    /// Inject a preset at `Override` priority and sequence 0
    ///
    /// Presets are seeded before any blueprint runs, so only a later
    /// explicit `Override` write can out-rank them.
    pub fn seed_preset(&mut self, key: ValueKey, value: Value) {
        self.entries.entry(key).or_default().push(ValueEntry {
            priority: Priority::Override,
            sequence: 0,
            written: Written::Value(value),
            source: PRESET_SOURCE.to_string(),
        });
    }

    /// Append an assignment; returns the sequence number it was given
    pub fn set(&mut self, key: ValueKey, assignment: Assignment, source: &str) -> u64 {
        self.sequence += 1;
        let priority = assignment.priority();
        self.entries.entry(key).or_default().push(ValueEntry {
            priority,
            sequence: self.sequence,
            written: assignment.written,
            source: source.to_string(),
        });
        self.sequence
    }

    /// Append a container contribution
    pub fn contribute(&mut self, key: ValueKey, value: Value, source: &str) -> u64 {
        self.sequence += 1;
        self.entries.entry(key).or_default().push(ValueEntry {
            priority: Priority::Normal,
            sequence: self.sequence,
            written: Written::Contribution(value),
            source: source.to_string(),
        });
        self.sequence
    }

    /// The maximal scalar or redirect entry for a key
    pub fn top(&self, key: &ValueKey) -> Option<&ValueEntry> {
        self.entries
            .get(key)?
            .iter()
            .filter(|e| !e.is_contribution())
            .max_by_key(|e| e.rank())
    }

    /// Single-step lookup without following redirects
    pub fn get(&self, key: &ValueKey) -> Lookup<'_> {
        match self.top(key).map(|e| &e.written) {
            Some(Written::Value(v)) => Lookup::Value(v),
            Some(Written::Redirect(target)) => Lookup::Redirect(target),
            _ => Lookup::Unset,
        }
    }

    /// Follow redirects from `key` to the field that finally holds the value
    pub fn resolve_key(&self, key: &ValueKey) -> Result<ValueKey, StoreError> {
        let mut visited = BTreeSet::new();
        let mut current = key.clone();
        loop {
            if !visited.insert(current.clone()) {
                return Err(StoreError::AliasCycle {
                    key: key.to_string(),
                    chain: visited.iter().map(|k| k.to_string()).collect(),
                });
            }
            match self.get(&current) {
                Lookup::Redirect(target) => current = target.clone(),
                _ => return Ok(current),
            }
        }
    }

    /// Current scalar value of a key, following redirects
    pub fn resolve(&self, key: &ValueKey) -> Result<Option<&Value>, StoreError> {
        let target = self.resolve_key(key)?;
        Ok(match self.get(&target) {
            Lookup::Value(v) => Some(v),
            _ => None,
        })
    }

    /// Container contributions of a key in write order
    pub fn contributions(&self, key: &ValueKey) -> Vec<&Value> {
        let mut found: Vec<&ValueEntry> = self
            .entries
            .get(key)
            .map(|entries| entries.iter().filter(|e| e.is_contribution()).collect())
            .unwrap_or_default();
        found.sort_by_key(|e| e.sequence);
        found
            .into_iter()
            .filter_map(|e| match &e.written {
                Written::Contribution(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Full history of a key
    pub fn entries(&self, key: &ValueKey) -> &[ValueEntry] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All keys with at least one entry
    pub fn keys(&self) -> impl Iterator<Item = &ValueKey> {
        self.entries.keys()
    }

    /// Number of keys with at least one entry
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Disagreeing writers at the highest tier present, per key
    ///
    /// Shadowed lower tiers are never inspected, and identical repeated
    /// writes never conflict.
    pub fn conflicts(&self) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (key, entries) in &self.entries {
            let scalar: Vec<&ValueEntry> = entries.iter().filter(|e| !e.is_contribution()).collect();
            let Some(top) = scalar.iter().map(|e| e.priority).max() else {
                continue;
            };
            let mut tier: Vec<&ValueEntry> =
                scalar.into_iter().filter(|e| e.priority == top).collect();
            tier.sort_by_key(|e| e.sequence);

            let first = &tier[0].written;
            if tier.iter().all(|e| &e.written == first) {
                continue;
            }
            conflicts.push(Conflict {
                key: key.clone(),
                priority: top,
                contributors: tier
                    .iter()
                    .map(|e| (e.source.clone(), describe(&e.written)))
                    .collect(),
            });
        }
        conflicts
    }
}

impl PartialEq for ValueStore {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

fn describe(written: &Written) -> String {
    match written {
        Written::Value(v) | Written::Contribution(v) => v.to_string(),
        Written::Redirect(target) => format!("-> {}", target),
    }
}

/// Merge container contributions onto a base value
///
/// Lists concatenate, sets union keeping first occurrences in place, dicts
/// merge key-wise with later contributions replacing earlier keys.
/// A non-list contribution to a list or set contributes a single element.
pub fn merge_container<'a>(
    kind: ContainerKind,
    base: Value,
    contributions: impl IntoIterator<Item = &'a Value>,
) -> Value {
    match kind {
        ContainerKind::List | ContainerKind::Set => {
            let mut items = match base {
                Value::List(items) => items,
                Value::Null => Vec::new(),
                other => vec![other],
            };
            let push = |item: &Value, items: &mut Vec<Value>| {
                if kind == ContainerKind::List || !items.contains(item) {
                    items.push(item.clone());
                }
            };
            for contribution in contributions {
                match contribution {
                    Value::List(elements) => {
                        for element in elements {
                            push(element, &mut items);
                        }
                    }
                    single => push(single, &mut items),
                }
            }
            Value::List(items)
        }
        ContainerKind::Dict => {
            let mut map = match base {
                Value::Map(map) => map,
                _ => BTreeMap::new(),
            };
            for contribution in contributions {
                if let Value::Map(entries) = contribution {
                    for (k, v) in entries {
                        map.insert(k.clone(), v.clone());
                    }
                }
            }
            Value::Map(map)
        }
    }
}
