//! The named-time table: symbolic labels resolvable to absolute timestamps.
//!
//! Every table carries three reserved entries seeded at construction:
//! `epoch` (0), `now` (the clock reading when the table was created), and
//! `never` (positive infinity). The table is a flat mapping; entries may be
//! arbitrary moment expressions referencing other entries, and are resolved
//! lazily and recursively.

use crate::time::clock::Clock;
use crate::time::moment::{MomentSpec, ResolutionScope};
use std::collections::HashMap;

/// Names present in every table and excluded from ordinary enumeration.
pub const RESERVED_NAMES: [&str; 3] = ["epoch", "now", "never"];

/// A flat mapping from name to moment expression.
#[derive(Debug, Clone)]
pub struct NamedTimeTable {
    entries: HashMap<String, MomentSpec>,
}

impl NamedTimeTable {
    /// Creates a table seeded with the reserved entries; `now` is captured
    /// from `clock` at this moment and does not drift afterwards.
    pub fn new(clock: &Clock) -> Self {
        let mut entries = HashMap::new();
        entries.insert("epoch".to_string(), MomentSpec::Millis(0.0));
        entries.insert("now".to_string(), MomentSpec::Millis(clock.now_ms()));
        entries.insert("never".to_string(), MomentSpec::Millis(f64::INFINITY));
        Self { entries }
    }

    /// Inserts or replaces a single entry.
    pub fn insert(&mut self, name: impl Into<String>, spec: impl Into<MomentSpec>) {
        self.entries.insert(name.into(), spec.into());
    }

    /// Merges `entries` into the table, replacing entries that collide.
    pub fn extend<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MomentSpec>,
    {
        for (name, spec) in entries {
            self.insert(name, spec);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The raw (unresolved) expression for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&MomentSpec> {
        self.entries.get(name)
    }

    /// The original expressions, reserved names included only on request.
    pub fn specs(&self, include_defaults: bool) -> HashMap<String, MomentSpec> {
        self.entries
            .iter()
            .filter(|(name, _)| include_defaults || !is_reserved(name))
            .map(|(name, spec)| (name.clone(), spec.clone()))
            .collect()
    }

    /// Resolves every entry to absolute milliseconds, reserved names
    /// included only on request. Cycles resolve to 0.
    pub fn resolve_all(&self, include_defaults: bool) -> HashMap<String, f64> {
        let scope = ResolutionScope::new(&self.entries);
        self.entries
            .iter()
            .filter(|(name, _)| include_defaults || !is_reserved(name))
            .map(|(name, _)| (name.clone(), scope.resolve(&MomentSpec::Text(name.clone()))))
            .collect()
    }

    pub(crate) fn entries(&self) -> &HashMap<String, MomentSpec> {
        &self.entries
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}
