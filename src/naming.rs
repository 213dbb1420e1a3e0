//! NamingRegistry - unique, human-readable operator names per process
//!
//! Collisions are resolved by stripping any existing `" (n)"` suffix and
//! probing `base (2)`, `base (3)`, ... until a free name is found.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tracing::trace;

use crate::operator::OperatorRef;

/// Matches a trailing numeric disambiguation suffix: `"Filter (3)"` -> `"Filter"`
static SUFFIX_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*?) \(\d+\)$").unwrap());

/// Name -> operator bindings. At most one operator per name.
#[derive(Default)]
pub struct NamingRegistry {
    bindings: Mutex<HashMap<String, OperatorRef>>,
}

/// Requested name without its `" (n)"` suffix.
pub fn base_name(name: &str) -> &str {
    SUFFIX_PATTERN
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map_or(name, |m| m.as_str())
}

impl NamingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `operator` under `name`, or the first free `base (n)` for n >= 2.
    ///
    /// Returns the effective name.
    pub fn register(&self, name: &str, operator: OperatorRef) -> String {
        let mut bindings = self.bindings.lock();
        let effective = if bindings.contains_key(name) {
            let base = base_name(name);
            (2..)
                .map(|n| format!("{base} ({n})"))
                .find(|candidate| !bindings.contains_key(candidate))
                .unwrap_or_else(|| base.to_string())
        } else {
            name.to_string()
        };
        trace!(requested = name, effective = %effective, "registered operator name");
        bindings.insert(effective.clone(), operator);
        effective
    }

    /// Remove a binding. Unknown names are ignored.
    pub fn unregister(&self, name: &str) -> Option<OperatorRef> {
        self.bindings.lock().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<OperatorRef> {
        self.bindings.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.lock().contains_key(name)
    }

    /// All bound names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.lock().is_empty()
    }

    pub fn clear(&self) {
        self.bindings.lock().clear();
    }

    /// Take every binding out, leaving the registry empty.
    pub(crate) fn take(&self) -> HashMap<String, OperatorRef> {
        std::mem::take(&mut *self.bindings.lock())
    }

    /// Replace every binding with a previously taken set.
    pub(crate) fn restore(&self, bindings: HashMap<String, OperatorRef>) {
        *self.bindings.lock() = bindings;
    }
}

impl std::fmt::Debug for NamingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamingRegistry")
            .field("names", &self.names())
            .finish()
    }
}
