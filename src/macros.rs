//! MacroStore - per-run `name -> value` substitution table
//!
//! Cleared at the start of every run, then seeded with the process start
//! timestamp, context macros and caller overrides, in that order.

use std::borrow::Cow;

use chrono::Local;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Reserved macro holding the local time the current run started.
pub const PROCESS_START_MACRO: &str = "process_start";

const PROCESS_START_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `%{name}` reference
static MACRO_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"%\{([^}]+)\}").unwrap());

#[derive(Debug, Default)]
pub struct MacroStore {
    entries: DashMap<String, String>,
}

impl MacroStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or overwrite a macro.
    pub fn add(&self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.entries.remove(name).map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries, sorted by name.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort();
        entries
    }

    pub(crate) fn define_process_start(&self) {
        self.add(
            PROCESS_START_MACRO,
            Local::now().format(PROCESS_START_FORMAT).to_string(),
        );
    }

    /// Replace `%{name}` with defined values. Unknown references stay as written.
    pub fn substitute<'a>(&self, text: &'a str) -> Cow<'a, str> {
        MACRO_PATTERN.replace_all(text, |caps: &regex::Captures| {
            self.get(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
    }
}
