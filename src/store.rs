//! Run-scoped stores
//!
//! - Storage: named IoObjects operators hand to each other within one run
//! - Report streams: named report sinks
//! - Data tables: logged tables, announced to logging listeners
//! - IoObjectCache: cache shared between processes when injected

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::listeners::ListenerSet;
use crate::operator::IoObject;

pub trait ReportStream: Send + Sync {
    fn name(&self) -> String;
}

pub trait DataTable: Send + Sync {
    fn name(&self) -> String;
}

pub trait LoggingListener: Send + Sync {
    fn table_added(&self, table: &Arc<dyn DataTable>);
    fn table_removed(&self, table: &Arc<dyn DataTable>);
}

#[derive(Default)]
pub struct RunStores {
    storage: DashMap<String, IoObject>,
    report_streams: DashMap<String, Arc<dyn ReportStream>>,
    data_tables: DashMap<String, Arc<dyn DataTable>>,
    logging_listeners: ListenerSet<dyn LoggingListener>,
}

impl RunStores {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════
    // STORAGE
    // ═══════════════════════════════════════════

    pub fn store(&self, name: impl Into<String>, object: IoObject) {
        self.storage.insert(name.into(), object);
    }

    /// Object stored under `name`, removing it if `remove` is set.
    pub fn retrieve(&self, name: &str, remove: bool) -> Option<IoObject> {
        if remove {
            self.storage.remove(name).map(|(_, object)| object)
        } else {
            self.storage.get(name).map(|object| object.value().clone())
        }
    }

    pub fn storage_len(&self) -> usize {
        self.storage.len()
    }

    pub fn clear_storage(&self) {
        self.storage.clear();
    }

    // ═══════════════════════════════════════════
    // REPORT STREAMS
    // ═══════════════════════════════════════════

    pub fn add_report_stream(&self, stream: Arc<dyn ReportStream>) {
        self.report_streams.insert(stream.name(), stream);
    }

    pub fn remove_report_stream(&self, name: &str) -> Option<Arc<dyn ReportStream>> {
        self.report_streams.remove(name).map(|(_, stream)| stream)
    }

    /// Stream named `name`. An empty name selects the only stream, if exactly one exists.
    pub fn report_stream(&self, name: &str) -> Option<Arc<dyn ReportStream>> {
        if name.is_empty() {
            if self.report_streams.len() != 1 {
                return None;
            }
            return self
                .report_streams
                .iter()
                .next()
                .map(|entry| Arc::clone(entry.value()));
        }
        self.report_streams.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn report_stream_count(&self) -> usize {
        self.report_streams.len()
    }

    pub fn clear_report_streams(&self) {
        self.report_streams.clear();
    }

    // ═══════════════════════════════════════════
    // DATA TABLES
    // ═══════════════════════════════════════════

    pub fn add_logging_listener(&self, listener: Arc<dyn LoggingListener>) {
        self.logging_listeners.add(listener);
    }

    pub fn remove_logging_listener(&self, listener: &Arc<dyn LoggingListener>) -> bool {
        self.logging_listeners.remove(listener)
    }

    pub fn add_data_table(&self, table: Arc<dyn DataTable>) {
        let name = table.name();
        debug!(table = %name, "data table added");
        self.data_tables.insert(name, Arc::clone(&table));
        for listener in self.logging_listeners.snapshot() {
            listener.table_added(&table);
        }
    }

    pub fn delete_data_table(&self, name: &str) -> bool {
        let Some((_, table)) = self.data_tables.remove(name) else {
            return false;
        };
        for listener in self.logging_listeners.snapshot() {
            listener.table_removed(&table);
        }
        true
    }

    pub fn data_table(&self, name: &str) -> Option<Arc<dyn DataTable>> {
        self.data_tables.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn data_table_exists(&self, name: &str) -> bool {
        self.data_tables.contains_key(name)
    }

    /// Table names, sorted.
    pub fn data_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data_tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn clear_data_tables(&self) {
        self.data_tables.clear();
    }
}

/// Keyed IoObject cache. One instance per process unless a shared one is injected.
#[derive(Debug, Default)]
pub struct IoObjectCache {
    entries: DashMap<String, IoObject>,
}

impl IoObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, key: impl Into<String>, object: IoObject) {
        self.entries.insert(key.into(), object);
    }

    pub fn get(&self, key: &str) -> Option<IoObject> {
        self.entries.get(key).map(|object| object.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<IoObject> {
        self.entries.remove(key).map(|(_, object)| object)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
