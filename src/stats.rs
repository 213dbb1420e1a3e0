//! Execution statistics hooks
//!
//! - ExecutionStatistics: start/finish and per-operator event hooks
//! - NoopStatistics: default, records nothing
//! - StatisticsLog: thread-safe, append-only record list

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Outcome classes routed to distinct counters when a run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorEvent {
    Stopped,
    Failure,
    UserError,
    OperatorException,
}

pub trait ExecutionStatistics: Send + Sync {
    fn execution_started(&self, process: &str);
    fn execution_finished(&self, process: &str);
    /// `operator` is the offending or current operator, if known.
    fn operator_event(&self, operator: Option<&str>, event: OperatorEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatistics;

impl ExecutionStatistics for NoopStatistics {
    fn execution_started(&self, _process: &str) {}
    fn execution_finished(&self, _process: &str) {}
    fn operator_event(&self, _operator: Option<&str>, _event: OperatorEvent) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatisticsKind {
    ExecutionStarted { process: String },
    ExecutionFinished { process: String },
    Operator {
        operator: Option<String>,
        event: OperatorEvent,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsRecord {
    /// Monotonic sequence ID
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    pub kind: StatisticsKind,
}

#[derive(Clone)]
pub struct StatisticsLog {
    records: Arc<RwLock<Vec<StatisticsRecord>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl StatisticsLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn push(&self, kind: StatisticsKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.write().push(StatisticsRecord {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    pub fn records(&self) -> Vec<StatisticsRecord> {
        self.records.read().clone()
    }

    pub fn count(&self, event: OperatorEvent) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| matches!(&r.kind, StatisticsKind::Operator { event: e, .. } if *e == event))
            .count()
    }

    pub fn started_count(&self) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| matches!(r.kind, StatisticsKind::ExecutionStarted { .. }))
            .count()
    }

    pub fn finished_count(&self) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| matches!(r.kind, StatisticsKind::ExecutionFinished { .. }))
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatisticsLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StatisticsLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsLog")
            .field("len", &self.len())
            .finish()
    }
}

impl ExecutionStatistics for StatisticsLog {
    fn execution_started(&self, process: &str) {
        self.push(StatisticsKind::ExecutionStarted {
            process: process.to_string(),
        });
    }

    fn execution_finished(&self, process: &str) {
        self.push(StatisticsKind::ExecutionFinished {
            process: process.to_string(),
        });
    }

    fn operator_event(&self, operator: Option<&str>, event: OperatorEvent) {
        self.push(StatisticsKind::Operator {
            operator: operator.map(str::to_string),
            event,
        });
    }
}
