//! Operator tree boundary
//!
//! The engine never looks inside operators. It drives the tree through
//! [`OperatorTree`] and moves opaque [`IoObject`] payloads through [`Port`]s.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::OperatorError;
use crate::process::Process;
use crate::results::ResultSlot;

/// Opaque data object flowing between ports.
///
/// Payloads are JSON values behind an `Arc` so cloning an object is O(1).
#[derive(Debug, Clone, PartialEq)]
pub struct IoObject {
    value: Arc<Value>,
    source: Option<Arc<str>>,
}

impl IoObject {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: Arc::new(value.into()),
            source: None,
        }
    }

    /// Reference to a binary entry that is read lazily by whoever consumes it.
    pub fn blob(location: &str) -> Self {
        Self::new(serde_json::json!({ "blob": location })).with_source(location)
    }

    #[must_use]
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(Arc::from(source));
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Where the object came from (repository location or producing operator).
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// A node of the operator tree.
pub trait Operator: Send + Sync {
    fn name(&self) -> String;

    /// Apply the effective name handed out by the naming registry.
    fn set_name(&self, _name: &str) {}

    fn is_enabled(&self) -> bool {
        true
    }

    /// Flag the operator as needing (re-)execution in the current run.
    fn make_dirty(&self) {}

    /// Placeholder for an operator whose implementation is not installed.
    fn is_placeholder(&self) -> bool {
        false
    }
}

pub type OperatorRef = Arc<dyn Operator>;

impl fmt::Debug for dyn Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name())
            .finish()
    }
}

/// An independently connectable input or output slot.
pub trait Port: Send + Sync {
    fn name(&self) -> String;
    fn is_connected(&self) -> bool;
    fn deliver(&self, data: IoObject);
    /// Current payload, `None` if nothing was produced.
    fn data(&self) -> Option<IoObject>;
}

pub type PortRef = Arc<dyn Port>;

/// What [`OperatorTree::clear`] resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClearScope {
    /// Data held by ports.
    Data,
    /// Metadata derived from real data during debugging.
    RealMetadata,
    /// Everything.
    All,
}

/// The root of an operator tree, as seen by the execution engine.
///
/// Implementations call back into the [`Process`] passed to `execute` for
/// breakpoints, flow filters, macros, and stop checks.
pub trait OperatorTree: Send + Sync {
    /// The root operator itself.
    fn root(&self) -> OperatorRef;

    /// All operators below the root, depth-first.
    fn all_inner_operators(&self) -> Vec<OperatorRef>;

    fn check_all(&self) {}

    fn clear(&self, scope: ClearScope);

    fn process_starts(&self, process: &Process) -> Result<(), OperatorError>;

    fn execute(&self, process: &Process) -> Result<(), OperatorError>;

    /// Fail with `Stopped` if a stop was requested.
    fn check_for_stop(&self, process: &Process) -> Result<(), OperatorError> {
        if process.should_stop() {
            return Err(OperatorError::Stopped {
                operator: process.current_operator().map(|op| op.name()),
            });
        }
        Ok(())
    }

    /// Hand programmatic input to the root's inner sources, in order.
    fn deliver_input(&self, input: &[IoObject]);

    /// Named result slots in sink order; empty sinks yield `data: None`.
    fn results(&self) -> Vec<ResultSlot>;

    fn process_finished(&self, process: &Process) -> Result<(), OperatorError>;

    /// Ports feeding the root subprocess (process inputs).
    fn inner_sources(&self) -> Vec<PortRef>;

    /// Ports collecting the root subprocess results (process outputs).
    fn inner_sinks(&self) -> Vec<PortRef>;

    fn notify_renaming(&self, _old_name: &str, _new_name: &str) {}

    /// Deep copy of the tree for [`Process::duplicate`].
    fn duplicate(&self) -> Arc<dyn OperatorTree>;

    /// Root plus every inner operator.
    fn all_operators(&self) -> Vec<OperatorRef> {
        let mut operators = vec![self.root()];
        operators.extend(self.all_inner_operators());
        operators
    }
}
