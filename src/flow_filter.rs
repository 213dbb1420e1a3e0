//! FlowFilterChain - hooks invoked around every operator boundary
//!
//! The operator tree owns the traversal; this module only owns registration
//! and fan-out. Filters run in registration order over a snapshot.

use std::sync::Arc;

use crate::error::OperatorError;
use crate::listeners::ListenerSet;
use crate::operator::{IoObject, OperatorRef};

/// Payload seen at a port when crossing an operator boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowData {
    pub port: Arc<str>,
    pub data: Option<IoObject>,
}

impl FlowData {
    pub fn new(port: &str, data: Option<IoObject>) -> Self {
        Self {
            port: Arc::from(port),
            data,
        }
    }
}

pub trait ProcessFlowFilter: Send + Sync {
    /// Before `next` executes. `previous` is `None` for the first operator.
    fn pre_operator(
        &self,
        previous: Option<&OperatorRef>,
        next: &OperatorRef,
        input: &[FlowData],
    ) -> Result<(), OperatorError>;

    /// After `previous` executed. `next` is `None` for the last operator.
    fn post_operator(
        &self,
        previous: &OperatorRef,
        next: Option<&OperatorRef>,
        output: &[FlowData],
    ) -> Result<(), OperatorError>;
}

/// Ordered, deduplicated filter list.
#[derive(Default)]
pub struct FlowFilterChain {
    filters: ListenerSet<dyn ProcessFlowFilter>,
}

impl FlowFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter. Re-adding the same handle is a no-op.
    pub fn add(&self, filter: Arc<dyn ProcessFlowFilter>) -> bool {
        self.filters.add_unique(filter)
    }

    pub fn remove(&self, filter: &Arc<dyn ProcessFlowFilter>) -> bool {
        self.filters.remove(filter)
    }

    /// Register every filter of this chain on `other`, keeping order.
    pub fn copy_to(&self, other: &FlowFilterChain) {
        for filter in self.filters.snapshot() {
            other.add(filter);
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Fan out to `pre_operator`; `next` is required, missing input means empty.
    pub fn before_operator(
        &self,
        previous: Option<&OperatorRef>,
        next: Option<&OperatorRef>,
        input: Option<&[FlowData]>,
    ) -> Result<(), OperatorError> {
        let next = next.ok_or(OperatorError::InvalidArgument(
            "next operator must not be null",
        ))?;
        let input = input.unwrap_or_default();
        for filter in self.filters.snapshot() {
            filter.pre_operator(previous, next, input)?;
        }
        Ok(())
    }

    /// Fan out to `post_operator`; `previous` is required, missing output means empty.
    pub fn after_operator(
        &self,
        previous: Option<&OperatorRef>,
        next: Option<&OperatorRef>,
        output: Option<&[FlowData]>,
    ) -> Result<(), OperatorError> {
        let previous = previous.ok_or(OperatorError::InvalidArgument(
            "previous operator must not be null",
        ))?;
        let output = output.unwrap_or_default();
        for filter in self.filters.snapshot() {
            filter.post_operator(previous, next, output)?;
        }
        Ok(())
    }
}
