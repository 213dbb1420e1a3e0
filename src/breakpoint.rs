//! Breakpoints: blocking pause/resume plus breakpoint-event fan-out
//!
//! [`BreakpointCoordinator::pause`] parks the calling thread on the process
//! state monitor until another thread calls `resume` or `stop`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::listeners::ListenerSet;
use crate::operator::OperatorRef;
use crate::results::IoContainer;
use crate::state::{ProcessState, StateMachine};

/// Where, relative to an operator's execution, a breakpoint fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointLocation {
    Before,
    After,
}

impl fmt::Display for BreakpointLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}

/// Fired when a process enters `Paused` at a breakpoint.
#[derive(Debug, Clone)]
pub struct BreakpointEvent {
    pub operator: OperatorRef,
    pub container: IoContainer,
    pub location: BreakpointLocation,
}

pub trait BreakpointListener: Send + Sync {
    fn breakpoint_reached(&self, event: &BreakpointEvent);

    /// Called after `resume`, independent of state listeners.
    fn resumed(&self) {}
}

pub struct BreakpointCoordinator {
    state: Arc<StateMachine>,
    listeners: ListenerSet<dyn BreakpointListener>,
}

impl BreakpointCoordinator {
    pub fn new(state: Arc<StateMachine>) -> Self {
        Self {
            state,
            listeners: ListenerSet::new(),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn BreakpointListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn BreakpointListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Enter `Paused`, announce the breakpoint, and block until resumed or stopped.
    ///
    /// A stopped process returns at once without announcing the breakpoint.
    pub fn pause(&self, operator: &OperatorRef, container: &IoContainer, location: BreakpointLocation) {
        if !self.state.try_pause() {
            debug!(operator = %operator.name(), %location, "process stopped, skipping breakpoint");
            return;
        }

        let event = BreakpointEvent {
            operator: Arc::clone(operator),
            container: container.clone(),
            location,
        };
        debug!(operator = %operator.name(), %location, "breakpoint reached");
        for listener in self.listeners.snapshot() {
            listener.breakpoint_reached(&event);
        }

        self.state.wait_while_paused();
    }

    pub fn resume(&self) {
        self.state.set_state(ProcessState::Running);
        self.state.wake_all();
        for listener in self.listeners.snapshot() {
            listener.resumed();
        }
    }

    pub fn stop(&self) {
        self.state.set_state(ProcessState::Stopped);
        self.state.wake_all();
    }

    /// Wake paused threads without changing state. They go straight back to waiting.
    pub fn wake_waiters(&self) {
        self.state.wake_all();
    }

    pub fn blocked_threads(&self) -> usize {
        self.state.blocked_threads()
    }
}
