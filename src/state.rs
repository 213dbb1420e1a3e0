//! Process state machine
//!
//! `STOPPED | PAUSED | RUNNING` behind a single monitor (mutex + condvar).
//! Every write goes through [`StateMachine::set_state`], which derives the
//! transition from the previous and new state and notifies listeners exactly
//! once. Same-state writes are silent.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::listeners::ListenerSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    #[default]
    Stopped,
    Paused,
    Running,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Paused => "paused",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

/// Listener notification derived from a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateTransition {
    Started,
    Resumed,
    Paused,
    Stopped,
}

impl StateTransition {
    /// Map `(previous, new)` to the notification to fire, `None` for same-state writes.
    pub fn between(previous: ProcessState, new: ProcessState) -> Option<Self> {
        if previous == new {
            return None;
        }
        Some(match new {
            ProcessState::Paused => Self::Paused,
            ProcessState::Stopped => Self::Stopped,
            ProcessState::Running if previous == ProcessState::Stopped => Self::Started,
            ProcessState::Running => Self::Resumed,
        })
    }
}

/// Observer of process state transitions.
///
/// Callbacks run synchronously on the thread performing the transition,
/// in registration order.
pub trait ProcessStateListener: Send + Sync {
    fn started(&self) {}
    fn paused(&self) {}
    fn resumed(&self) {}
    fn stopped(&self) {}
}

/// Shared state cell plus the condition variable paused threads block on.
pub struct StateMachine {
    state: Mutex<ProcessState>,
    changed: Condvar,
    waiters: AtomicUsize,
    listeners: ListenerSet<dyn ProcessStateListener>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::Stopped),
            changed: Condvar::new(),
            waiters: AtomicUsize::new(0),
            listeners: ListenerSet::new(),
        }
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    pub fn listeners(&self) -> &ListenerSet<dyn ProcessStateListener> {
        &self.listeners
    }

    pub fn add_listener(&self, listener: Arc<dyn ProcessStateListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ProcessStateListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Write the new state and fire the derived notification.
    ///
    /// The lock is released before listeners run; listeners may read the
    /// state or (un)register themselves.
    pub(crate) fn set_state(&self, new: ProcessState) -> Option<StateTransition> {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, new)
        };
        self.notify(previous, new)
    }

    /// Enter `Paused` unless the process is `Stopped`.
    ///
    /// The check and the write happen under one lock, so a concurrent stop
    /// is never overwritten. Returns `false` if the process was stopped.
    pub(crate) fn try_pause(&self) -> bool {
        let previous = {
            let mut state = self.state.lock();
            if *state == ProcessState::Stopped {
                return false;
            }
            std::mem::replace(&mut *state, ProcessState::Paused)
        };
        self.notify(previous, ProcessState::Paused);
        true
    }

    fn notify(&self, previous: ProcessState, new: ProcessState) -> Option<StateTransition> {
        let transition = StateTransition::between(previous, new)?;
        trace!(%previous, %new, "process state changed");

        for listener in self.listeners.snapshot() {
            match transition {
                StateTransition::Started => listener.started(),
                StateTransition::Resumed => listener.resumed(),
                StateTransition::Paused => listener.paused(),
                StateTransition::Stopped => listener.stopped(),
            }
        }
        Some(transition)
    }

    /// Block the calling thread until the state is no longer `Paused`.
    ///
    /// Spurious and unrelated wake-ups re-check the predicate.
    pub(crate) fn wait_while_paused(&self) {
        let mut state = self.state.lock();
        self.waiters.fetch_add(1, Ordering::SeqCst);
        while *state == ProcessState::Paused {
            self.changed.wait(&mut state);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    /// Wake every blocked thread; each re-checks the state.
    pub(crate) fn wake_all(&self) {
        let _state = self.state.lock();
        self.changed.notify_all();
    }

    /// Number of threads currently blocked in [`Self::wait_while_paused`].
    pub fn blocked_threads(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
