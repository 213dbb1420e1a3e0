//! Process context: external input/output locations and macros
//!
//! [`ProcessContext`] declares, per port index, where process inputs come
//! from and where outputs go. [`ContextBinder`] resolves those locations
//! against a [`Repository`] at run time.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ContextLoadReason, ProcessError, Result};
use crate::operator::{IoObject, OperatorTree};
use crate::progress::TaskProgress;
use crate::repository::{resolve_location, Entry, Repository, RepositoryError, RepositoryLocation};
use crate::state::{ProcessState, StateMachine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMacro {
    pub name: String,
    pub value: String,
}

/// Input/output slot locations plus context macros. Empty strings mark
/// unbound slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessContext {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub macros: Vec<ContextMacro>,
}

fn set_slot(slots: &mut Vec<String>, index: usize, location: impl Into<String>) {
    if slots.len() <= index {
        slots.resize(index + 1, String::new());
    }
    slots[index] = location.into();
}

impl ProcessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ProcessError::Config {
            reason: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ProcessError::Config {
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// Bind input slot `index`, padding earlier slots with empty locations.
    pub fn set_input(&mut self, index: usize, location: impl Into<String>) {
        set_slot(&mut self.inputs, index, location);
    }

    pub fn set_output(&mut self, index: usize, location: impl Into<String>) {
        set_slot(&mut self.outputs, index, location);
    }

    pub fn add_macro(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.macros.push(ContextMacro {
            name: name.into(),
            value: value.into(),
        });
    }

    /// True if any input slot from `first` on names a location.
    pub fn has_initial_data(&self, first: usize) -> bool {
        self.inputs.iter().skip(first).any(|location| !location.is_empty())
    }
}

/// Moves data between context locations and the root's ports for one run.
pub struct ContextBinder<'a> {
    context: &'a ProcessContext,
    tree: &'a dyn OperatorTree,
    repository: &'a dyn Repository,
    state: Option<&'a StateMachine>,
    base: Option<&'a RepositoryLocation>,
    owner: Option<&'a str>,
}

impl<'a> ContextBinder<'a> {
    pub fn new(
        context: &'a ProcessContext,
        tree: &'a dyn OperatorTree,
        repository: &'a dyn Repository,
    ) -> Self {
        Self {
            context,
            tree,
            repository,
            state: None,
            base: None,
            owner: None,
        }
    }

    /// State polled for a stop before each input slot.
    pub fn with_state(mut self, state: &'a StateMachine) -> Self {
        self.state = Some(state);
        self
    }

    /// Folder relative locations are resolved against.
    pub fn with_base(mut self, base: Option<&'a RepositoryLocation>) -> Self {
        self.base = base;
        self
    }

    /// Name recorded as the owner of stored outputs.
    pub fn with_owner(mut self, owner: Option<&'a str>) -> Self {
        self.owner = owner;
        self
    }

    fn should_stop(&self, progress: &TaskProgress) -> bool {
        self.state
            .is_some_and(|state| state.state() == ProcessState::Stopped)
            || progress.is_cancelled()
    }

    /// Deliver context inputs from slot `first` on into the connected root sources.
    ///
    /// Returns early, without error, once a stop or cancel is observed.
    pub fn load_inputs(&self, first: usize, progress: &TaskProgress) -> Result<()> {
        let sources = self.tree.inner_sources();
        progress.set_total(self.context.inputs.len().saturating_sub(first));

        for (slot, location) in self.context.inputs.iter().enumerate().skip(first) {
            if self.should_stop(progress) {
                debug!(slot, "input loading interrupted");
                return Ok(());
            }
            if location.is_empty() {
                debug!(slot, "input slot not bound");
                progress.step();
                continue;
            }
            let Some(port) = sources.get(slot) else {
                warn!(
                    slot,
                    ports = sources.len(),
                    "more context inputs than process inputs, ignoring the rest"
                );
                break;
            };

            let port_name = port.name();
            let load_error = |reason: ContextLoadReason| ProcessError::ContextLoad {
                slot,
                port: port_name.clone(),
                reason,
            };

            let resolved = resolve_location(self.base, location).map_err(|e| {
                load_error(ContextLoadReason::MalformedLocation {
                    location: location.clone(),
                    details: e.to_string(),
                })
            })?;
            let entry = self.repository.locate(&resolved).map_err(|e| {
                load_error(ContextLoadReason::Repository {
                    location: resolved.to_string(),
                    message: e.to_string(),
                })
            })?;
            let data = match entry {
                Some(Entry::Data(data)) => data,
                Some(Entry::Blob { location }) => IoObject::blob(&location),
                Some(Entry::Folder { .. }) => {
                    return Err(load_error(ContextLoadReason::NotDataEntry {
                        location: resolved.to_string(),
                    }))
                }
                None => {
                    return Err(load_error(ContextLoadReason::EntryNotFound {
                        location: resolved.to_string(),
                    }))
                }
            };

            if port.is_connected() {
                info!(slot, port = %port_name, location = %resolved, "assigning process input");
                port.deliver(data);
            } else {
                debug!(slot, port = %port_name, "process input not connected, skipping");
            }
            progress.step();
        }
        Ok(())
    }

    /// Store the payload of every bound root sink at its context location.
    pub fn store_outputs(&self) -> Result<()> {
        let sinks = self.tree.inner_sinks();

        for (slot, location) in self.context.outputs.iter().enumerate() {
            if location.is_empty() {
                continue;
            }
            let Some(port) = sinks.get(slot) else {
                warn!(
                    slot,
                    ports = sinks.len(),
                    "no process output for context output, skipping"
                );
                continue;
            };
            let port_name = port.name();
            let Some(data) = port.data() else {
                warn!(slot, port = %port_name, "process output produced no data, nothing stored");
                continue;
            };

            let store_error = |location: String, e: RepositoryError| ProcessError::StoreFailed {
                slot,
                port: port_name.clone(),
                location,
                reason: e.to_string(),
            };
            let resolved =
                resolve_location(self.base, location).map_err(|e| store_error(location.clone(), e))?;
            info!(slot, port = %port_name, location = %resolved, "storing process output");
            self.repository
                .store(&data, &resolved, self.owner)
                .map_err(|e| store_error(resolved.to_string(), e))?;
        }
        Ok(())
    }
}
