//! Load/save boundary
//!
//! The serialization format belongs to a [`ProcessSerializer`]; this module
//! only defines what loading produces and where a process lives.

use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ProcessContext;
use crate::error::{ProcessError, Result};
use crate::operator::OperatorTree;
use crate::repository::RepositoryLocation;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("malformed process definition: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A parameter the loader found but no operator declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnknownParameterInformation {
    pub operator_name: String,
    pub operator_class: String,
    pub parameter_name: String,
    pub parameter_value: String,
}

impl fmt::Display for UnknownParameterInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown parameter '{}' = '{}' on operator '{}' ({})",
            self.parameter_name, self.parameter_value, self.operator_name, self.operator_class
        )
    }
}

/// Output of [`ProcessSerializer::load`].
pub struct LoadedProcess {
    pub tree: Arc<dyn OperatorTree>,
    pub context: ProcessContext,
    pub unknown_parameters: Vec<UnknownParameterInformation>,
    /// Set when the definition was converted from an older format.
    pub import_message: Option<String>,
}

impl LoadedProcess {
    pub fn new(tree: Arc<dyn OperatorTree>) -> Self {
        Self {
            tree,
            context: ProcessContext::default(),
            unknown_parameters: Vec::new(),
            import_message: None,
        }
    }
}

pub trait ProcessSerializer: Send + Sync {
    fn load(&self, reader: &mut dyn Read) -> std::result::Result<LoadedProcess, PersistenceError>;

    fn save(
        &self,
        tree: &dyn OperatorTree,
        context: &ProcessContext,
        writer: &mut dyn Write,
    ) -> std::result::Result<(), PersistenceError>;
}

/// Where a process definition is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessLocation {
    File(PathBuf),
    Repository(RepositoryLocation),
}

impl ProcessLocation {
    /// Folder relative context locations resolve against. Only repository
    /// locations have one.
    pub fn repository_base(&self) -> Option<RepositoryLocation> {
        match self {
            Self::Repository(location) => Some(location.parent()),
            Self::File(_) => None,
        }
    }

    /// Short name for logs and statistics.
    pub fn short_name(&self) -> String {
        match self {
            Self::File(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Repository(location) => location
                .name()
                .map_or_else(|| location.to_string(), str::to_string),
        }
    }
}

impl fmt::Display for ProcessLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Repository(location) => write!(f, "{location}"),
        }
    }
}

/// Refuse to save a tree that contains placeholder operators.
pub fn check_if_savable(tree: &dyn OperatorTree) -> Result<()> {
    match tree.all_operators().into_iter().find(|op| op.is_placeholder()) {
        Some(placeholder) => Err(ProcessError::NotSavable {
            operator: placeholder.name(),
        }),
        None => Ok(()),
    }
}
