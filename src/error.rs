//! Error types with error codes
//!
//! Error code ranges:
//! - OPF-000-009: Pre-execution gates (license, nesting)
//! - OPF-010-019: Process context binding (inputs/outputs)
//! - OPF-020-029: Execution outcome (stop, operator failures)
//! - OPF-030-039: Load/save boundary
//! - OPF-040-049: Operator-side errors
//! - OPF-050-059: Configuration and IO

use thiserror::Error;

use crate::license::Violation;
use crate::persistence::PersistenceError;

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Context slots are 0-based internally but reported 1-based.
fn nth(slot: &usize) -> usize {
    slot + 1
}

fn format_violations(violations: &[Violation]) -> String {
    match violations {
        [] => "no violations".to_string(),
        [single] => single.to_string(),
        many => format!(
            "{} violations: {}",
            many.len(),
            many.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

fn at_operator(operator: &Option<String>) -> String {
    match operator {
        Some(name) => format!(" at operator '{}'", name),
        None => String::new(),
    }
}

/// Why a process context input could not be delivered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextLoadReason {
    #[error("malformed location '{location}': {details}")]
    MalformedLocation { location: String, details: String },

    #[error("entry '{location}' does not exist")]
    EntryNotFound { location: String },

    #[error("entry '{location}' is not a data entry")]
    NotDataEntry { location: String },

    #[error("repository error at '{location}': {message}")]
    Repository { location: String, message: String },
}

/// Errors raised by the opaque operator tree.
///
/// `UserError` is a declared failure attributed to a specific operator,
/// `Failed` wraps anything else the operator code ran into.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("[OPF-040] Operator '{operator}' failed (code {code}): {message}")]
    UserError {
        operator: String,
        code: u32,
        message: String,
    },

    #[error("[OPF-041] Process stopped{}", at_operator(.operator))]
    Stopped { operator: Option<String> },

    #[error("[OPF-042] Operator failure{}: {source}", at_operator(.operator))]
    Failed {
        operator: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("[OPF-043] Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl OperatorError {
    pub fn user_error(operator: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
        Self::UserError {
            operator: operator.into(),
            code,
            message: message.into(),
        }
    }

    pub fn failed(operator: Option<&str>, source: impl Into<anyhow::Error>) -> Self {
        Self::Failed {
            operator: operator.map(str::to_string),
            source: source.into(),
        }
    }

    /// Operator the error is attributed to, if any.
    pub fn operator(&self) -> Option<&str> {
        match self {
            Self::UserError { operator, .. } => Some(operator),
            Self::Stopped { operator } | Self::Failed { operator, .. } => operator.as_deref(),
            Self::InvalidArgument(_) => None,
        }
    }
}

/// All error variants surfaced by a process run and its boundaries.
#[derive(Error, Debug)]
pub enum ProcessError {
    // ═══════════════════════════════════════════
    // PRE-EXECUTION GATES (000-009)
    // ═══════════════════════════════════════════
    #[error("[OPF-001] License violation at operator '{operator}': {}", format_violations(.violations))]
    LicenseViolation {
        operator: String,
        violations: Vec<Violation>,
    },

    #[error("[OPF-002] Process nesting too deep: depth {depth} exceeds maximum {max}")]
    RecursionTooDeep { depth: usize, max: usize },

    // ═══════════════════════════════════════════
    // CONTEXT BINDING (010-019)
    // ═══════════════════════════════════════════
    #[error("[OPF-010] Cannot load process input #{} into port '{port}': {reason}", nth(.slot))]
    ContextLoad {
        slot: usize,
        port: String,
        reason: ContextLoadReason,
    },

    #[error("[OPF-011] Cannot store process output #{} from port '{port}' at '{location}': {reason}", nth(.slot))]
    StoreFailed {
        slot: usize,
        port: String,
        location: String,
        reason: String,
    },

    // ═══════════════════════════════════════════
    // EXECUTION OUTCOME (020-029)
    // ═══════════════════════════════════════════
    #[error("[OPF-020] Process stopped{}", at_operator(.operator))]
    Stopped { operator: Option<String> },

    #[error(transparent)]
    Operator(OperatorError),

    // ═══════════════════════════════════════════
    // LOAD / SAVE (030-039)
    // ═══════════════════════════════════════════
    #[error("[OPF-030] Failed to load process: {0}")]
    Load(#[source] PersistenceError),

    #[error("[OPF-031] Failed to save process: {0}")]
    Save(#[source] PersistenceError),

    #[error("[OPF-032] No process location is specified")]
    NoSaveDestination,

    #[error("[OPF-033] Process contains placeholder operator '{operator}' and cannot be saved")]
    NotSavable { operator: String },

    // ═══════════════════════════════════════════
    // CONFIG / IO (050-059)
    // ═══════════════════════════════════════════
    #[error("[OPF-050] Configuration error: {reason}")]
    Config { reason: String },

    #[error("[OPF-051] IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<OperatorError> for ProcessError {
    fn from(err: OperatorError) -> Self {
        match err {
            OperatorError::Stopped { operator } => Self::Stopped { operator },
            other => Self::Operator(other),
        }
    }
}

impl ProcessError {
    /// True for the cooperative stop outcome.
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// True for failures declared against a specific operator or port.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Operator(OperatorError::UserError { .. })
                | Self::ContextLoad { .. }
                | Self::StoreFailed { .. }
        )
    }
}

impl FixSuggestion for ProcessError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ProcessError::LicenseViolation { .. } => {
                Some("Disable the operator or install a license that covers it")
            }
            ProcessError::RecursionTooDeep { .. } => {
                Some("Check for processes that execute themselves, or raise max_nesting_depth")
            }
            ProcessError::ContextLoad { reason, .. } => match reason {
                ContextLoadReason::MalformedLocation { .. } => {
                    Some("Use an absolute location (//repository/path) or save the process in a repository first")
                }
                ContextLoadReason::EntryNotFound { .. } => {
                    Some("Verify the input location exists in the repository")
                }
                ContextLoadReason::NotDataEntry { .. } => {
                    Some("Point the input slot at a data entry, not a folder")
                }
                ContextLoadReason::Repository { .. } => Some("Check repository availability"),
            },
            ProcessError::StoreFailed { .. } => {
                Some("Check the output location and repository permissions")
            }
            ProcessError::Stopped { .. } => None,
            ProcessError::Operator(_) => None,
            ProcessError::Load(_) => Some("Check the process definition for syntax errors"),
            ProcessError::Save(_) => Some("Check the destination is writable"),
            ProcessError::NoSaveDestination => Some("Set a process location before saving"),
            ProcessError::NotSavable { .. } => {
                Some("Remove placeholder operators or install the missing extensions")
            }
            ProcessError::Config { .. } => Some("Check the YAML configuration keys and values"),
            ProcessError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
