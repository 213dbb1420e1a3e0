//! opflow - process execution engine for operator trees
//!
//! Turns an opaque operator tree into a pausable, cancellable, observable
//! run with license gating, nesting limits, deterministic operator naming
//! and consistent result collection.

pub mod breakpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod flow_filter;
pub mod license;
pub mod listeners;
pub mod logging;
pub mod macros;
pub mod naming;
pub mod nesting;
pub mod operator;
pub mod persistence;
pub mod process;
pub mod progress;
pub mod repository;
pub mod results;
pub mod runner;
pub mod state;
pub mod stats;
pub mod store;

pub use breakpoint::{BreakpointEvent, BreakpointListener, BreakpointLocation};
pub use config::{EngineConfig, ExecutionMode};
pub use context::{ContextMacro, ProcessContext};
pub use error::{ContextLoadReason, FixSuggestion, OperatorError, ProcessError, Result};
pub use flow_filter::{FlowData, ProcessFlowFilter};
pub use license::{LicenseEvaluator, Violation};
pub use logging::LogVerbosity;
pub use operator::{ClearScope, IoObject, Operator, OperatorRef, OperatorTree, Port, PortRef};
pub use persistence::{ProcessLocation, ProcessSerializer, UnknownParameterInformation};
pub use process::{DebugMode, Process, ProcessSetupListener};
pub use repository::{Entry, MemoryRepository, Repository, RepositoryLocation};
pub use results::{IoContainer, ResultSlot};
pub use runner::RunRequest;
pub use state::{ProcessState, ProcessStateListener};
pub use stats::{ExecutionStatistics, OperatorEvent, StatisticsLog};
