//! Process runner
//!
//! One canonical entry point, [`Process::run`], configured by a [`RunRequest`].
//!
//! Phases: validating -> preparing -> loading inputs -> executing ->
//! persisting outputs -> collecting results -> finalizing. Finalizing runs
//! from a drop guard, so it happens on every exit path after validation,
//! including unwinding.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, ExecutionMode};
use crate::context::{ContextBinder, ProcessContext};
use crate::error::{OperatorError, ProcessError, Result};
use crate::logging::{LogVerbosity, RunLogSink};
use crate::operator::{ClearScope, IoObject, OperatorRef, OperatorTree};
use crate::process::Process;
use crate::progress::{BackgroundTask, TaskOutcome};
use crate::results::{IoContainer, ResultCollector};
use crate::state::ProcessState;
use crate::stats::OperatorEvent;

/// Name of the background task that loads context inputs.
const LOAD_INPUT_TASK: &str = "load-context-input";

/// Parameters of a single run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Programmatic input, delivered to the first root sources in order.
    pub input: Vec<IoObject>,
    /// Requested verbosity; `None` defers to the process configuration.
    ///
    /// The effective level only filters the per-run log file configured in
    /// [`EngineConfig::log_file`]. Events reaching the global subscriber are
    /// filtered by that subscriber alone.
    pub log_verbosity: Option<LogVerbosity>,
    /// Macro overrides, applied after the context macros.
    pub macros: Vec<(String, String)>,
    /// Store root outputs at the context output locations.
    pub store_output: bool,
    /// Overrides the configured null-result policy.
    pub omit_nulls: Option<bool>,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            input: Vec::new(),
            log_verbosity: None,
            macros: Vec::new(),
            store_output: true,
            omit_nulls: None,
        }
    }
}

impl RunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, input: impl IntoIterator<Item = IoObject>) -> Self {
        self.input = input.into_iter().collect();
        self
    }

    pub fn with_log_verbosity(mut self, verbosity: LogVerbosity) -> Self {
        self.log_verbosity = Some(verbosity);
        self
    }

    pub fn with_macro(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.macros.push((name.into(), value.into()));
        self
    }

    pub fn with_store_output(mut self, store_output: bool) -> Self {
        self.store_output = store_output;
        self
    }

    pub fn with_omit_nulls(mut self, omit_nulls: bool) -> Self {
        self.omit_nulls = Some(omit_nulls);
        self
    }
}

/// Runs [`Process::finish_run`] when dropped.
struct RunFinalizer<'a> {
    process: &'a Process,
    tree: &'a dyn OperatorTree,
    sink: Option<RunLogSink>,
    name: &'a str,
}

impl Drop for RunFinalizer<'_> {
    fn drop(&mut self) {
        self.process.finish_run(self.tree, self.sink.take(), self.name);
    }
}

impl Process {
    /// Execute the operator tree once.
    ///
    /// Returns the root's results, filtered by the null-result policy. Every
    /// error surfaces after finalizing has run and the process is `Stopped`.
    pub fn run(&self, request: RunRequest) -> Result<IoContainer> {
        let config = self.config();
        let tree = self.tree();

        self.nesting.check(config.max_nesting_depth)?;
        self.check_licenses(tree.as_ref(), config.execution_mode)?;

        let verbosity = LogVerbosity::effective(request.log_verbosity, config.log_verbosity);
        let sink = config
            .log_file
            .as_deref()
            .and_then(|path| RunLogSink::attach(path, verbosity));
        let name = self.display_name();
        let started = Instant::now();
        info!(process = %name, %verbosity, depth = self.nesting_depth(), "process starts");

        let _finalizer = RunFinalizer {
            process: self,
            tree: tree.as_ref(),
            sink,
            name: &name,
        };

        match self.run_phases(&tree, &config, request, &name) {
            Ok(results) => {
                info!(
                    process = %name,
                    results = results.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "process finished successfully"
                );
                Ok(results)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Every enabled operator must pass the license check before any is marked dirty.
    fn check_licenses(&self, tree: &dyn OperatorTree, mode: ExecutionMode) -> Result<()> {
        let enabled: Vec<OperatorRef> = tree
            .all_inner_operators()
            .into_iter()
            .filter(|op| op.is_enabled())
            .collect();

        for operator in &enabled {
            let violations = self.license.check_violations(operator.as_ref(), true);
            if !violations.is_empty() {
                return Err(ProcessError::LicenseViolation {
                    operator: operator.name(),
                    violations,
                });
            }
        }

        if mode == ExecutionMode::Always {
            for operator in &enabled {
                operator.make_dirty();
            }
        }
        Ok(())
    }

    fn run_phases(
        &self,
        tree: &Arc<dyn OperatorTree>,
        config: &EngineConfig,
        request: RunRequest,
        name: &str,
    ) -> Result<IoContainer> {
        self.prepare_run(tree.as_ref(), config.execution_mode);

        let context = self.context();
        for entry in &context.macros {
            self.macros.add(entry.name.as_str(), entry.value.as_str());
        }
        for (macro_name, value) in request.macros {
            self.macros.add(macro_name, value);
        }

        tree.process_starts(self)?;

        let first_input = request.input.len();
        if context.has_initial_data(first_input) {
            debug!(first_input, "loading initial data from the process context");
            self.load_context_inputs(tree, &context, first_input, config)?;
        }

        self.statistics.execution_started(name);
        tree.deliver_input(&request.input);
        tree.execute(self)?;
        tree.check_for_stop(self)?;

        if request.store_output {
            let base = self.repository_base();
            self.binder(tree.as_ref(), &context)
                .with_base(base.as_ref())
                .with_owner(Some(name))
                .store_outputs()?;
        }

        let omit_nulls = request.omit_nulls.unwrap_or(config.omit_null_results);
        Ok(ResultCollector::new(omit_nulls).collect(tree.results()))
    }

    /// Reset everything a previous run left behind and enter `Running`.
    fn prepare_run(&self, tree: &dyn OperatorTree, mode: ExecutionMode) {
        self.state.set_state(ProcessState::Running);
        self.stores.clear_data_tables();
        self.stores.clear_report_streams();
        self.stores.clear_storage();
        self.macros.clear();
        self.clear_unknown_parameters();
        if mode != ExecutionMode::OnlyDirty {
            tree.clear(ClearScope::Data);
        }
        self.macros.define_process_start();
        debug!("process initialised");
    }

    fn binder<'a>(&'a self, tree: &'a dyn OperatorTree, context: &'a ProcessContext) -> ContextBinder<'a> {
        ContextBinder::new(context, tree, self.repository.as_ref()).with_state(&self.state)
    }

    /// Load context inputs on a background worker and wait for it.
    fn load_context_inputs(
        &self,
        tree: &Arc<dyn OperatorTree>,
        context: &ProcessContext,
        first_input: usize,
        config: &EngineConfig,
    ) -> Result<()> {
        let base = self.repository_base();
        let task = BackgroundTask::new(
            LOAD_INPUT_TASK,
            config.progress_display_delay(),
            Arc::clone(&self.progress),
        );
        let outcome = task.run(|progress| {
            self.binder(tree.as_ref(), context)
                .with_base(base.as_ref())
                .load_inputs(first_input, progress)
        });

        match outcome {
            TaskOutcome::Completed(Ok(())) if self.should_stop() => {
                Err(ProcessError::Stopped { operator: None })
            }
            TaskOutcome::Completed(result) => result,
            TaskOutcome::Cancelled => {
                info!("loading of process inputs cancelled");
                Err(ProcessError::Stopped { operator: None })
            }
            TaskOutcome::Panicked(message) => Err(OperatorError::failed(
                None,
                anyhow!("problem loading process context: {message}"),
            )
            .into()),
        }
    }

    /// Route a failed run to the statistics hook matching its kind.
    fn record_failure(&self, error: &ProcessError) {
        let current = self.current_operator().map(|op| op.name());
        let operator = match error {
            ProcessError::Stopped { operator } => operator.clone(),
            ProcessError::Operator(e) => e.operator().map(str::to_string),
            _ => None,
        }
        .or(current);

        if error.is_stop() {
            info!(operator = ?operator, "process stopped");
            self.statistics
                .operator_event(operator.as_deref(), OperatorEvent::Stopped);
            return;
        }

        warn!(operator = ?operator, error = %error, "process failed");
        self.statistics
            .operator_event(operator.as_deref(), OperatorEvent::Failure);
        let kind = if error.is_user_error() {
            OperatorEvent::UserError
        } else {
            OperatorEvent::OperatorException
        };
        self.statistics.operator_event(operator.as_deref(), kind);
    }

    /// Finalizing: never fails, teardown problems are only logged.
    fn finish_run(&self, tree: &dyn OperatorTree, sink: Option<RunLogSink>, name: &str) {
        self.stop();

        match catch_unwind(AssertUnwindSafe(|| tree.process_finished(self))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "operator teardown failed"),
            Err(_) => warn!("operator teardown panicked"),
        }

        self.stores.clear_report_streams();
        self.stores.clear_storage();
        self.clear_unknown_parameters();
        self.set_current_operator(None);

        if let Some(sink) = sink {
            debug!(path = %sink.path().display(), "detaching process log file");
            sink.detach();
        }
        self.statistics.execution_finished(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let request = RunRequest::new();
        assert!(request.store_output);
        assert!(request.log_verbosity.is_none());
        assert!(request.omit_nulls.is_none());
        assert!(request.input.is_empty());
    }

    #[test]
    fn macro_overrides_keep_order() {
        let request = RunRequest::new()
            .with_macro("env", "staging")
            .with_macro("env", "test");
        assert_eq!(
            request.macros,
            vec![
                ("env".to_string(), "staging".to_string()),
                ("env".to_string(), "test".to_string())
            ]
        );
    }
}
