//! Process - aggregate root of one executable operator tree
//!
//! Owns the state machine, breakpoints, naming, macros, flow filters and the
//! run-scoped stores. Collaborators (repository, license evaluator, statistics,
//! progress observer, serializer) are injected with the `with_*` builders.
//! The run algorithm itself lives in [`crate::runner`].

use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::breakpoint::{BreakpointCoordinator, BreakpointListener, BreakpointLocation};
use crate::config::EngineConfig;
use crate::context::ProcessContext;
use crate::error::{OperatorError, ProcessError, Result};
use crate::flow_filter::{FlowData, FlowFilterChain, ProcessFlowFilter};
use crate::license::{LicenseEvaluator, Unrestricted};
use crate::listeners::ListenerSet;
use crate::macros::MacroStore;
use crate::naming::NamingRegistry;
use crate::nesting::NestingGuard;
use crate::operator::{ClearScope, OperatorRef, OperatorTree};
use crate::persistence::{
    check_if_savable, PersistenceError, ProcessLocation, ProcessSerializer,
    UnknownParameterInformation,
};
use crate::progress::{ProgressObserver, SilentProgress};
use crate::repository::{
    resolve_location, MemoryRepository, Repository, RepositoryError, RepositoryLocation,
};
use crate::results::IoContainer;
use crate::state::{ProcessState, ProcessStateListener, StateMachine};
use crate::stats::{ExecutionStatistics, NoopStatistics};
use crate::store::{IoObjectCache, RunStores};

/// Whether metadata derived from real data is kept after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugMode {
    #[default]
    Off,
    CollectMetadataAfterExecution,
}

/// Observer of structural changes to the operator tree.
pub trait ProcessSetupListener: Send + Sync {
    fn operator_added(&self, _operator: &OperatorRef) {}
    fn operator_changed(&self, _operator: &OperatorRef) {}
    fn operator_removed(&self, _operator: &OperatorRef, _index: usize, _index_among_enabled: usize) {}
    fn execution_order_changed(&self) {}
}

pub struct Process {
    pub(crate) tree: RwLock<Arc<dyn OperatorTree>>,
    pub(crate) state: Arc<StateMachine>,
    pub(crate) breakpoints: BreakpointCoordinator,
    pub(crate) nesting: NestingGuard,
    pub(crate) macros: MacroStore,
    pub(crate) naming: NamingRegistry,
    pub(crate) flow_filters: FlowFilterChain,
    pub(crate) setup_listeners: ListenerSet<dyn ProcessSetupListener>,
    pub(crate) stores: RunStores,
    pub(crate) io_cache: RwLock<Arc<IoObjectCache>>,
    pub(crate) context: RwLock<ProcessContext>,
    pub(crate) location: RwLock<Option<ProcessLocation>>,
    pub(crate) unknown_parameters: Mutex<Vec<UnknownParameterInformation>>,
    pub(crate) current_operator: RwLock<Option<OperatorRef>>,
    pub(crate) config: RwLock<EngineConfig>,
    pub(crate) debug_mode: RwLock<DebugMode>,
    pub(crate) import_message: RwLock<Option<String>>,
    pub(crate) repository: Arc<dyn Repository>,
    pub(crate) license: Arc<dyn LicenseEvaluator>,
    pub(crate) statistics: Arc<dyn ExecutionStatistics>,
    pub(crate) progress: Arc<dyn ProgressObserver>,
    pub(crate) serializer: Option<Arc<dyn ProcessSerializer>>,
}

impl Process {
    /// Wrap `tree` and register the names of all its operators.
    pub fn new(tree: Arc<dyn OperatorTree>) -> Self {
        let state = Arc::new(StateMachine::new());
        let process = Self {
            tree: RwLock::new(Arc::clone(&tree)),
            breakpoints: BreakpointCoordinator::new(Arc::clone(&state)),
            state,
            nesting: NestingGuard::top_level(),
            macros: MacroStore::new(),
            naming: NamingRegistry::new(),
            flow_filters: FlowFilterChain::new(),
            setup_listeners: ListenerSet::new(),
            stores: RunStores::new(),
            io_cache: RwLock::new(Arc::new(IoObjectCache::new())),
            context: RwLock::new(ProcessContext::default()),
            location: RwLock::new(None),
            unknown_parameters: Mutex::new(Vec::new()),
            current_operator: RwLock::new(None),
            config: RwLock::new(EngineConfig::default()),
            debug_mode: RwLock::new(DebugMode::default()),
            import_message: RwLock::new(None),
            repository: Arc::new(MemoryRepository::new()),
            license: Arc::new(Unrestricted),
            statistics: Arc::new(NoopStatistics),
            progress: Arc::new(SilentProgress),
            serializer: None,
        };
        process.register_tree(tree.as_ref());
        process
    }

    // ═══════════════════════════════════════════
    // BUILDERS
    // ═══════════════════════════════════════════

    pub fn with_config(self, config: EngineConfig) -> Self {
        *self.config.write() = config;
        self
    }

    pub fn with_context(self, context: ProcessContext) -> Self {
        *self.context.write() = context;
        self
    }

    pub fn with_location(self, location: ProcessLocation) -> Self {
        *self.location.write() = Some(location);
        self
    }

    /// Depth of this process when spawned from within another run.
    pub fn with_nesting_depth(mut self, depth: usize) -> Self {
        self.nesting = NestingGuard::new(depth);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = repository;
        self
    }

    pub fn with_license_evaluator(mut self, license: Arc<dyn LicenseEvaluator>) -> Self {
        self.license = license;
        self
    }

    pub fn with_statistics(mut self, statistics: Arc<dyn ExecutionStatistics>) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_progress_observer(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ProcessSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn with_io_cache(self, cache: Arc<IoObjectCache>) -> Self {
        self.set_io_cache(Some(cache));
        self
    }

    // ═══════════════════════════════════════════
    // STATE, PAUSE, STOP
    // ═══════════════════════════════════════════

    pub fn state(&self) -> ProcessState {
        self.state.state()
    }

    pub fn should_stop(&self) -> bool {
        self.state() == ProcessState::Stopped
    }

    pub fn should_pause(&self) -> bool {
        self.state() == ProcessState::Paused
    }

    /// Mark the process paused without blocking; the tree pauses at its next checkpoint.
    pub fn request_pause(&self) {
        self.state.set_state(ProcessState::Paused);
    }

    /// Pause at a breakpoint, blocking the calling thread until resumed or stopped.
    /// Returns at once if the process is already stopped.
    pub fn pause(&self, operator: &OperatorRef, container: &IoContainer, location: BreakpointLocation) {
        self.breakpoints.pause(operator, container, location);
    }

    pub fn resume(&self) {
        self.breakpoints.resume();
    }

    pub fn stop(&self) {
        self.breakpoints.stop();
    }

    /// Threads currently blocked at a breakpoint.
    pub fn paused_threads(&self) -> usize {
        self.breakpoints.blocked_threads()
    }

    pub fn add_state_listener(&self, listener: Arc<dyn ProcessStateListener>) {
        self.state.add_listener(listener);
    }

    pub fn remove_state_listener(&self, listener: &Arc<dyn ProcessStateListener>) -> bool {
        self.state.remove_listener(listener)
    }

    pub fn add_breakpoint_listener(&self, listener: Arc<dyn BreakpointListener>) {
        self.breakpoints.add_listener(listener);
    }

    pub fn remove_breakpoint_listener(&self, listener: &Arc<dyn BreakpointListener>) -> bool {
        self.breakpoints.remove_listener(listener)
    }

    // ═══════════════════════════════════════════
    // SETUP LISTENERS
    // ═══════════════════════════════════════════

    pub fn add_setup_listener(&self, listener: Arc<dyn ProcessSetupListener>) {
        self.setup_listeners.add(listener);
    }

    pub fn remove_setup_listener(&self, listener: &Arc<dyn ProcessSetupListener>) -> bool {
        self.setup_listeners.remove(listener)
    }

    pub fn fire_operator_added(&self, operator: &OperatorRef) {
        for listener in self.setup_listeners.snapshot() {
            listener.operator_added(operator);
        }
    }

    pub fn fire_operator_changed(&self, operator: &OperatorRef) {
        for listener in self.setup_listeners.snapshot() {
            listener.operator_changed(operator);
        }
    }

    pub fn fire_operator_removed(&self, operator: &OperatorRef, index: usize, index_among_enabled: usize) {
        for listener in self.setup_listeners.snapshot() {
            listener.operator_removed(operator, index, index_among_enabled);
        }
    }

    pub fn fire_execution_order_changed(&self) {
        for listener in self.setup_listeners.snapshot() {
            listener.execution_order_changed();
        }
    }

    // ═══════════════════════════════════════════
    // FLOW FILTERS
    // ═══════════════════════════════════════════

    pub fn flow_filters(&self) -> &FlowFilterChain {
        &self.flow_filters
    }

    pub fn add_flow_filter(&self, filter: Arc<dyn ProcessFlowFilter>) -> bool {
        self.flow_filters.add(filter)
    }

    pub fn remove_flow_filter(&self, filter: &Arc<dyn ProcessFlowFilter>) -> bool {
        self.flow_filters.remove(filter)
    }

    /// Register this process's flow filters on `other` (e.g. a nested process).
    pub fn copy_flow_filters_to(&self, other: &Process) {
        self.flow_filters.copy_to(&other.flow_filters);
    }

    pub fn fire_before_operator(
        &self,
        previous: Option<&OperatorRef>,
        next: Option<&OperatorRef>,
        input: Option<&[FlowData]>,
    ) -> std::result::Result<(), OperatorError> {
        self.flow_filters.before_operator(previous, next, input)
    }

    pub fn fire_after_operator(
        &self,
        previous: Option<&OperatorRef>,
        next: Option<&OperatorRef>,
        output: Option<&[FlowData]>,
    ) -> std::result::Result<(), OperatorError> {
        self.flow_filters.after_operator(previous, next, output)
    }

    // ═══════════════════════════════════════════
    // MACROS, STORES, CACHE
    // ═══════════════════════════════════════════

    pub fn macros(&self) -> &MacroStore {
        &self.macros
    }

    pub fn stores(&self) -> &RunStores {
        &self.stores
    }

    pub fn io_cache(&self) -> Arc<IoObjectCache> {
        Arc::clone(&self.io_cache.read())
    }

    /// Share `cache` with this process. `None` keeps the current cache.
    pub fn set_io_cache(&self, cache: Option<Arc<IoObjectCache>>) {
        if let Some(cache) = cache {
            *self.io_cache.write() = cache;
        }
    }

    // ═══════════════════════════════════════════
    // CONTEXT, LOCATION, CONFIG
    // ═══════════════════════════════════════════

    pub fn context(&self) -> ProcessContext {
        self.context.read().clone()
    }

    pub fn set_context(&self, context: ProcessContext) {
        *self.context.write() = context;
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: EngineConfig) {
        *self.config.write() = config;
    }

    pub fn location(&self) -> Option<ProcessLocation> {
        self.location.read().clone()
    }

    pub fn set_location(&self, location: Option<ProcessLocation>) {
        *self.location.write() = location;
    }

    pub fn repository_location(&self) -> Option<RepositoryLocation> {
        match self.location() {
            Some(ProcessLocation::Repository(location)) => Some(location),
            _ => None,
        }
    }

    /// Folder relative context locations resolve against.
    pub fn repository_base(&self) -> Option<RepositoryLocation> {
        self.location().and_then(|location| location.repository_base())
    }

    /// Resolve `location`, relative ones against the process's repository folder.
    pub fn resolve_repository_location(
        &self,
        location: &str,
    ) -> std::result::Result<RepositoryLocation, RepositoryError> {
        resolve_location(self.repository_base().as_ref(), location)
    }

    /// Inverse of [`Self::resolve_repository_location`]: relative to the
    /// process folder when there is one, absolute otherwise.
    pub fn make_relative_location(&self, location: &RepositoryLocation) -> String {
        match self.repository_base() {
            Some(base) => location.make_relative(&base),
            None => location.to_string(),
        }
    }

    pub fn nesting_depth(&self) -> usize {
        self.nesting.depth()
    }

    /// Depth for a process spawned from within this one.
    pub fn child_nesting_depth(&self) -> usize {
        self.nesting.child_depth()
    }

    pub fn debug_mode(&self) -> DebugMode {
        *self.debug_mode.read()
    }

    pub fn set_debug_mode(&self, mode: DebugMode) {
        *self.debug_mode.write() = mode;
        if mode == DebugMode::Off {
            self.tree().clear(ClearScope::RealMetadata);
        }
    }

    /// Short name for logs and statistics.
    pub fn display_name(&self) -> String {
        match self.location() {
            Some(location) => location.short_name(),
            None => self.root_operator().name(),
        }
    }

    // ═══════════════════════════════════════════
    // OPERATORS AND NAMES
    // ═══════════════════════════════════════════

    pub fn tree(&self) -> Arc<dyn OperatorTree> {
        Arc::clone(&self.tree.read())
    }

    pub fn root_operator(&self) -> OperatorRef {
        self.tree().root()
    }

    pub fn current_operator(&self) -> Option<OperatorRef> {
        self.current_operator.read().clone()
    }

    pub fn set_current_operator(&self, operator: Option<OperatorRef>) {
        *self.current_operator.write() = operator;
    }

    pub fn operator(&self, name: &str) -> Option<OperatorRef> {
        self.naming.get(name)
    }

    pub fn all_operator_names(&self) -> Vec<String> {
        self.naming.names()
    }

    /// Bind `operator` to a unique name and apply it. Returns the effective name.
    pub fn register_operator(&self, operator: &OperatorRef) -> String {
        let requested = operator.name();
        let effective = self.naming.register(&requested, Arc::clone(operator));
        if effective != requested {
            operator.set_name(&effective);
        }
        effective
    }

    pub fn unregister_operator(&self, name: &str) -> Option<OperatorRef> {
        self.naming.unregister(name)
    }

    /// Rename `old_name` to the first free variant of `new_name`.
    ///
    /// Returns the effective name, `None` if no operator is called `old_name`.
    pub fn rename_operator(&self, old_name: &str, new_name: &str) -> Option<String> {
        let operator = self.naming.unregister(old_name)?;
        let effective = self.naming.register(new_name, Arc::clone(&operator));
        operator.set_name(&effective);
        self.tree().notify_renaming(old_name, &effective);
        self.fire_operator_changed(&operator);
        debug!(old = old_name, new = %effective, "operator renamed");
        Some(effective)
    }

    fn register_tree(&self, tree: &dyn OperatorTree) {
        for operator in tree.all_operators() {
            self.register_operator(&operator);
        }
    }

    // ═══════════════════════════════════════════
    // DIAGNOSTICS
    // ═══════════════════════════════════════════

    pub fn unknown_parameters(&self) -> Vec<UnknownParameterInformation> {
        self.unknown_parameters.lock().clone()
    }

    pub fn add_unknown_parameter(&self, info: UnknownParameterInformation) {
        self.unknown_parameters.lock().push(info);
    }

    pub fn clear_unknown_parameters(&self) {
        self.unknown_parameters.lock().clear();
    }

    /// Message from the last load if the definition was converted from an older format.
    pub fn import_message(&self) -> Option<String> {
        self.import_message.read().clone()
    }

    // ═══════════════════════════════════════════
    // LOAD / SAVE / DUPLICATE
    // ═══════════════════════════════════════════

    fn serializer(&self) -> Result<&Arc<dyn ProcessSerializer>> {
        self.serializer.as_ref().ok_or_else(|| ProcessError::Config {
            reason: "no process serializer configured".into(),
        })
    }

    /// Replace the operator tree with one read from `reader`.
    ///
    /// Names are registered in a fresh registry; on failure the previous
    /// registry and tree stay in place.
    pub fn read_process(&self, reader: &mut dyn Read) -> Result<()> {
        let serializer = Arc::clone(self.serializer()?);
        let previous_names = self.naming.take();

        let loaded = match serializer.load(reader) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.naming.restore(previous_names);
                return Err(ProcessError::Load(e));
            }
        };

        self.register_tree(loaded.tree.as_ref());
        *self.tree.write() = loaded.tree;
        *self.context.write() = loaded.context;
        *self.unknown_parameters.lock() = loaded.unknown_parameters;
        *self.import_message.write() = loaded.import_message;

        let unknown = self.unknown_parameters.lock().len();
        if unknown > 0 {
            warn!(count = unknown, "process definition contains unknown parameters");
        }
        info!(operators = self.naming.len(), "process loaded");
        Ok(())
    }

    /// Write the definition to `writer`.
    pub fn save_to(&self, writer: &mut dyn Write) -> Result<()> {
        let tree = self.tree();
        check_if_savable(tree.as_ref())?;
        let context = self.context();
        self.serializer()?
            .save(tree.as_ref(), &context, writer)
            .map_err(ProcessError::Save)
    }

    /// Write the definition to the process location.
    pub fn save(&self) -> Result<()> {
        let location = self.location().ok_or(ProcessError::NoSaveDestination)?;
        // Serialize fully before touching the destination
        let mut buffer = Vec::new();
        self.save_to(&mut buffer)?;
        match &location {
            ProcessLocation::File(path) => std::fs::write(path, &buffer)?,
            ProcessLocation::Repository(target) => {
                self.repository
                    .store_process(&buffer, target)
                    .map_err(|e| ProcessError::Save(PersistenceError::Other(e.into())))?;
            }
        }
        info!(location = %location, "process saved");
        Ok(())
    }

    /// Deep copy of the tree in a fresh process sharing location,
    /// configuration, collaborators and the IoObject cache.
    pub fn duplicate(&self) -> Process {
        let mut copy = Process::new(self.tree().duplicate())
            .with_config(self.config())
            .with_context(self.context())
            .with_nesting_depth(self.nesting_depth())
            .with_repository(Arc::clone(&self.repository))
            .with_license_evaluator(Arc::clone(&self.license))
            .with_statistics(Arc::clone(&self.statistics))
            .with_progress_observer(Arc::clone(&self.progress))
            .with_io_cache(self.io_cache());
        copy.serializer = self.serializer.clone();
        copy.set_location(self.location());
        *copy.debug_mode.write() = self.debug_mode();
        copy
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("root", &self.root_operator().name())
            .field("state", &self.state())
            .field("depth", &self.nesting_depth())
            .field("location", &self.location())
            .finish()
    }
}
