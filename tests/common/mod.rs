//! Shared fakes for integration tests: a scripted operator tree with call
//! counters, fake ports, gated/failing repositories and recording listeners.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

use opflow::license::LicenseEvaluator;
use opflow::repository::RepositoryError;
use opflow::{
    ClearScope, Entry, IoObject, Operator, OperatorError, OperatorRef, OperatorTree, Port, PortRef,
    Process, ProcessStateListener, Repository, RepositoryLocation, ResultSlot, Violation,
};

// ============================================================================
// OPERATORS AND PORTS
// ============================================================================

pub struct FakeOperator {
    name: Mutex<String>,
    pub enabled: bool,
    pub placeholder: bool,
    pub dirty: AtomicBool,
}

impl FakeOperator {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: Mutex::new(name.to_string()),
            enabled: true,
            placeholder: false,
            dirty: AtomicBool::new(false),
        })
    }

    pub fn disabled(name: &str) -> Arc<Self> {
        Arc::new(Self {
            enabled: false,
            ..Self::plain(name)
        })
    }

    pub fn placeholder(name: &str) -> Arc<Self> {
        Arc::new(Self {
            placeholder: true,
            ..Self::plain(name)
        })
    }

    fn plain(name: &str) -> Self {
        Self {
            name: Mutex::new(name.to_string()),
            enabled: true,
            placeholder: false,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }
}

impl Operator for FakeOperator {
    fn name(&self) -> String {
        self.name.lock().clone()
    }

    fn set_name(&self, name: &str) {
        *self.name.lock() = name.to_string();
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn make_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

pub struct FakePort {
    name: String,
    connected: bool,
    data: Mutex<Option<IoObject>>,
    pub deliveries: AtomicUsize,
}

impl FakePort {
    pub fn connected(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            connected: true,
            data: Mutex::new(None),
            deliveries: AtomicUsize::new(0),
        })
    }

    pub fn unconnected(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            connected: false,
            data: Mutex::new(None),
            deliveries: AtomicUsize::new(0),
        })
    }

    pub fn set_data(&self, data: Option<IoObject>) {
        *self.data.lock() = data;
    }

    pub fn delivered(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }
}

impl Port for FakePort {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn deliver(&self, data: IoObject) {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        *self.data.lock() = Some(data);
    }

    fn data(&self) -> Option<IoObject> {
        self.data.lock().clone()
    }
}

// ============================================================================
// SCRIPTED TREE
// ============================================================================

pub type ExecuteHook = Box<dyn Fn(&Process) -> Result<(), OperatorError> + Send + Sync>;

/// Operator tree that counts every engine callback and fails on request.
pub struct ScriptedTree {
    pub root: Arc<FakeOperator>,
    pub inner: Vec<Arc<FakeOperator>>,
    pub sources: Vec<Arc<FakePort>>,
    pub sinks: Vec<Arc<FakePort>>,
    pub results: Mutex<Vec<ResultSlot>>,
    pub execute_hook: Mutex<Option<ExecuteHook>>,
    pub fail_process_starts: AtomicBool,
    pub fail_teardown: AtomicBool,
    pub panic_in_teardown: AtomicBool,
    pub process_starts_calls: AtomicUsize,
    pub execute_calls: AtomicUsize,
    pub process_finished_calls: AtomicUsize,
    pub clear_calls: Mutex<Vec<ClearScope>>,
    pub delivered_input: Mutex<Vec<IoObject>>,
    pub renamings: Mutex<Vec<(String, String)>>,
}

impl ScriptedTree {
    pub fn new(root: &str, inner: &[&str]) -> Self {
        Self {
            root: FakeOperator::new(root),
            inner: inner.iter().map(|name| FakeOperator::new(name)).collect(),
            sources: Vec::new(),
            sinks: Vec::new(),
            results: Mutex::new(Vec::new()),
            execute_hook: Mutex::new(None),
            fail_process_starts: AtomicBool::new(false),
            fail_teardown: AtomicBool::new(false),
            panic_in_teardown: AtomicBool::new(false),
            process_starts_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
            process_finished_calls: AtomicUsize::new(0),
            clear_calls: Mutex::new(Vec::new()),
            delivered_input: Mutex::new(Vec::new()),
            renamings: Mutex::new(Vec::new()),
        }
    }

    pub fn with_inner_operator(mut self, operator: Arc<FakeOperator>) -> Self {
        self.inner.push(operator);
        self
    }

    pub fn with_sources(mut self, sources: Vec<Arc<FakePort>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_sinks(mut self, sinks: Vec<Arc<FakePort>>) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn with_results(self, results: Vec<ResultSlot>) -> Self {
        *self.results.lock() = results;
        self
    }

    pub fn on_execute(
        self,
        hook: impl Fn(&Process) -> Result<(), OperatorError> + Send + Sync + 'static,
    ) -> Self {
        *self.execute_hook.lock() = Some(Box::new(hook));
        self
    }

    pub fn process_starts_count(&self) -> usize {
        self.process_starts_calls.load(Ordering::SeqCst)
    }

    pub fn execute_count(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn process_finished_count(&self) -> usize {
        self.process_finished_calls.load(Ordering::SeqCst)
    }
}

impl OperatorTree for ScriptedTree {
    fn root(&self) -> OperatorRef {
        self.root.clone()
    }

    fn all_inner_operators(&self) -> Vec<OperatorRef> {
        self.inner.iter().map(|op| op.clone() as OperatorRef).collect()
    }

    fn clear(&self, scope: ClearScope) {
        self.clear_calls.lock().push(scope);
    }

    fn process_starts(&self, _process: &Process) -> Result<(), OperatorError> {
        self.process_starts_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_process_starts.load(Ordering::SeqCst) {
            return Err(OperatorError::user_error(self.root.name(), 100, "cannot initialise"));
        }
        Ok(())
    }

    fn execute(&self, process: &Process) -> Result<(), OperatorError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        match self.execute_hook.lock().as_ref() {
            Some(hook) => hook(process),
            None => Ok(()),
        }
    }

    fn deliver_input(&self, input: &[IoObject]) {
        self.delivered_input.lock().extend(input.iter().cloned());
        for (port, data) in self.sources.iter().zip(input) {
            port.deliver(data.clone());
        }
    }

    fn results(&self) -> Vec<ResultSlot> {
        self.results.lock().clone()
    }

    fn process_finished(&self, _process: &Process) -> Result<(), OperatorError> {
        self.process_finished_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_in_teardown.load(Ordering::SeqCst) {
            panic!("teardown exploded");
        }
        if self.fail_teardown.load(Ordering::SeqCst) {
            return Err(OperatorError::failed(
                Some(&self.root.name()),
                anyhow::anyhow!("teardown failed"),
            ));
        }
        Ok(())
    }

    fn inner_sources(&self) -> Vec<PortRef> {
        self.sources.iter().map(|p| p.clone() as PortRef).collect()
    }

    fn inner_sinks(&self) -> Vec<PortRef> {
        self.sinks.iter().map(|p| p.clone() as PortRef).collect()
    }

    fn notify_renaming(&self, old_name: &str, new_name: &str) {
        self.renamings
            .lock()
            .push((old_name.to_string(), new_name.to_string()));
    }

    fn duplicate(&self) -> Arc<dyn OperatorTree> {
        let inner: Vec<String> = self.inner.iter().map(|op| op.name()).collect();
        let inner: Vec<&str> = inner.iter().map(String::as_str).collect();
        Arc::new(
            ScriptedTree::new(&self.root.name(), &inner).with_results(self.results.lock().clone()),
        )
    }
}

// ============================================================================
// REPOSITORIES
// ============================================================================

/// Repository whose `store` always fails.
#[derive(Default)]
pub struct FailingRepository;

impl Repository for FailingRepository {
    fn locate(&self, _location: &RepositoryLocation) -> Result<Option<Entry>, RepositoryError> {
        Err(RepositoryError::Backend("repository offline".into()))
    }

    fn store(
        &self,
        _data: &IoObject,
        _location: &RepositoryLocation,
        _owner: Option<&str>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Backend("disk full".into()))
    }
}

/// Repository that blocks inside `locate` until released by the test.
pub struct GatedRepository {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
    pub locate_calls: AtomicUsize,
}

pub struct Gate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl GatedRepository {
    pub fn new() -> (Arc<Self>, Gate) {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        let repository = Arc::new(Self {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            locate_calls: AtomicUsize::new(0),
        });
        (
            repository,
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl Repository for GatedRepository {
    fn locate(&self, location: &RepositoryLocation) -> Result<Option<Entry>, RepositoryError> {
        self.locate_calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered.lock().send(());
        let _ = self.release.lock().recv();
        Ok(Some(Entry::Data(
            IoObject::new(serde_json::json!({ "from": location.to_string() })),
        )))
    }

    fn store(
        &self,
        _data: &IoObject,
        _location: &RepositoryLocation,
        _owner: Option<&str>,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }
}

// ============================================================================
// LICENSES AND LISTENERS
// ============================================================================

/// Rejects operators whose name is in the list.
pub struct DenyList(pub Vec<&'static str>);

impl LicenseEvaluator for DenyList {
    fn check_violations(&self, operator: &dyn Operator, _only_enabled: bool) -> Vec<Violation> {
        let name = operator.name();
        if self.0.iter().any(|denied| *denied == name) {
            vec![Violation::new("edition", "requires enterprise edition")]
        } else {
            Vec::new()
        }
    }
}

#[derive(Default)]
pub struct StateRecorder {
    pub events: Mutex<Vec<&'static str>>,
}

impl StateRecorder {
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().clone()
    }
}

impl ProcessStateListener for StateRecorder {
    fn started(&self) {
        self.events.lock().push("started");
    }
    fn paused(&self) {
        self.events.lock().push("paused");
    }
    fn resumed(&self) {
        self.events.lock().push("resumed");
    }
    fn stopped(&self) {
        self.events.lock().push("stopped");
    }
}

pub fn location(path: &str) -> RepositoryLocation {
    RepositoryLocation::parse(path).unwrap()
}

pub fn data(value: serde_json::Value) -> IoObject {
    IoObject::new(value)
}
