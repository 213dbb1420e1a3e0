//! # Breakpoint, Naming and Flow Filter Tests
//!
//! Property tests for blocking pause/resume and deterministic naming, plus
//! flow filter fan-out through a running process.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use common::{FakeOperator, ScriptedTree};
use opflow::breakpoint::BreakpointCoordinator;
use opflow::naming::NamingRegistry;
use opflow::state::StateMachine;
use opflow::{
    BreakpointLocation, FlowData, IoContainer, Operator, OperatorError, OperatorRef, Process, ProcessError,
    ProcessFlowFilter, ProcessState, RunRequest,
};

fn wait_for_blocked(coordinator: &BreakpointCoordinator, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while coordinator.blocked_threads() != expected {
        assert!(Instant::now() < deadline, "paused threads never blocked");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Coordinator over a running process. A fresh state machine is stopped.
fn running_coordinator() -> (Arc<StateMachine>, BreakpointCoordinator) {
    let state = Arc::new(StateMachine::new());
    let coordinator = BreakpointCoordinator::new(Arc::clone(&state));
    coordinator.resume();
    (state, coordinator)
}

// ============================================================================
// PAUSE / RESUME
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn spurious_wakes_never_release_a_paused_thread(wakes in 0usize..12) {
        let (state, coordinator) = running_coordinator();
        let operator: OperatorRef = FakeOperator::new("Apply Model");
        let released = AtomicBool::new(false);

        thread::scope(|scope| {
            scope.spawn(|| {
                coordinator.pause(&operator, &IoContainer::new(), BreakpointLocation::Before);
                released.store(true, Ordering::SeqCst);
            });

            wait_for_blocked(&coordinator, 1);
            for _ in 0..wakes {
                coordinator.wake_waiters();
            }
            thread::sleep(Duration::from_millis(2));
            assert!(!released.load(Ordering::SeqCst));
            assert_eq!(state.state(), ProcessState::Paused);

            coordinator.resume();
        });

        prop_assert!(released.load(Ordering::SeqCst));
        prop_assert_eq!(state.state(), ProcessState::Running);
        prop_assert_eq!(coordinator.blocked_threads(), 0);
    }
}

#[test]
fn stop_releases_every_paused_thread() {
    let (state, coordinator) = running_coordinator();
    let operator: OperatorRef = FakeOperator::new("Loop");

    thread::scope(|scope| {
        for _ in 0..3 {
            scope.spawn(|| {
                coordinator.pause(&operator, &IoContainer::new(), BreakpointLocation::After);
            });
        }
        wait_for_blocked(&coordinator, 3);
        coordinator.stop();
    });

    assert_eq!(state.state(), ProcessState::Stopped);
    assert_eq!(coordinator.blocked_threads(), 0);
}

// ============================================================================
// NAMING
// ============================================================================

fn register_all(names: &[String]) -> Vec<String> {
    let registry = NamingRegistry::new();
    names
        .iter()
        .map(|name| registry.register(name, FakeOperator::new(name)))
        .collect()
}

proptest! {
    #[test]
    fn naming_is_deterministic_and_unique(
        names in prop::collection::vec(
            prop::sample::select(vec!["Filter", "Filter (2)", "Join", "Join (7)", "Read"]),
            1..16,
        )
    ) {
        let names: Vec<String> = names.into_iter().map(str::to_string).collect();

        let first = register_all(&names);
        let second = register_all(&names);
        prop_assert_eq!(&first, &second);

        let mut unique = first.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), first.len());
    }
}

#[test]
fn process_renames_colliding_operators_on_construction() {
    let tree = ScriptedTree::new("Root", &["Filter", "Filter", "Filter (2)"]);
    let inner: Vec<_> = tree.inner.clone();

    let process = Process::new(Arc::new(tree));

    let names: Vec<String> = inner.iter().map(|op| op.name()).collect();
    assert_eq!(names, vec!["Filter", "Filter (2)", "Filter (3)"]);
    assert_eq!(
        process.all_operator_names(),
        vec!["Filter", "Filter (2)", "Filter (3)", "Root"]
    );
}

// ============================================================================
// FLOW FILTERS
// ============================================================================

#[derive(Default)]
struct Recording {
    tag: &'static str,
    calls: Arc<Mutex<Vec<String>>>,
    reject: Option<&'static str>,
}

impl ProcessFlowFilter for Recording {
    fn pre_operator(
        &self,
        previous: Option<&OperatorRef>,
        next: &OperatorRef,
        input: &[FlowData],
    ) -> Result<(), OperatorError> {
        if self.reject == Some(next.name().as_str()) {
            return Err(OperatorError::user_error(next.name(), 143, "rejected by filter"));
        }
        let previous = previous.map_or_else(|| "-".to_string(), |op| op.name());
        self.calls.lock().push(format!(
            "{} pre {}->{} ({})",
            self.tag,
            previous,
            next.name(),
            input.len()
        ));
        Ok(())
    }

    fn post_operator(
        &self,
        previous: &OperatorRef,
        next: Option<&OperatorRef>,
        output: &[FlowData],
    ) -> Result<(), OperatorError> {
        let next = next.map_or_else(|| "-".to_string(), |op| op.name());
        self.calls.lock().push(format!(
            "{} post {}->{} ({})",
            self.tag,
            previous.name(),
            next,
            output.len()
        ));
        Ok(())
    }
}

/// Tree that walks its inner operators in order, firing the flow filter hooks.
fn walking_tree(operators: &[&str]) -> Arc<ScriptedTree> {
    let tree = ScriptedTree::new("Root", operators);
    let order: Vec<OperatorRef> = tree.inner.iter().map(|op| op.clone() as OperatorRef).collect();
    Arc::new(tree.on_execute(move |process| {
        let mut previous: Option<&OperatorRef> = None;
        for (i, operator) in order.iter().enumerate() {
            let input = [FlowData::new("input", None)];
            process.fire_before_operator(previous, Some(operator), Some(&input))?;
            process.set_current_operator(Some(Arc::clone(operator)));
            process.fire_after_operator(Some(operator), order.get(i + 1), None)?;
            previous = Some(operator);
        }
        Ok(())
    }))
}

#[test]
fn filters_see_every_boundary_in_registration_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let process = Process::new(walking_tree(&["Read", "Train"]));
    let first: Arc<dyn ProcessFlowFilter> = Arc::new(Recording {
        tag: "a",
        calls: calls.clone(),
        ..Default::default()
    });
    let second: Arc<dyn ProcessFlowFilter> = Arc::new(Recording {
        tag: "b",
        calls: calls.clone(),
        ..Default::default()
    });
    assert!(process.add_flow_filter(first.clone()));
    assert!(process.add_flow_filter(second));
    assert!(!process.add_flow_filter(first));

    process.run(RunRequest::new()).unwrap();

    assert_eq!(
        *calls.lock(),
        vec![
            "a pre -->Read (1)",
            "b pre -->Read (1)",
            "a post Read->Train (0)",
            "b post Read->Train (0)",
            "a pre Read->Train (1)",
            "b pre Read->Train (1)",
            "a post Train->- (0)",
            "b post Train->- (0)",
        ]
    );
}

#[test]
fn filter_error_aborts_the_run() {
    let process = Process::new(walking_tree(&["Read", "Train"]));
    process.add_flow_filter(Arc::new(Recording {
        tag: "guard",
        reject: Some("Train"),
        ..Default::default()
    }));

    let err = process.run(RunRequest::new()).unwrap_err();

    assert!(err.is_user_error());
    assert!(matches!(err, ProcessError::Operator(_)));
    assert_eq!(process.state(), ProcessState::Stopped);
}

#[test]
fn removed_and_copied_filters() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let parent = Process::new(Arc::new(ScriptedTree::new("Parent", &[])));
    let filter: Arc<dyn ProcessFlowFilter> = Arc::new(Recording {
        tag: "x",
        calls: calls.clone(),
        ..Default::default()
    });
    parent.add_flow_filter(filter.clone());

    let child = Process::new(walking_tree(&["Nested"]));
    parent.copy_flow_filters_to(&child);
    assert_eq!(child.flow_filters().len(), 1);

    child.run(RunRequest::new()).unwrap();
    assert_eq!(calls.lock().len(), 2);

    assert!(child.remove_flow_filter(&filter));
    assert!(!child.remove_flow_filter(&filter));
    child.run(RunRequest::new()).unwrap();
    assert_eq!(calls.lock().len(), 2);
    assert_eq!(parent.flow_filters().len(), 1);
}

#[test]
fn missing_required_operator_is_invalid_argument() {
    let process = Process::new(Arc::new(ScriptedTree::new("Root", &[])));
    let root = process.root_operator();

    assert!(matches!(
        process.fire_before_operator(Some(&root), None, None),
        Err(OperatorError::InvalidArgument(_))
    ));
    assert!(matches!(
        process.fire_after_operator(None, Some(&root), None),
        Err(OperatorError::InvalidArgument(_))
    ));
    assert!(process.fire_before_operator(None, Some(&root), None).is_ok());
}
