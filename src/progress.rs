//! Background task with progress reporting
//!
//! Runs one closure on a scoped worker thread. The caller blocks until the
//! worker finishes; if that takes longer than the display delay, the
//! [`ProgressObserver`] is told the task should become visible.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Shared progress counters of a running task.
#[derive(Debug, Default)]
pub struct TaskProgress {
    total: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicBool,
}

impl TaskProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Count one unit of work as done.
    pub fn step(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Ask the job to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// UI hook for long-running tasks.
pub trait ProgressObserver: Send + Sync {
    /// The task outlived the display delay. Observers may keep the handle to cancel it.
    fn on_visible(&self, task: &str, progress: &Arc<TaskProgress>);

    fn on_finished(&self, _task: &str) {}
}

/// Observer that shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn on_visible(&self, _task: &str, _progress: &Arc<TaskProgress>) {}
}

#[derive(Debug, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Cancelled,
    /// The worker panicked or could not be started.
    Panicked(String),
}

/// Sets the done flag even if the job unwinds.
struct DoneSignal<'a> {
    done: &'a (Mutex<bool>, Condvar),
}

impl Drop for DoneSignal<'_> {
    fn drop(&mut self) {
        let (flag, changed) = self.done;
        *flag.lock() = true;
        changed.notify_all();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "worker panicked".to_string()
    }
}

pub struct BackgroundTask {
    name: String,
    display_delay: Duration,
    observer: Arc<dyn ProgressObserver>,
    progress: Arc<TaskProgress>,
}

impl BackgroundTask {
    pub fn new(name: impl Into<String>, display_delay: Duration, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            name: name.into(),
            display_delay,
            observer,
            progress: Arc::new(TaskProgress::new()),
        }
    }

    pub fn progress(&self) -> &Arc<TaskProgress> {
        &self.progress
    }

    /// Run `job` on a worker thread and wait for it.
    pub fn run<T, F>(self, job: F) -> TaskOutcome<T>
    where
        T: Send,
        F: FnOnce(&TaskProgress) -> T + Send,
    {
        let done = (Mutex::new(false), Condvar::new());
        let progress = &*self.progress;

        let joined = thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name(format!("opflow-{}", self.name))
                .spawn_scoped(scope, || {
                    let _signal = DoneSignal { done: &done };
                    job(progress)
                });
            let worker = match worker {
                Ok(worker) => worker,
                Err(e) => return Err(format!("failed to start worker: {e}")),
            };

            let (flag, changed) = &done;
            let mut finished = flag.lock();
            let waited = changed.wait_while_for(&mut finished, |done| !*done, self.display_delay);
            if waited.timed_out() {
                debug!(task = %self.name, "background task became visible");
                self.observer.on_visible(&self.name, &self.progress);
                changed.wait_while(&mut finished, |done| !*done);
            }
            drop(finished);

            worker.join().map_err(panic_message)
        });
        self.observer.on_finished(&self.name);

        match joined {
            Ok(_) if self.progress.is_cancelled() => TaskOutcome::Cancelled,
            Ok(value) => TaskOutcome::Completed(value),
            Err(message) => TaskOutcome::Panicked(message),
        }
    }
}
