//! Run control: cancellation and pause flags shared with the migrate loop.
//!
//! The coordinator owns a table of in-flight runs addressed by run id. The
//! migrate loop polls its [`RunControl`] only at suspension points (between
//! modules and between attempts); a sandbox or generator call already in
//! flight is never interrupted.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::info;

/// Shared flags for one run.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.pause.store(paused, Ordering::SeqCst);
    }

    /// Block while paused, waking on cancellation.
    ///
    /// Returns true when the run may continue, false when it was cancelled
    /// while waiting.
    pub fn wait_if_paused(&self) -> bool {
        while self.pause.load(Ordering::SeqCst) {
            if self.is_cancelled() {
                return false;
            }
            thread::sleep(Duration::from_millis(50));
        }
        !self.is_cancelled()
    }
}

/// Coordinator-owned table of in-flight runs.
#[derive(Debug, Default)]
pub struct RunTable {
    runs: HashMap<String, RunControl>,
}

impl RunTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run and hand back its control flags.
    pub fn register(&mut self, run_id: &str) -> RunControl {
        let control = RunControl::new();
        self.runs.insert(run_id.to_string(), control.clone());
        control
    }

    pub fn get(&self, run_id: &str) -> Option<&RunControl> {
        self.runs.get(run_id)
    }

    /// Request cancellation; returns false for unknown run ids.
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.runs.get(run_id) {
            Some(control) => {
                info!(run_id, "cancellation requested");
                control.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a finished run from the table.
    pub fn remove(&mut self, run_id: &str) {
        self.runs.remove(run_id);
    }
}
