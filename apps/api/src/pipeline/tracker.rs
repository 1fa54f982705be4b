//! Progress Log / State Tracker: the single lock-guarded owner of the current
//! task and its bounded progress log.
//!
//! Every transition, append and snapshot takes the same mutex, so pollers
//! always observe a consistent `{logs, status, state, task}` tuple and never a
//! half-updated buffer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pipeline::types::{PipelineError, StageId, TaskState};

/// Progress messages kept for the current task; older ones are dropped.
pub const LOG_CAPACITY: usize = 1000;

const READY_STATUS: &str = "Ready";
const STARTING_STATUS: &str = "Starting...";

/// Identifies one task execution. A sink or completion carrying a stale run id
/// (the task was detached by a reset) is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunId(Uuid);

/// Point-in-time view returned to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub logs: Vec<String>,
    /// Latest message, or "Ready" after a reset.
    pub status: String,
    pub task_state: TaskState,
    pub active_task: Option<StageId>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct TrackerInner {
    logs: VecDeque<String>,
    status: String,
    state: TaskState,
    active_task: Option<StageId>,
    run: Option<RunId>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TrackerInner {
    fn idle() -> Self {
        Self {
            logs: VecDeque::new(),
            status: READY_STATUS.to_string(),
            state: TaskState::Idle,
            active_task: None,
            run: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn push(&mut self, message: String, capacity: usize) {
        self.status.clone_from(&message);
        self.logs.push_back(message);
        while self.logs.len() > capacity {
            self.logs.pop_front();
        }
    }

    fn clear_for(&mut self, stage: StageId, run: Option<RunId>) {
        self.logs.clear();
        self.status = STARTING_STATUS.to_string();
        self.active_task = Some(stage);
        self.run = run;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
    }
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct TaskTracker {
    inner: Arc<Mutex<TrackerInner>>,
    capacity: usize,
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerInner::idle())),
            capacity: capacity.max(1),
        }
    }

    // A panic while holding the lock cannot leave the buffer half-written
    // (each critical section is a handful of field writes), so poisoning is
    // not fatal here.
    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomic copy of the current state.
    pub fn snapshot(&self) -> TaskSnapshot {
        let inner = self.lock();
        TaskSnapshot {
            logs: inner.logs.iter().cloned().collect(),
            status: inner.status.clone(),
            task_state: inner.state,
            active_task: inner.active_task,
            started_at: inner.started_at,
            finished_at: inner.finished_at,
        }
    }

    /// Back to IDLE from any state. A task still running is detached: its
    /// later progress and completion are discarded.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if let (TaskState::Running, Some(stage)) = (inner.state, inner.active_task) {
            warn!(stage = %stage, "Reset while running; detaching task");
        }
        *inner = TrackerInner::idle();
    }

    /// Single-flight gate. Under the lock:
    /// - RUNNING → `Busy`, nothing touched;
    /// - `precheck` fails → ERROR with the failure as the only log line (never RUNNING);
    /// - otherwise → log cleared, RUNNING, new run id.
    ///
    /// `precheck` runs while the lock is held, so snapshot pollers wait on it.
    /// Contract resolution only does `is_file` metadata lookups there, which
    /// keeps the wait short even though they are blocking calls.
    pub(crate) fn try_begin<T>(
        &self,
        stage: StageId,
        precheck: impl FnOnce() -> Result<T, PipelineError>,
    ) -> Result<(RunId, T), PipelineError> {
        let mut inner = self.lock();

        if let (TaskState::Running, Some(running)) = (inner.state, inner.active_task) {
            info!(requested = %stage, running = %running, "Stage rejected: busy");
            return Err(PipelineError::Busy { running });
        }

        match precheck() {
            Ok(value) => {
                let run = RunId(Uuid::new_v4());
                inner.clear_for(stage, Some(run));
                inner.state = TaskState::Running;
                inner.push(format!("--- Starting {stage} ---"), self.capacity);
                info!(stage = %stage, "Task started");
                Ok((run, value))
            }
            Err(err) => {
                inner.clear_for(stage, None);
                inner.state = TaskState::Error;
                inner.finished_at = inner.started_at;
                inner.push(format!("ERROR: {err}"), self.capacity);
                warn!(stage = %stage, "Task refused: {err}");
                Err(err)
            }
        }
    }

    /// Terminal transition for `run`. Returns false when the run was detached
    /// (reset or superseded) and the outcome was dropped.
    pub(crate) fn finish(&self, run: RunId, outcome: Result<(), PipelineError>) -> bool {
        let mut inner = self.lock();
        if inner.run != Some(run) || inner.state != TaskState::Running {
            return false;
        }
        let stage = inner
            .active_task
            .map(|s| s.to_string())
            .unwrap_or_default();

        match outcome {
            Ok(()) => {
                inner.state = TaskState::Completed;
                inner.push(format!("--- Finished {stage} ---"), self.capacity);
                info!(stage = %stage, "Task completed");
            }
            Err(err) => {
                inner.state = TaskState::Error;
                inner.push(format!("ERROR: {err}"), self.capacity);
                error!(stage = %stage, "Task failed: {err}");
            }
        }
        inner.finished_at = Some(Utc::now());
        true
    }

    /// Progress callback bound to `run`.
    pub(crate) fn sink(&self, run: RunId, stage: StageId) -> ProgressSink {
        ProgressSink {
            tracker: self.clone(),
            run,
            stage,
        }
    }

    fn append_for(&self, run: RunId, message: String) -> bool {
        let mut inner = self.lock();
        if inner.run != Some(run) || inner.state != TaskState::Running {
            return false;
        }
        inner.push(message, self.capacity);
        true
    }
}

/// The only handle stage code gets on the log: append-only, and only while
/// its own run is the running one.
#[derive(Clone)]
pub struct ProgressSink {
    tracker: TaskTracker,
    run: RunId,
    stage: StageId,
}

impl ProgressSink {
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(stage = %self.stage, "{message}");
        if !self.tracker.append_for(self.run, message) {
            tracing::debug!(stage = %self.stage, "Dropped progress from detached task");
        }
    }
}
