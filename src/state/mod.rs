// State management module
//
// StateManager wraps RunState with thread-safe access using Arc<RwLock<T>> and
// emits change events so that stage code never writes to the console itself.

use crate::models::{FileStatus, RunState, RunSummary, Stage, StageTally};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Default broadcast buffer; one run can emit several events per file
pub const EVENT_BUFFER: usize = 4096;

/// Change events emitted while a run progresses
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A run with the named profile has started
    RunStarted { profile: String },

    /// A stage has started with `total` items to process
    StageStarted { stage: Stage, total: usize },

    /// One item of a stage has finished
    FileProcessed {
        stage: Stage,
        path: Utf8PathBuf,
        status: FileStatus,
        message: String,
    },

    /// Completed-item counter of the current stage moved
    ProgressUpdated {
        stage: Stage,
        completed: usize,
        total: usize,
        percent: u8,
    },

    /// A stage has finished
    StageFinished { stage: Stage, tally: StageTally },

    /// The run reached `Done`
    RunFinished { summary: RunSummary },

    /// The run was aborted before completing
    RunAborted { stage: Stage, reason: String },
}

impl StateChange {
    /// True for the last event of a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, StateChange::RunFinished { .. } | StateChange::RunAborted { .. })
    }
}

/// Thread-safe run state with event emission
///
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to changes
///
/// Per-file results come from concurrent stage tasks; the write lock makes
/// each counter increment and its progress event a single step.
pub struct StateManager {
    state: Arc<RwLock<RunState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (state_tx, _) = broadcast::channel(capacity);
        Self {
            state: Arc::new(RwLock::new(RunState::default())),
            state_tx,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> RunState {
        self.read_guard().clone()
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        f(&self.read_guard())
    }

    /// Update the state and emit the events implied by the change
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RunState),
    {
        let mut state = self.write_guard();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = detect_changes(&old_state, &state);
        for change in &changes {
            self.emit(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Reset state and announce a new run
    pub fn start_run(&self, profile: &str) -> Vec<StateChange> {
        self.update(|state| {
            state.reset();
            state.is_running = true;
            state.profile = Some(profile.to_string());
            state.summary.profile = profile.to_string();
        })
    }

    /// Enter `stage` with `total` items
    pub fn begin_stage(&self, stage: Stage, total: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.current_stage = Some(stage);
            state.stage_completed = 0;
            state.stage_total = total;
            state.summary.tallies.entry(stage).or_default();
        })
    }

    /// Record one finished item of `stage`
    ///
    /// Emits `FileProcessed` followed by `ProgressUpdated`.
    pub fn record_file(
        &self,
        stage: Stage,
        path: &Utf8Path,
        status: FileStatus,
        message: impl Into<String>,
    ) -> Vec<StateChange> {
        let mut state = self.write_guard();
        let old_state = state.clone();

        state.summary.tallies.entry(stage).or_default().record(status);
        if state.current_stage == Some(stage) {
            state.stage_completed += 1;
        }

        let file_event = StateChange::FileProcessed {
            stage,
            path: path.to_path_buf(),
            status,
            message: message.into(),
        };
        self.emit(file_event.clone());

        let mut changes = vec![file_event];
        for change in detect_changes(&old_state, &state) {
            self.emit(change.clone());
            changes.push(change);
        }
        changes
    }

    /// Leave `stage` and publish its tally
    pub fn finish_stage(&self, stage: Stage) -> StateChange {
        let tally = self.read(|s| s.summary.tally(stage));
        let event = StateChange::StageFinished { stage, tally };
        self.emit(event.clone());
        event
    }

    /// Note an extracted tree left in place for diagnosis
    pub fn preserve_tree(&self, tree: &Utf8Path) {
        self.write_guard().summary.preserved_trees.push(tree.to_path_buf());
    }

    pub fn set_missing_hashes(&self, missing: Vec<String>) {
        self.write_guard().summary.missing_hashes = missing;
    }

    /// End the run successfully and publish the summary
    pub fn finish_run(&self) -> RunSummary {
        let summary = {
            let mut state = self.write_guard();
            state.is_running = false;
            state.current_stage = None;
            state.summary.clone()
        };
        self.emit(StateChange::RunFinished {
            summary: summary.clone(),
        });
        summary
    }

    /// End the run at `stage` without completing it
    pub fn abort_run(&self, stage: Stage, reason: impl Into<String>) -> StateChange {
        {
            let mut state = self.write_guard();
            state.is_running = false;
            state.current_stage = None;
        }
        let event = StateChange::RunAborted {
            stage,
            reason: reason.into(),
        };
        self.emit(event.clone());
        event
    }

    fn emit(&self, change: StateChange) {
        // No subscribers is fine
        let _ = self.state_tx.send(change);
    }

    // A panic while holding the lock only poisons progress bookkeeping, so
    // keep using the inner value.
    fn read_guard(&self) -> RwLockReadGuard<'_, RunState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Events implied by the difference between two states
fn detect_changes(old: &RunState, new: &RunState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if !old.is_running && new.is_running {
        changes.push(StateChange::RunStarted {
            profile: new.profile.clone().unwrap_or_default(),
        });
    }

    if let Some(stage) = new.current_stage {
        if old.current_stage != new.current_stage {
            changes.push(StateChange::StageStarted {
                stage,
                total: new.stage_total,
            });
        } else if old.stage_completed != new.stage_completed {
            changes.push(StateChange::ProgressUpdated {
                stage,
                completed: new.stage_completed,
                total: new.stage_total,
                percent: new.percent(),
            });
        }
    }

    changes
}
