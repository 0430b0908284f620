// State management module
//
// StateManager wraps AppState behind Arc<RwLock<T>> and broadcasts change
// events to observers (frontend views and tests).

use crate::models::{AppState, InstallOutcome, InstallSummary, SessionState};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Capacity of the change channel. Install progress ticks once per 4 KiB
/// block, so slow observers lag rather than block the installer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change events emitted when state is modified.
///
/// Events are queued: they are delivered to subscribers after the state
/// update that produced them has been committed, in emission order.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// An install batch has started
    InstallStarted {
        total_packages: usize,
        total_blocks: u64,
    },

    /// Block-level copy progress
    InstallProgress { blocks_done: u64, blocks_total: u64 },

    /// The package currently being installed changed
    CurrentPackageChanged { package: Option<String> },

    /// A package has received its outcome
    PackageProcessed {
        package: String,
        outcome: InstallOutcome,
    },

    /// The install batch has finished or was cancelled
    InstallFinished { summary: InstallSummary },

    /// Session lifecycle transition
    SessionStateChanged {
        from: SessionState,
        to: SessionState,
    },

    /// Loading screen progress reported by the worker
    LoadProgress {
        stage: Option<String>,
        value: u64,
        total: u64,
    },

    /// The worker entered or left debug mode
    DebugModeChanged { active: bool },

    WindowTitleChanged { title: String },

    StatusMessageChanged { message: String },

    SleepInhibitionChanged { inhibited: bool },

    RecentFilesChanged { count: usize },

    /// Cached game list metadata was discarded
    GameListInvalidated,

    /// Settings have been reloaded or edited
    SettingsChanged,

    /// Install state has been reset
    StateReset,
}

/// Thread-safe state manager with event emission.
///
/// - [`read()`](Self::read) for reading state under a short read lock
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// # Related Types
///
/// - [`crate::models::AppState`]: The underlying state structure
/// - [`crate::ui::SessionController`]: The only writer in the application
pub struct StateManager {
    state: Arc<RwLock<AppState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the entire state.
    pub fn snapshot(&self) -> AppState {
        self.read_lock().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let live = state_manager.read(|state| state.is_session_live());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.read_lock();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let changes = {
            let mut state = self.write_lock();
            let old_state = state.clone();
            update_fn(&mut state);
            Self::detect_changes(&old_state, &state)
        };

        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Emit an event that is not derived from a field diff.
    fn emit(&self, change: StateChange) -> StateChange {
        let _ = self.state_tx.send(change.clone());
        change
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_installing != new.is_installing {
            if new.is_installing {
                changes.push(StateChange::InstallStarted {
                    total_packages: new.packages_total,
                    total_blocks: new.install_blocks_total,
                });
            } else {
                changes.push(StateChange::InstallFinished {
                    summary: new.install_summary(),
                });
            }
        }

        if old.install_blocks_done != new.install_blocks_done
            || old.install_blocks_total != new.install_blocks_total
        {
            changes.push(StateChange::InstallProgress {
                blocks_done: new.install_blocks_done,
                blocks_total: new.install_blocks_total,
            });
        }

        if old.current_package != new.current_package {
            changes.push(StateChange::CurrentPackageChanged {
                package: new.current_package.clone(),
            });
        }

        if old.session_state != new.session_state {
            changes.push(StateChange::SessionStateChanged {
                from: old.session_state,
                to: new.session_state,
            });
        }

        if old.load_stage != new.load_stage
            || old.load_value != new.load_value
            || old.load_total != new.load_total
        {
            changes.push(StateChange::LoadProgress {
                stage: new.load_stage.clone(),
                value: new.load_value,
                total: new.load_total,
            });
        }

        if old.debug_mode != new.debug_mode {
            changes.push(StateChange::DebugModeChanged {
                active: new.debug_mode,
            });
        }

        if old.window_title != new.window_title {
            changes.push(StateChange::WindowTitleChanged {
                title: new.window_title.clone(),
            });
        }

        if old.status_message != new.status_message {
            changes.push(StateChange::StatusMessageChanged {
                message: new.status_message.clone(),
            });
        }

        if old.sleep_inhibited != new.sleep_inhibited {
            changes.push(StateChange::SleepInhibitionChanged {
                inhibited: new.sleep_inhibited,
            });
        }

        if old.recent_files != new.recent_files {
            changes.push(StateChange::RecentFilesChanged {
                count: new.recent_files.len(),
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Begin an install batch
    pub fn start_install(&self, total_packages: usize, total_blocks: u64) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_install_state();
            state.is_installing = true;
            state.packages_total = total_packages;
            state.install_blocks_total = total_blocks;
        })
    }

    /// Add copied blocks to the progress counter.
    ///
    /// Called once per block, so this skips the clone-and-diff in
    /// [`update()`](Self::update) and emits the single progress event directly.
    pub fn advance_install_progress(&self, blocks: u64) -> StateChange {
        let change = {
            let mut state = self.write_lock();
            state.install_blocks_done += blocks;
            StateChange::InstallProgress {
                blocks_done: state.install_blocks_done,
                blocks_total: state.install_blocks_total,
            }
        };
        self.emit(change)
    }

    pub fn set_current_package(&self, package: Option<String>) -> Vec<StateChange> {
        self.update(|state| state.current_package = package)
    }

    /// Record a package's outcome
    pub fn add_install_result(&self, package: String, outcome: InstallOutcome) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.add_install_result(package.clone(), outcome);
        });
        changes.push(self.emit(StateChange::PackageProcessed { package, outcome }));
        changes
    }

    pub fn finish_install(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_installing = false;
            state.current_package = None;
        })
    }

    pub fn reset_install_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset_install_state());
        changes.push(self.emit(StateChange::StateReset));
        changes
    }

    /// Mirror the controller's session into the displayed state.
    pub fn set_session_state(
        &self,
        session_state: SessionState,
        title_id: u64,
        path: Option<Utf8PathBuf>,
        auto_paused: bool,
    ) -> Vec<StateChange> {
        self.update(|state| {
            state.session_state = session_state;
            state.session_title_id = title_id;
            state.session_path = path;
            state.auto_paused = auto_paused;
            if session_state == SessionState::Idle {
                state.debug_mode = false;
                state.load_stage = None;
                state.load_value = 0;
                state.load_total = 0;
            }
        })
    }

    pub fn set_load_progress(&self, stage: Option<String>, value: u64, total: u64) -> Vec<StateChange> {
        self.update(|state| {
            state.load_stage = stage;
            state.load_value = value;
            state.load_total = total;
        })
    }

    pub fn set_debug_mode(&self, active: bool) -> Vec<StateChange> {
        self.update(|state| state.debug_mode = active)
    }

    pub fn set_window_title(&self, title: String) -> Vec<StateChange> {
        self.update(|state| state.window_title = title)
    }

    pub fn set_status_message(&self, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        self.update(|state| state.status_message = message)
    }

    pub fn set_sleep_inhibited(&self, inhibited: bool) -> Vec<StateChange> {
        self.update(|state| state.sleep_inhibited = inhibited)
    }

    pub fn set_recent_files(&self, files: Vec<Utf8PathBuf>) -> Vec<StateChange> {
        self.update(|state| state.recent_files = files)
    }

    pub fn notify_game_list_invalidated(&self) -> StateChange {
        self.emit(StateChange::GameListInvalidated)
    }

    pub fn notify_settings_changed(&self) -> StateChange {
        self.emit(StateChange::SettingsChanged)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
