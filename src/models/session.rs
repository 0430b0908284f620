use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of the emulated program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Running,
    Paused,
    Stopping,
}

impl SessionState {
    /// Whether `self -> to` is an edge of the lifecycle graph.
    ///
    /// `Running/Paused -> Stopping` is listed here but is only reachable
    /// through [`Session::begin_stop`], which requires a stop reason.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Loading)
                | (Loading, Idle)
                | (Loading, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopping)
                | (Paused, Stopping)
                | (Stopping, Idle)
        )
    }

    /// A session occupies the worker in these states.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Running | SessionState::Paused)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Whether a boot applies the per-title settings overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartGameType {
    #[default]
    Normal,
    /// Forced global configuration, used when restarting.
    Global,
}

/// Who asked the session to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    User,
    FatalError,
    WindowClosed,
    /// The program ended on its own.
    ProgramExited,
    /// Torn down so another boot can proceed.
    Replaced,
}

/// Everything needed to start a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRequest {
    pub path: Utf8PathBuf,
    pub program_index: usize,
    pub start_type: StartGameType,
    pub user_index: Option<usize>,
}

impl BootRequest {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            program_index: 0,
            start_type: StartGameType::Normal,
            user_index: None,
        }
    }

    pub fn with_program_index(mut self, program_index: usize) -> Self {
        self.program_index = program_index;
        self
    }

    pub fn with_start_type(mut self, start_type: StartGameType) -> Self {
        self.start_type = start_type;
        self
    }

    pub fn with_user(mut self, user_index: usize) -> Self {
        self.user_index = Some(user_index);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// One emulated program run.
///
/// Only the controller owns a `Session`. Every state change goes through the
/// methods here so the lifecycle graph is enforced in one place.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: SessionState,
    path: Option<Utf8PathBuf>,
    program_index: usize,
    user_index: Option<usize>,
    title_id: u64,
    fatal_error: bool,
    auto_paused: bool,
    stop_reason: Option<StopReason>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn program_index(&self) -> usize {
        self.program_index
    }

    pub fn user_index(&self) -> Option<usize> {
        self.user_index
    }

    pub fn title_id(&self) -> u64 {
        self.title_id
    }

    pub fn fatal_error(&self) -> bool {
        self.fatal_error
    }

    pub fn auto_paused(&self) -> bool {
        self.auto_paused
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    fn transition(&mut self, to: SessionState) -> Result<SessionState, InvalidTransition> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(InvalidTransition { from, to });
        }
        self.state = to;
        tracing::debug!("Session {} -> {}", from, to);
        Ok(from)
    }

    /// `Idle -> Loading` for a new target.
    pub fn begin_load(&mut self, request: &BootRequest) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Loading)?;
        self.path = Some(request.path.clone());
        self.program_index = request.program_index;
        self.user_index = request.user_index;
        self.title_id = 0;
        self.fatal_error = false;
        self.auto_paused = false;
        self.stop_reason = None;
        Ok(())
    }

    /// `Loading -> Running` once the core is up.
    pub fn finish_load(&mut self, title_id: u64) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Running)?;
        self.title_id = title_id;
        Ok(())
    }

    /// `Loading -> Idle`; nothing of the attempted boot is kept.
    pub fn fail_load(&mut self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Idle)?;
        self.clear();
        Ok(())
    }

    /// `Running -> Paused`. `auto` marks a pause the frontend initiated itself.
    pub fn pause(&mut self, auto: bool) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Paused)?;
        self.auto_paused = auto;
        Ok(())
    }

    /// `Paused -> Running`.
    pub fn resume(&mut self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Running)?;
        self.auto_paused = false;
        Ok(())
    }

    /// `Running/Paused -> Stopping`.
    pub fn begin_stop(&mut self, reason: StopReason) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Stopping)?;
        self.stop_reason = Some(reason);
        if reason == StopReason::FatalError {
            self.fatal_error = true;
        }
        Ok(())
    }

    /// `Stopping -> Idle`.
    pub fn finish_stop(&mut self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Idle)?;
        self.clear();
        Ok(())
    }

    pub fn mark_fatal(&mut self) {
        self.fatal_error = true;
    }

    pub fn clear_fatal(&mut self) {
        self.fatal_error = false;
    }

    fn clear(&mut self) {
        self.path = None;
        self.program_index = 0;
        self.user_index = None;
        self.title_id = 0;
        self.auto_paused = false;
    }
}

/// Metadata shown in the window title while a program runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleDisplay {
    pub name: String,
    pub version: String,
    pub is_64bit: bool,
    pub gpu_vendor: String,
}

impl TitleDisplay {
    /// Fall back to the file stem when the control data carries no name.
    pub fn new(name: &str, path: &Utf8Path, version: &str, is_64bit: bool, gpu_vendor: &str) -> Self {
        let name = if name.trim().is_empty() {
            path.file_stem().unwrap_or(path.as_str()).to_string()
        } else {
            name.to_string()
        };
        Self {
            name,
            version: version.to_string(),
            is_64bit,
            gpu_vendor: gpu_vendor.to_string(),
        }
    }
}

pub fn format_window_title(base: &str, title: Option<&TitleDisplay>) -> String {
    match title {
        None => base.to_string(),
        Some(t) => {
            let arch = if t.is_64bit { "64-bit" } else { "32-bit" };
            format!("{base} | {} ({arch}) | {} | {}", t.name, t.version, t.gpu_vendor)
        }
    }
}
