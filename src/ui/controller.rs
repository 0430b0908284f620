// Session Controller - owns the session and drives installs
//
// This module contains the SessionController which coordinates between:
// - Session (lifecycle state machine) and its EmuThread worker
// - InstallPipeline (running on the tokio blocking pool via EventLoopBridge)
// - StateManager (observable state for whatever frontend is attached)
// - Operator (every decision that needs a human)
//
// The controller is single-threaded: all methods take &mut self and are
// called from one coordinating thread. Worker notifications queue up on a
// channel and are handled by pump_events().

use crate::config::ConfigManager;
use crate::metrics::Metrics;
use crate::models::{
    BootRequest, ContainerKind, ContentTitleType, InstallBatch, InstallSummary,
    InstalledEntryType, InvalidTransition, Session, SessionState, Settings, StartGameType,
    StopReason, TitleDisplay, base_title_id, format_window_title, update_title_id,
};
use crate::services::content_store::{ContentStores, InstallPolicy};
use crate::services::emu_thread::{EmuThread, WorkerEvent};
use crate::services::game_list::GameListCache;
use crate::services::headless::HeadlessLoaderFactory;
use crate::services::install::{InstallError, InstallPipeline};
use crate::services::loader::{
    ControlData, LoadError, LoaderFactory, MetadataError, RuntimeError, SaveDataKind,
    SystemStatus, save_data_dir,
};
use crate::services::package::{FsPackageReader, PackageReader};
use crate::services::power::{LoggingSleepInhibitor, SleepInhibitor};
use crate::state::StateManager;
use crate::ui::bridge::EventLoopBridge;
use crate::ui::prompts::{FatalErrorChoice, HeadlessOperator, Operator, OperatorTitlePrompt};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc, watch};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("No program is running")]
    NoSession,

    #[error("The running program holds an exit lock")]
    ExitLocked,

    #[error("Boot cancelled")]
    Cancelled,

    #[error("Title {0:016X} is in use by the running program")]
    TitleInUse(u64),

    #[error("File not found: {0}")]
    FileNotFound(Utf8PathBuf),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Failed to start emulation thread: {0}")]
    Worker(#[from] std::io::Error),
}

/// Back ends the controller drives.
pub struct ControllerServices {
    pub stores: ContentStores,
    pub reader: Arc<dyn PackageReader>,
    pub loaders: Arc<dyn LoaderFactory>,
    pub operator: Arc<dyn Operator>,
    pub sleep: Arc<dyn SleepInhibitor>,
}

impl ControllerServices {
    /// Filesystem stores and reader, the headless loader, and an operator
    /// that answers from `settings`.
    pub fn headless(settings: &Settings, data_dir: &Utf8Path) -> Self {
        Self {
            stores: ContentStores::open_fs(&settings.paths, data_dir),
            reader: Arc::new(FsPackageReader::new()),
            loaders: Arc::new(HeadlessLoaderFactory::new()),
            operator: Arc::new(HeadlessOperator::from_settings(settings)),
            sleep: Arc::new(LoggingSleepInhibitor::new()),
        }
    }
}

/// Cancels the running install batch from any thread.
#[derive(Debug, Clone)]
pub struct InstallCancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl InstallCancelHandle {
    pub fn cancel(&self) {
        tracing::info!("Install cancellation requested");
        self.tx.send_replace(true);
    }
}

/// Owns the one live [`Session`] and everything it touches.
pub struct SessionController {
    state: StateManager,
    config: ConfigManager,
    data_dir: Utf8PathBuf,

    /// Settings in effect outside a title overlay, including command-line
    /// and environment overrides
    global_settings: Settings,

    /// What `settings.yaml` holds; the only settings ever written back
    stored_settings: Settings,

    /// Settings in effect: global, or the running title's overlay
    active_settings: Settings,

    stores: ContentStores,
    reader: Arc<dyn PackageReader>,
    loaders: Arc<dyn LoaderFactory>,
    operator: Arc<dyn Operator>,
    sleep: Arc<dyn SleepInhibitor>,
    game_list: GameListCache,
    bridge: EventLoopBridge,
    metrics: Arc<Metrics>,

    install_permits: Arc<Semaphore>,
    cancel_tx: Arc<watch::Sender<bool>>,

    session: Session,
    emu_thread: Option<EmuThread>,

    /// Events from the current session's worker; replaced on every boot so
    /// stale notices from a torn-down worker are never seen.
    worker_rx: Option<mpsc::UnboundedReceiver<WorkerEvent>>,

    last_boot: Option<BootRequest>,
    base_title: String,
}

impl SessionController {
    pub fn new(
        config: ConfigManager,
        settings: Settings,
        services: ControllerServices,
        tokio_handle: tokio::runtime::Handle,
    ) -> Self {
        let data_dir = config.config_dir().to_path_buf();
        let game_list = GameListCache::new(&settings.paths.cache(&data_dir));
        let (cancel_tx, _) = watch::channel(false);
        let base_title = format!("{} {}", crate::APP_NAME, crate::VERSION);

        let state = StateManager::new();
        state.set_window_title(base_title.clone());
        state.set_recent_files(settings.recent_files.clone());

        tracing::info!("Session controller initialized (data dir {})", data_dir);

        Self {
            state,
            config,
            data_dir,
            active_settings: settings.clone(),
            stored_settings: settings.clone(),
            global_settings: settings,
            stores: services.stores,
            reader: services.reader,
            loaders: services.loaders,
            operator: services.operator,
            sleep: services.sleep,
            game_list,
            bridge: EventLoopBridge::new(tokio_handle),
            metrics: Arc::new(Metrics::new()),
            install_permits: Arc::new(Semaphore::new(crate::models::MAX_CONCURRENT_INSTALLS)),
            cancel_tx: Arc::new(cancel_tx),
            session: Session::new(),
            emu_thread: None,
            worker_rx: None,
            last_boot: None,
            base_title,
        }
    }

    pub fn with_bridge(mut self, bridge: EventLoopBridge) -> Self {
        self.bridge = bridge;
        self
    }

    /// Persist `stored` instead of the settings passed to [`new`](Self::new),
    /// keeping one-shot overrides out of `settings.yaml`.
    pub fn with_stored_settings(mut self, stored: Settings) -> Self {
        self.stored_settings = stored;
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Settings in effect for the running title.
    pub fn settings(&self) -> &Settings {
        &self.active_settings
    }

    pub fn global_settings(&self) -> &Settings {
        &self.global_settings
    }

    pub fn cancel_handle(&self) -> InstallCancelHandle {
        InstallCancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    pub fn is_exit_locked(&self) -> bool {
        self.emu_thread.as_ref().is_some_and(EmuThread::exit_locked)
    }

    fn running_title(&self) -> Option<u64> {
        self.session
            .state()
            .is_active()
            .then(|| self.session.title_id())
    }

    fn publish_session(&self) {
        self.state.set_session_state(
            self.session.state(),
            self.session.title_id(),
            self.session.path().map(Utf8Path::to_path_buf),
            self.session.auto_paused(),
        );
    }

    fn persist_settings(&self) {
        if let Err(e) = self.config.save_settings(&self.stored_settings) {
            tracing::warn!("Failed to save settings: {:#}", e);
        }
    }

    fn invalidate_game_list(&self) {
        if let Err(e) = self.game_list.invalidate() {
            tracing::warn!("{:#}", e);
        }
        self.state.notify_game_list_invalidated();
    }

    /// Replace the global settings, persist them, and apply them unless a
    /// title overlay is in effect.
    pub fn update_settings(&mut self, settings: Settings) {
        if self.session.is_idle() {
            self.active_settings = settings.clone();
        }
        self.stored_settings = settings.clone();
        self.global_settings = settings;
        self.persist_settings();
        self.state
            .set_recent_files(self.global_settings.recent_files.clone());
        self.state.notify_settings_changed();
    }

    // Install

    /// Install `paths` as one batch.
    ///
    /// The batch runs on the blocking pool while this thread keeps pumping
    /// worker events. Unsupported extensions are dropped from the batch.
    pub fn install_files<P: AsRef<Utf8Path>>(
        &mut self,
        paths: &[P],
    ) -> Result<InstallSummary, InstallError> {
        let mut batch = InstallBatch::from_paths(paths.iter().map(|p| p.as_ref().to_path_buf()));
        if batch.is_empty() {
            return Err(InstallError::NoFiles);
        }

        let permit = Arc::clone(&self.install_permits)
            .try_acquire_owned()
            .map_err(|_| {
                tracing::warn!("Install requested while another batch is running");
                InstallError::Busy
            })?;

        self.cancel_tx.send_replace(false);
        let cancel_rx = self.cancel_tx.subscribe();

        let pipeline = InstallPipeline::new(
            self.stores.clone(),
            Arc::clone(&self.reader),
            self.state.clone(),
            Arc::clone(&self.metrics),
        )
        .with_policy(InstallPolicy::from(&self.global_settings.install))
        .with_default_nca_title_type(self.global_settings.install.default_nca_title_type)
        .with_running_title(self.running_title());
        let prompt = OperatorTitlePrompt(Arc::clone(&self.operator));
        let bridge = self.bridge.clone();

        let summary = bridge
            .run_blocking(
                move || {
                    let _permit = permit;
                    pipeline.run(&mut batch, &prompt, &cancel_rx)
                },
                || {
                    self.pump_events();
                },
            )
            .map_err(|e| InstallError::Task(e.to_string()))?;

        if summary.has_base_rejections() {
            self.operator.warn_base_install(&summary);
        }
        self.operator.show_install_results(&summary);
        self.state
            .set_status_message(format!("Install finished: {summary}"));
        self.invalidate_game_list();

        Ok(summary)
    }

    /// Clear the last batch's progress and per-package results once the
    /// operator has dismissed them. Ignored while a batch runs.
    pub fn dismiss_install_results(&self) -> bool {
        if self.state.read(|s| s.is_installing) {
            return false;
        }
        self.state.reset_install_state();
        true
    }

    /// Remove installed content for `program_id`. Returns the number of
    /// store entries removed.
    pub fn remove_installed_entry(
        &mut self,
        entry_type: InstalledEntryType,
        program_id: u64,
    ) -> Result<usize, SessionError> {
        if self.running_title() == Some(program_id) {
            return Err(SessionError::TitleInUse(program_id));
        }
        if !self.operator.confirm_remove_entry(entry_type, program_id) {
            return Ok(0);
        }

        let removed = match entry_type {
            InstalledEntryType::Game => {
                self.remove_title(program_id)
                    + self.remove_title(update_title_id(program_id))
                    + self.remove_add_ons(program_id)
            }
            InstalledEntryType::Update => self.remove_title(update_title_id(program_id)),
            InstalledEntryType::AddOnContent => self.remove_add_ons(program_id),
        };

        if removed == 0 {
            tracing::warn!("No installed {:?} found for {:016X}", entry_type, program_id);
            self.state.set_status_message(format!(
                "No installed {entry_type:?} found for {program_id:016X}"
            ));
        } else {
            tracing::info!("Removed {} entries for {:016X}", removed, program_id);
            self.state.set_status_message(format!(
                "Removed {removed} installed entries for {program_id:016X}"
            ));
        }
        self.invalidate_game_list();

        Ok(removed)
    }

    /// User NAND first, then SD.
    fn remove_title(&self, title_id: u64) -> usize {
        usize::from(
            self.stores
                .removable()
                .iter()
                .any(|store| store.remove_existing_entry(title_id)),
        )
    }

    fn remove_add_ons(&self, program_id: u64) -> usize {
        let mut add_ons: Vec<u64> = self
            .stores
            .removable()
            .iter()
            .flat_map(|store| store.list_entries())
            .filter(|entry| {
                entry.title_type == ContentTitleType::AddOnContent
                    && base_title_id(entry.title_id) == program_id
            })
            .map(|entry| entry.title_id)
            .collect();
        add_ons.sort_unstable();
        add_ons.dedup();

        add_ons.into_iter().map(|id| self.remove_title(id)).sum()
    }

    /// Delete the per-title settings for a program.
    pub fn remove_custom_config(&mut self, program_id: u64, path: &Utf8Path) -> anyhow::Result<bool> {
        let key = ConfigManager::per_game_key(program_id, path);
        let removed = self.config.remove_per_game(&key)?;
        if removed {
            self.state
                .set_status_message(format!("Removed custom configuration {key}"));
        }
        Ok(removed)
    }

    // Session lifecycle

    /// Start a session for `request`.
    ///
    /// A live session is stopped and fully torn down first. On any load
    /// failure the session returns to idle and the operator is shown the
    /// diagnostic.
    pub fn boot_game(&mut self, request: BootRequest) -> Result<(), SessionError> {
        if !self.session.is_idle() {
            tracing::info!("Stopping current session before booting {}", request.path);
            self.shutdown_session(StopReason::Replaced);
        }

        let user_index = match request.user_index {
            Some(index) => Some(index),
            None if self.global_settings.general.select_user_on_boot => {
                match self.operator.select_profile(&self.global_settings.profiles) {
                    Some(index) => Some(index),
                    None => {
                        tracing::info!("Profile selection cancelled, not booting");
                        return Err(SessionError::Cancelled);
                    }
                }
            }
            None => None,
        };
        let request = BootRequest {
            user_index,
            ..request
        };

        self.session.begin_load(&request)?;
        self.publish_session();
        tracing::info!(
            "Loading {} (program {})",
            request.path,
            request.program_index
        );

        let Some(loader) = self
            .loaders
            .get_loader(&request.path, request.program_index)
        else {
            return self.fail_boot(LoadError::MissingLoader(request.path.clone()));
        };

        let title_id = loader.read_program_id().unwrap_or_else(|status| {
            tracing::warn!("Could not read program id of {}: {}", request.path, status);
            0
        });
        let control = loader.read_control_data().unwrap_or_default();

        self.active_settings = match request.start_type {
            StartGameType::Normal => {
                let key = ConfigManager::per_game_key(title_id, &request.path);
                self.config
                    .load_per_game(&self.global_settings, &key)
                    .unwrap_or_else(|e| {
                        tracing::warn!("Ignoring per-game settings {}: {:#}", key, e);
                        self.global_settings.clone()
                    })
            }
            StartGameType::Global => self.global_settings.clone(),
        };

        let core = match loader.load(request.program_index) {
            Ok(core) => core,
            Err(status) => {
                let error = LoadError::from_status(status, &request.path)
                    .unwrap_or(LoadError::Unknown(status));
                return self.fail_boot(error);
            }
        };

        let display = TitleDisplay::new(
            &control.name,
            &request.path,
            &control.version,
            core.is_64bit(),
            &core.gpu_vendor(),
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let thread = match EmuThread::start(core, events_tx) {
            Ok(thread) => thread,
            Err(e) => {
                tracing::error!("Failed to spawn emulation thread: {}", e);
                self.session.fail_load()?;
                self.active_settings = self.global_settings.clone();
                self.metrics.record_load_failure();
                self.publish_session();
                return Err(SessionError::Worker(e));
            }
        };

        self.session.finish_load(title_id)?;
        thread.set_running(true);
        self.emu_thread = Some(thread);
        self.worker_rx = Some(events_rx);
        self.publish_session();

        self.global_settings.push_recent_file(&request.path);
        self.stored_settings.push_recent_file(&request.path);
        self.persist_settings();
        self.state
            .set_recent_files(self.global_settings.recent_files.clone());

        self.state
            .set_window_title(format_window_title(&self.base_title, Some(&display)));
        self.state.set_status_message(String::new());
        self.sleep.prevent_sleep();
        self.state.set_sleep_inhibited(true);
        self.metrics.record_session_booted();

        tracing::info!("Running {} ({:016X})", request.path, title_id);
        self.last_boot = Some(request);
        Ok(())
    }

    fn fail_boot(&mut self, error: LoadError) -> Result<(), SessionError> {
        tracing::error!("Load failed: {}", error);
        if let Err(e) = self.session.fail_load() {
            tracing::warn!("{}", e);
        }
        self.active_settings = self.global_settings.clone();
        self.metrics.record_load_failure();
        self.publish_session();
        self.state.set_status_message(error.to_string());
        self.operator.show_load_error(&error);
        Err(SessionError::Load(error))
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.pause_session(false)
    }

    fn pause_session(&mut self, auto: bool) -> Result<(), SessionError> {
        self.session.pause(auto)?;
        if let Some(thread) = &self.emu_thread {
            thread.set_running(false);
        }
        self.sleep.allow_sleep();
        self.state.set_sleep_inhibited(false);
        self.publish_session();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.session.resume()?;
        if let Some(thread) = &self.emu_thread {
            thread.set_running(true);
        }
        self.sleep.prevent_sleep();
        self.state.set_sleep_inhibited(true);
        self.publish_session();
        Ok(())
    }

    /// Auto-pause on focus loss; auto-resume only what was auto-paused.
    pub fn on_focus_changed(&mut self, focused: bool) {
        if !self.active_settings.general.pause_when_in_background {
            return;
        }
        let result = match (focused, self.session.state()) {
            (false, SessionState::Running) => self.pause_session(true),
            (true, SessionState::Paused) if self.session.auto_paused() => self.resume(),
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!("Focus change ignored: {}", e);
        }
    }

    /// Operator-initiated stop, gated by the program's exit lock.
    pub fn request_stop(&mut self) -> Result<(), SessionError> {
        if !self.session.state().is_active() {
            return Err(SessionError::NoSession);
        }
        if self.is_exit_locked() && !self.operator.confirm_force_locked_exit() {
            tracing::info!("Stop refused: program holds an exit lock");
            return Err(SessionError::ExitLocked);
        }
        self.shutdown_session(StopReason::User);
        Ok(())
    }

    /// `Running/Paused -> Stopping -> Idle`, joining the worker in between.
    fn shutdown_session(&mut self, reason: StopReason) {
        if self.session.state().is_active() {
            if let Err(e) = self.session.begin_stop(reason) {
                tracing::warn!("{}", e);
            }
            self.publish_session();
        }

        if let Some(mut thread) = self.emu_thread.take() {
            thread.request_stop();
        }
        self.worker_rx = None;

        if self.session.state() == SessionState::Stopping
            && let Err(e) = self.session.finish_stop()
        {
            tracing::warn!("{}", e);
        }

        self.active_settings = self.global_settings.clone();
        self.sleep.allow_sleep();
        self.state.set_sleep_inhibited(false);
        self.state.set_window_title(self.base_title.clone());
        self.publish_session();
        tracing::info!("Session stopped ({:?})", reason);
    }

    /// Stop and boot program `program_index` of the same file.
    pub fn execute_program(&mut self, program_index: usize) -> Result<(), SessionError> {
        let Some(previous) = self.last_boot.clone().filter(|_| !self.session.is_idle()) else {
            return Err(SessionError::NoSession);
        };
        tracing::info!("Program requested launch of program {}", program_index);
        self.shutdown_session(StopReason::Replaced);
        self.boot_game(BootRequest {
            path: previous.path,
            program_index,
            start_type: StartGameType::Normal,
            user_index: previous.user_index,
        })
    }

    /// Reboot the running file with global settings.
    pub fn restart_game(&mut self) -> Result<(), SessionError> {
        if !self.session.state().is_active() {
            return Err(SessionError::NoSession);
        }
        let Some(previous) = self.last_boot.clone() else {
            return Err(SessionError::NoSession);
        };
        if self.is_exit_locked() && !self.operator.confirm_force_locked_exit() {
            return Err(SessionError::ExitLocked);
        }
        self.shutdown_session(StopReason::Replaced);
        self.boot_game(BootRequest {
            start_type: StartGameType::Global,
            ..previous
        })
    }

    /// Window close. Returns false if the operator chose to keep running.
    pub fn request_close(&mut self) -> bool {
        if self.session.state().is_active() {
            if self.global_settings.general.confirm_before_closing && !self.operator.confirm_close()
            {
                return false;
            }
            self.shutdown_session(StopReason::WindowClosed);
        }
        if self.state.read(|s| s.is_installing) {
            self.cancel_tx.send_replace(true);
        }
        self.persist_settings();
        true
    }

    /// Boot a file chosen by the operator, confirming if a program runs.
    /// Returns false if the operator kept the current program.
    pub fn open_file(&mut self, path: &Utf8Path) -> Result<bool, SessionError> {
        if self.session.state().is_active() && !self.operator.confirm_change_game() {
            return Ok(false);
        }
        self.boot_game(BootRequest::new(path))?;
        Ok(true)
    }

    /// Like [`open_file`](Self::open_file), dropping entries whose file is gone.
    pub fn open_recent_file(&mut self, path: &Utf8Path) -> Result<bool, SessionError> {
        if !path.exists() {
            tracing::warn!("Recent file {} no longer exists", path);
            if self.global_settings.remove_recent_file(path) {
                self.stored_settings.remove_recent_file(path);
                self.persist_settings();
                self.state
                    .set_recent_files(self.global_settings.recent_files.clone());
            }
            self.state
                .set_status_message(format!("File not found: {path}"));
            return Err(SessionError::FileNotFound(path.to_path_buf()));
        }
        self.open_file(path)
    }

    pub fn on_file_dropped(&mut self, path: &Utf8Path) -> Result<bool, SessionError> {
        if ContainerKind::from_path(path).is_none() {
            tracing::info!("Ignoring dropped file {}", path);
            return Ok(false);
        }
        self.open_file(path)
    }

    /// Where a title keeps its saves. `None` if the operator picked no profile.
    pub fn save_data_dir(
        &self,
        program_id: u64,
        control: &ControlData,
    ) -> Result<Option<Utf8PathBuf>, MetadataError> {
        let kind = control.save_data_kind()?;
        let uuid = match kind {
            SaveDataKind::Device => None,
            SaveDataKind::User => {
                let Some(index) = self.operator.select_profile(&self.global_settings.profiles)
                else {
                    return Ok(None);
                };
                self.global_settings
                    .profile(index)
                    .map(|profile| profile.uuid.clone())
            }
        };
        let user_nand = self.global_settings.paths.user_nand(&self.data_dir);
        Ok(Some(save_data_dir(
            &user_nand,
            kind,
            program_id,
            uuid.as_deref(),
        )))
    }

    // Worker events

    /// Handle every queued worker notification. Returns how many were handled.
    pub fn pump_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.worker_rx.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.handle_worker_event(event);
            handled += 1;
        }
        handled
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::LoadProgress {
                stage,
                value,
                total,
            } => {
                self.state.set_load_progress(Some(stage), value, total);
            }
            WorkerEvent::DebugModeEntered { ack } => {
                if self.session.state() == SessionState::Running
                    && let Err(e) = self.pause_session(false)
                {
                    tracing::warn!("{}", e);
                }
                self.state.set_debug_mode(true);
                let _ = ack.send(());
            }
            WorkerEvent::DebugModeLeft { ack } => {
                self.state.set_debug_mode(false);
                let _ = ack.send(());
            }
            WorkerEvent::ErrorThrown { status, details } => self.on_core_error(status, details),
            WorkerEvent::ExecuteProgram { program_index } => {
                if let Err(e) = self.execute_program(program_index) {
                    tracing::error!("Failed to launch program {}: {}", program_index, e);
                }
            }
            WorkerEvent::Exited => {
                tracing::info!("Program exited");
                self.shutdown_session(StopReason::ProgramExited);
            }
        }
    }

    fn on_core_error(&mut self, status: SystemStatus, details: String) {
        let error = RuntimeError::from_status(status, details);
        tracing::error!("Runtime error: {}", error);
        self.metrics.record_fatal_error();
        self.session.mark_fatal();
        self.state.set_status_message(error.status_message());

        match self.operator.on_fatal_error(&error) {
            FatalErrorChoice::Quit => self.shutdown_session(StopReason::FatalError),
            FatalErrorChoice::Continue => {
                tracing::warn!("Continuing after runtime error; state may be corrupt");
                self.session.clear_fatal();
                if self.session.state() == SessionState::Running
                    && let Some(thread) = &self.emu_thread
                {
                    thread.set_running(true);
                }
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.emu_thread.is_some() {
            self.shutdown_session(StopReason::WindowClosed);
        }
    }
}
