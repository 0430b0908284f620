//! Shared fixtures for controller integration tests
#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use emuhost::models::{InstallSummary, InstalledEntryType, PackageFile, Settings, UserProfile};
use emuhost::services::{
    ContentStores, ControlData, CoreStatus, EmulationCore, FsPackageReader, LoadError, Loader,
    LoaderFactory, LoggingSleepInhibitor, RuntimeError, SystemStatus,
};
use emuhost::ui::{ControllerServices, FatalErrorChoice, Operator};
use emuhost::{ConfigManager, SessionController};
use mockall::mock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

mock! {
    pub Op {}
    impl Operator for Op {
        fn select_nca_title_type(&self, package: &PackageFile, default_index: usize) -> Option<usize>;
        fn warn_base_install(&self, summary: &InstallSummary);
        fn show_install_results(&self, summary: &InstallSummary);
        fn show_load_error(&self, error: &LoadError);
        fn on_fatal_error(&self, error: &RuntimeError) -> FatalErrorChoice;
        fn confirm_force_locked_exit(&self) -> bool;
        fn confirm_close(&self) -> bool;
        fn confirm_change_game(&self) -> bool;
        fn select_profile(&self, profiles: &[UserProfile]) -> Option<usize>;
        fn confirm_remove_entry(&self, entry_type: InstalledEntryType, program_id: u64) -> bool;
    }
}

/// What the operator was asked, recorded by [`operator`].
#[derive(Debug, Default)]
pub struct Calls {
    pub base_warnings: AtomicUsize,
    pub results_shown: AtomicUsize,
    pub exit_lock_prompts: AtomicUsize,
    pub load_errors: Mutex<Vec<LoadError>>,
    pub fatal_errors: Mutex<Vec<RuntimeError>>,
}

impl Calls {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Canned operator answers.
#[derive(Debug, Clone, Copy)]
pub struct Answers {
    pub nca_title_type: Option<usize>,
    pub fatal_choice: FatalErrorChoice,
    pub force_locked_exit: bool,
    pub confirm: bool,
    pub profile: Option<usize>,
}

impl Default for Answers {
    fn default() -> Self {
        Self {
            nca_title_type: Some(5),
            fatal_choice: FatalErrorChoice::Quit,
            force_locked_exit: false,
            confirm: true,
            profile: Some(0),
        }
    }
}

/// A mock operator that answers from `answers` and records into `calls`.
pub fn operator(answers: Answers, calls: &Arc<Calls>) -> MockOp {
    let mut op = MockOp::new();

    op.expect_select_nca_title_type()
        .returning(move |_, _| answers.nca_title_type);

    let c = Arc::clone(calls);
    op.expect_warn_base_install().returning(move |_| {
        c.base_warnings.fetch_add(1, Ordering::SeqCst);
    });

    let c = Arc::clone(calls);
    op.expect_show_install_results().returning(move |_| {
        c.results_shown.fetch_add(1, Ordering::SeqCst);
    });

    let c = Arc::clone(calls);
    op.expect_show_load_error()
        .returning(move |error| c.load_errors.lock().unwrap().push(error.clone()));

    let c = Arc::clone(calls);
    op.expect_on_fatal_error().returning(move |error| {
        c.fatal_errors.lock().unwrap().push(error.clone());
        answers.fatal_choice
    });

    let c = Arc::clone(calls);
    op.expect_confirm_force_locked_exit().returning(move || {
        c.exit_lock_prompts.fetch_add(1, Ordering::SeqCst);
        answers.force_locked_exit
    });

    op.expect_confirm_close().returning(move || answers.confirm);
    op.expect_confirm_change_game()
        .returning(move || answers.confirm);
    op.expect_select_profile().returning(move |_| answers.profile);
    op.expect_confirm_remove_entry()
        .returning(move |_, _| answers.confirm);

    op
}

/// Statuses a [`FakeCore`] returns, shared with the test.
#[derive(Debug, Clone, Default)]
pub struct CoreScript {
    statuses: Arc<Mutex<VecDeque<CoreStatus>>>,
    slices: Arc<AtomicUsize>,
    exit_locked: Arc<AtomicBool>,
}

impl CoreScript {
    pub fn push(&self, status: CoreStatus) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn slices(&self) -> usize {
        self.slices.load(Ordering::SeqCst)
    }

    pub fn set_exit_locked(&self, locked: bool) {
        self.exit_locked.store(locked, Ordering::SeqCst);
    }
}

pub struct FakeCore {
    script: CoreScript,
}

impl EmulationCore for FakeCore {
    fn run_slice(&mut self) -> CoreStatus {
        self.script.slices.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1));
        self.script
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CoreStatus::Continue)
    }

    fn exit_locked(&self) -> bool {
        self.script.exit_locked.load(Ordering::SeqCst)
    }

    fn is_64bit(&self) -> bool {
        true
    }

    fn gpu_vendor(&self) -> String {
        "FakeGPU".to_string()
    }

    fn shutdown(&mut self) {}
}

/// Loader factory whose loaders succeed unless `fail_with` is set.
///
/// Title ids come from the file name; paths need not exist. A file name
/// containing `unknown` has no loader.
#[derive(Debug, Clone, Default)]
pub struct FakeLoaderFactory {
    pub script: CoreScript,
    pub fail_with: Arc<Mutex<Option<SystemStatus>>>,
    pub control: Arc<Mutex<Option<ControlData>>>,
    pub loaded_programs: Arc<Mutex<Vec<(Utf8PathBuf, usize)>>>,
}

impl FakeLoaderFactory {
    pub fn fail_with(&self, status: Option<SystemStatus>) {
        *self.fail_with.lock().unwrap() = status;
    }

    pub fn loaded_programs(&self) -> Vec<(Utf8PathBuf, usize)> {
        self.loaded_programs.lock().unwrap().clone()
    }
}

struct FakeLoader {
    path: Utf8PathBuf,
    title_id: u64,
    factory: FakeLoaderFactory,
}

impl LoaderFactory for FakeLoaderFactory {
    fn get_loader(&self, path: &Utf8Path, _program_index: usize) -> Option<Box<dyn Loader>> {
        if path.as_str().contains("unknown") {
            return None;
        }
        Some(Box::new(FakeLoader {
            path: path.to_path_buf(),
            title_id: FsPackageReader::new().parse_title_id(path).unwrap_or(0),
            factory: self.clone(),
        }))
    }
}

impl Loader for FakeLoader {
    fn read_program_id(&self) -> Result<u64, SystemStatus> {
        Ok(self.title_id)
    }

    fn read_control_data(&self) -> Option<ControlData> {
        self.factory.control.lock().unwrap().clone()
    }

    fn load(self: Box<Self>, program_index: usize) -> Result<Box<dyn EmulationCore>, SystemStatus> {
        self.factory
            .loaded_programs
            .lock()
            .unwrap()
            .push((self.path.clone(), program_index));
        if let Some(status) = *self.factory.fail_with.lock().unwrap() {
            return Err(status);
        }
        Ok(Box::new(FakeCore {
            script: self.factory.script.clone(),
        }))
    }
}

pub fn utf8_temp() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().unwrap();
    let base = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    (temp, base)
}

pub fn build_controller(
    base: &Utf8Path,
    settings: Settings,
    operator: MockOp,
    loaders: FakeLoaderFactory,
    runtime: &tokio::runtime::Runtime,
) -> SessionController {
    let config = ConfigManager::new(base).unwrap();
    let services = ControllerServices {
        stores: ContentStores::open_fs(&settings.paths, base),
        reader: Arc::new(FsPackageReader::new()),
        loaders: Arc::new(loaders),
        operator: Arc::new(operator),
        sleep: Arc::new(LoggingSleepInhibitor::new()),
    };
    SessionController::new(config, settings, services, runtime.handle().clone())
}

/// Pump worker events until `done` holds, failing after five seconds.
pub fn pump_until(controller: &mut SessionController, mut done: impl FnMut(&SessionController) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(controller) {
        assert!(Instant::now() < deadline, "timed out pumping controller events");
        controller.pump_events();
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Write `len` bytes of filler to `dir/name`.
pub fn write_package(dir: &Utf8Path, name: &str, len: usize) -> Utf8PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0xA5u8; len]).unwrap();
    path
}
