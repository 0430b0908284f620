use crate::models::{InstallOutcome, InstallSummary, SessionState};
use camino::Utf8PathBuf;

/// Maximum number of install batches allowed to run at once.
///
/// Content stores take no per-title lock, so two writers touching the same
/// store would race. The controller enforces this with a
/// `tokio::sync::Semaphore` around each batch.
pub const MAX_CONCURRENT_INSTALLS: usize = 1;

/// Snapshot of everything the frontend displays.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Never mutate it directly; go through
/// [`update()`](crate::state::StateManager::update) so observers receive
/// [`StateChange`](crate::state::StateChange) events.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Install progress
    pub is_installing: bool,
    pub install_blocks_done: u64,
    pub install_blocks_total: u64,
    pub packages_total: usize,
    pub current_package: Option<String>,

    // Install results, in completion order
    pub installed_packages: Vec<String>,
    pub overwritten_packages: Vec<String>,
    pub failed_packages: Vec<String>,
    pub base_rejected_packages: Vec<String>,

    // Session mirror
    pub session_state: SessionState,
    pub session_title_id: u64,
    pub session_path: Option<Utf8PathBuf>,
    pub auto_paused: bool,
    pub debug_mode: bool,
    pub sleep_inhibited: bool,

    // Loading screen
    pub load_stage: Option<String>,
    pub load_value: u64,
    pub load_total: u64,

    // Presentation
    pub window_title: String,
    pub status_message: String,
    pub recent_files: Vec<Utf8PathBuf>,
}

impl AppState {
    /// Packages that already have an outcome.
    pub fn packages_processed(&self) -> usize {
        self.installed_packages.len()
            + self.overwritten_packages.len()
            + self.failed_packages.len()
            + self.base_rejected_packages.len()
    }

    pub fn packages_remaining(&self) -> usize {
        self.packages_total.saturating_sub(self.packages_processed())
    }

    pub fn install_summary(&self) -> InstallSummary {
        InstallSummary {
            installed: self.installed_packages.len(),
            overwritten: self.overwritten_packages.len(),
            failed: self.failed_packages.len(),
            base_rejected: self.base_rejected_packages.len(),
        }
    }

    /// Install progress as a 0.0 - 1.0 fraction of blocks.
    pub fn install_fraction(&self) -> f64 {
        if self.install_blocks_total == 0 {
            return if self.is_installing { 0.0 } else { 1.0 };
        }
        self.install_blocks_done as f64 / self.install_blocks_total as f64
    }

    pub fn add_install_result(&mut self, package: String, outcome: InstallOutcome) {
        match outcome {
            InstallOutcome::Installed => self.installed_packages.push(package),
            InstallOutcome::Overwritten => self.overwritten_packages.push(package),
            InstallOutcome::Failed => self.failed_packages.push(package),
            InstallOutcome::BaseInstallRejected => self.base_rejected_packages.push(package),
        }
    }

    pub fn reset_install_state(&mut self) {
        self.is_installing = false;
        self.install_blocks_done = 0;
        self.install_blocks_total = 0;
        self.packages_total = 0;
        self.current_package = None;
        self.installed_packages.clear();
        self.overwritten_packages.clear();
        self.failed_packages.clear();
        self.base_rejected_packages.clear();
    }

    pub fn is_session_live(&self) -> bool {
        self.session_state != SessionState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert!(!state.is_installing);
        assert_eq!(state.session_state, SessionState::Idle);
        assert!(!state.is_session_live());
        assert_eq!(state.packages_remaining(), 0);
    }

    #[test]
    fn test_add_install_result() {
        let mut state = AppState {
            packages_total: 4,
            ..AppState::default()
        };

        state.add_install_result("a.nsp".into(), InstallOutcome::Installed);
        state.add_install_result("b.nca".into(), InstallOutcome::Overwritten);
        state.add_install_result("c.xci".into(), InstallOutcome::BaseInstallRejected);

        assert_eq!(state.packages_processed(), 3);
        assert_eq!(state.packages_remaining(), 1);

        let summary = state.install_summary();
        assert_eq!(summary.installed, 1);
        assert_eq!(summary.overwritten, 1);
        assert_eq!(summary.base_rejected, 1);
    }

    #[test]
    fn test_install_fraction() {
        let mut state = AppState {
            is_installing: true,
            install_blocks_total: 4,
            ..AppState::default()
        };
        assert_eq!(state.install_fraction(), 0.0);

        state.install_blocks_done = 2;
        assert_eq!(state.install_fraction(), 0.5);
    }

    #[test]
    fn test_reset_install_state() {
        let mut state = AppState {
            is_installing: true,
            packages_total: 2,
            install_blocks_done: 7,
            current_package: Some("a.nsp".into()),
            ..AppState::default()
        };
        state.add_install_result("a.nsp".into(), InstallOutcome::Failed);

        state.reset_install_state();

        assert!(!state.is_installing);
        assert_eq!(state.install_blocks_done, 0);
        assert!(state.failed_packages.is_empty());
        assert_eq!(state.current_package, None);
    }
}
