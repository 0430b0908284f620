// Operator prompts
//
// Every question the controller asks a human goes through the Operator trait,
// so a windowed frontend, the CLI and tests can answer them differently.

use crate::models::{InstallSummary, InstalledEntryType, PackageFile, Settings, UserProfile};
use crate::services::install::TitleTypePrompt;
use crate::services::loader::{LoadError, RuntimeError};
use std::sync::Arc;

/// Answer to a fatal runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalErrorChoice {
    /// Stop the program and return to idle.
    Quit,
    /// Keep running despite the risk of corrupt state.
    Continue,
}

/// Decisions and notices that need a human.
///
/// Calls are synchronous: the controller does not proceed until the method
/// returns.
pub trait Operator: Send + Sync {
    /// Pick a title type for a bare NCA. Returns an index into
    /// [`ContentTitleType::SELECTABLE`](crate::models::ContentTitleType::SELECTABLE),
    /// or `None` to skip the file.
    fn select_nca_title_type(&self, package: &PackageFile, default_index: usize) -> Option<usize>;

    /// Caution shown once per batch when base installs were refused.
    fn warn_base_install(&self, summary: &InstallSummary);

    fn show_install_results(&self, summary: &InstallSummary);

    fn show_load_error(&self, error: &LoadError);

    fn on_fatal_error(&self, error: &RuntimeError) -> FatalErrorChoice;

    /// The program holds an exit lock; stop anyway?
    fn confirm_force_locked_exit(&self) -> bool;

    fn confirm_close(&self) -> bool;

    /// A program is running; replace it with another?
    fn confirm_change_game(&self) -> bool;

    fn select_profile(&self, profiles: &[UserProfile]) -> Option<usize>;

    fn confirm_remove_entry(&self, entry_type: InstalledEntryType, program_id: u64) -> bool;
}

/// Adapts an [`Operator`] to the install pipeline's prompt.
pub struct OperatorTitlePrompt(pub Arc<dyn Operator>);

impl TitleTypePrompt for OperatorTitlePrompt {
    fn select_nca_title_type(&self, package: &PackageFile, default_index: usize) -> Option<usize> {
        self.0.select_nca_title_type(package, default_index)
    }
}

/// Non-interactive operator that answers from configuration and logs.
#[derive(Debug, Clone)]
pub struct HeadlessOperator {
    nca_title_type: Option<usize>,
    fatal_choice: FatalErrorChoice,
    force_locked_exit: bool,
    profile: usize,
}

impl HeadlessOperator {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            nca_title_type: Some(settings.install.default_nca_title_type),
            fatal_choice: FatalErrorChoice::Quit,
            force_locked_exit: false,
            profile: settings.general.current_user,
        }
    }

    /// `None` declines every NCA.
    pub fn with_nca_title_type(mut self, index: Option<usize>) -> Self {
        self.nca_title_type = index;
        self
    }

    pub fn with_fatal_choice(mut self, choice: FatalErrorChoice) -> Self {
        self.fatal_choice = choice;
        self
    }

    pub fn with_force_locked_exit(mut self, force: bool) -> Self {
        self.force_locked_exit = force;
        self
    }
}

impl Operator for HeadlessOperator {
    fn select_nca_title_type(&self, package: &PackageFile, _default_index: usize) -> Option<usize> {
        tracing::info!(
            "Title type for {}: {:?}",
            package.path,
            self.nca_title_type
        );
        self.nca_title_type
    }

    fn warn_base_install(&self, summary: &InstallSummary) {
        tracing::warn!(
            "{} base game install(s) refused; base games belong in the game list, not NAND",
            summary.base_rejected
        );
    }

    fn show_install_results(&self, summary: &InstallSummary) {
        tracing::info!("Install results: {}", summary);
    }

    fn show_load_error(&self, error: &LoadError) {
        tracing::error!("Load failed: {}", error);
    }

    fn on_fatal_error(&self, error: &RuntimeError) -> FatalErrorChoice {
        tracing::error!("{}; answering {:?}", error, self.fatal_choice);
        self.fatal_choice
    }

    fn confirm_force_locked_exit(&self) -> bool {
        tracing::warn!(
            "Program holds an exit lock; force stop = {}",
            self.force_locked_exit
        );
        self.force_locked_exit
    }

    fn confirm_close(&self) -> bool {
        true
    }

    fn confirm_change_game(&self) -> bool {
        true
    }

    fn select_profile(&self, profiles: &[UserProfile]) -> Option<usize> {
        (self.profile < profiles.len()).then_some(self.profile)
    }

    fn confirm_remove_entry(&self, entry_type: InstalledEntryType, program_id: u64) -> bool {
        tracing::info!("Removing {:?} for {:016X}", entry_type, program_id);
        true
    }
}
