//! Data models for the emulator frontend.
//!
//! - [`AppState`]: what the frontend displays, owned by [`StateManager`](crate::state::StateManager)
//! - [`Settings`]: persisted configuration loaded by [`ConfigManager`](crate::config::ConfigManager)
//! - Content model: [`PackageFile`], [`InstallBatch`], [`InstallOutcome`], [`ContentTitleType`]
//! - Session model: [`Session`], [`SessionState`], [`BootRequest`]
//!
//! Models hold no I/O beyond reading a package's size; services operate on them.

pub mod app_state;
pub mod content;
pub mod session;
pub mod settings;

pub use app_state::{AppState, MAX_CONCURRENT_INSTALLS};
pub use content::{
    ContainerKind, ContentTitleType, INSTALL_BLOCK_SIZE, InstallBatch, InstallOutcome,
    InstallSummary, InstalledEntryType, PackageFile, StoreTarget, base_title_id, update_title_id,
};
pub use session::{
    BootRequest, InvalidTransition, Session, SessionState, StartGameType, StopReason,
    TitleDisplay, format_window_title,
};
pub use settings::{
    GeneralSettings, InstallSettings, LoggingSettings, MAX_RECENT_FILES, PathSettings, Settings,
    UserProfile,
};
