// emuhost - Console emulator frontend core
//
// This is the library crate containing package installation, the session
// state machine and the controller that ties them together.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{AppState, BootRequest, InstallOutcome, InstallSummary, SessionState, Settings};
pub use state::{StateChange, StateManager};
pub use ui::{SessionController, SessionError};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
