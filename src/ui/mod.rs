// UI module - session control and operator interaction
//
// This module contains:
// - EventLoopBridge: Runs background tasks while the controller thread keeps pumping
// - SessionController: Owns the session, drives installs and handles worker events
// - Operator: Every prompt that needs a human, with a headless implementation

pub mod bridge;
pub mod controller;
pub mod prompts;

pub use bridge::{BridgeError, EventLoopBridge};
pub use controller::{ControllerServices, InstallCancelHandle, SessionController, SessionError};
pub use prompts::{FatalErrorChoice, HeadlessOperator, Operator, OperatorTitlePrompt};
