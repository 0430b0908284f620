//! Services - framework-agnostic logic behind the session controller.
//!
//! Nothing here knows about prompts or windows; the controller in
//! [`crate::ui`] composes these pieces and talks to the operator.
//!
//! # Components
//!
//! - [`content_store`]: the [`ContentStore`] trait and a directory-backed store.
//! - [`package`]: the [`PackageReader`] trait for opening NSP/XCI/NCA files.
//! - [`install`]: the [`InstallPipeline`] and its cancellable block copier.
//! - [`loader`]: the [`Loader`] interface, status codes and error classification.
//! - [`emu_thread`]: the worker thread that runs a loaded core.
//! - [`game_list`], [`power`]: cache invalidation and OS sleep inhibition.
//! - [`headless`]: loader and core used when no backend is linked.

pub mod content_store;
pub mod emu_thread;
pub mod game_list;
pub mod headless;
pub mod install;
pub mod loader;
pub mod package;
pub mod power;

pub use content_store::{
    BlockCopy, ContentSink, ContentStore, ContentStores, FsContentStore, InstallEntryResult,
    InstallPolicy, StoreEntry,
};
pub use emu_thread::{CoreStatus, EmuThread, EmulationCore, WorkerEvent};
pub use game_list::GameListCache;
pub use headless::HeadlessLoaderFactory;
pub use install::{InstallError, InstallPipeline, ProgressCopier, TitleTypePrompt};
pub use loader::{
    ControlData, LoadError, Loader, LoaderFactory, MetadataError, RuntimeError, SaveDataKind,
    SystemStatus,
};
pub use package::{FsPackageReader, Package, PackageError, PackageReader, PackageStatus};
pub use power::{LoggingSleepInhibitor, SleepInhibitor};
