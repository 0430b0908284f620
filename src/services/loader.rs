use crate::services::emu_thread::EmulationCore;
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Status code returned by the loader and the running core.
///
/// Codes above [`ERROR_LOADER`](Self::ERROR_LOADER) are loader-specific
/// errors encoded as `ERROR_LOADER + loader_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemStatus(pub u16);

impl SystemStatus {
    pub const SUCCESS: Self = Self(0);
    pub const NOT_INITIALIZED: Self = Self(1);
    pub const ERROR_GET_LOADER: Self = Self(2);
    pub const ERROR_SYSTEM_FILES: Self = Self(3);
    pub const ERROR_SHARED_FONT: Self = Self(4);
    pub const ERROR_VIDEO_CORE: Self = Self(5);
    pub const ERROR_UNKNOWN: Self = Self(6);
    pub const ERROR_LOADER: Self = Self(7);

    pub fn loader_error(code: u16) -> Self {
        Self(Self::ERROR_LOADER.0.saturating_add(code))
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// The loader-specific code if this status is in the loader range.
    pub fn loader_code(self) -> Option<u16> {
        (self.0 > Self::ERROR_LOADER.0).then(|| self.0 - Self::ERROR_LOADER.0)
    }
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

/// Why a boot attempt did not reach `Running`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("No loader recognises {0}")]
    MissingLoader(Utf8PathBuf),

    #[error("Content archive error ({:04X}-{code:04X})", SystemStatus::ERROR_LOADER.0)]
    ContentArchive { code: u16 },

    #[error("Video core failed to initialize")]
    VideoCore,

    #[error("Unknown load error ({0})")]
    Unknown(SystemStatus),
}

fn format_loader_code(code: u16) -> String {
    format!("({:04X}-{:04X})", SystemStatus::ERROR_LOADER.0, code)
}

impl LoadError {
    /// Classify a failed load status. Returns `None` for success.
    pub fn from_status(status: SystemStatus, path: &Utf8Path) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        if let Some(code) = status.loader_code() {
            return Some(Self::ContentArchive { code });
        }
        Some(match status {
            SystemStatus::ERROR_GET_LOADER => Self::MissingLoader(path.to_path_buf()),
            SystemStatus::ERROR_VIDEO_CORE => Self::VideoCore,
            other => Self::Unknown(other),
        })
    }

    /// Short code shown next to content archive errors, e.g. `(0007-0012)`.
    pub fn diagnostic_code(&self) -> Option<String> {
        match self {
            Self::ContentArchive { code } => Some(format_loader_code(*code)),
            _ => None,
        }
    }
}

/// Error reported by the core while a program runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("System archive missing: {details}")]
    SystemArchiveMissing { details: String },

    #[error("Shared font missing")]
    SharedFontMissing,

    #[error("Fatal error ({status}): {details}")]
    Fatal { status: SystemStatus, details: String },
}

impl RuntimeError {
    pub fn from_status(status: SystemStatus, details: String) -> Self {
        match status {
            SystemStatus::ERROR_SYSTEM_FILES => Self::SystemArchiveMissing { details },
            SystemStatus::ERROR_SHARED_FONT => Self::SharedFontMissing,
            _ => Self::Fatal { status, details },
        }
    }

    /// Status bar text while the operator decides.
    pub fn status_message(&self) -> &'static str {
        match self {
            Self::SystemArchiveMissing { .. } => "System Archive Missing",
            Self::SharedFontMissing => "Shared Font Missing",
            Self::Fatal { .. } => "Fatal Error",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Save data kind is ambiguous (user size {user}, device size {device})")]
    AmbiguousSaveData { user: u64, device: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDataKind {
    User,
    Device,
}

/// Control metadata of a program (the NACP).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlData {
    pub name: String,
    pub version: String,
    pub user_save_size: u64,
    pub device_save_size: u64,
}

impl ControlData {
    /// Which save area the program uses.
    ///
    /// Exactly one of the two sizes must be non-zero; anything else is
    /// malformed metadata and reported rather than guessed.
    pub fn save_data_kind(&self) -> Result<SaveDataKind, MetadataError> {
        match (self.user_save_size > 0, self.device_save_size > 0) {
            (true, false) => Ok(SaveDataKind::User),
            (false, true) => Ok(SaveDataKind::Device),
            _ => Err(MetadataError::AmbiguousSaveData {
                user: self.user_save_size,
                device: self.device_save_size,
            }),
        }
    }
}

const ZERO_UUID: &str = "00000000000000000000000000000000";

/// Directory holding a title's save data inside the user NAND.
///
/// User saves are stored per profile; device saves share the zero profile.
pub fn save_data_dir(
    user_nand: &Utf8Path,
    kind: SaveDataKind,
    title_id: u64,
    profile_uuid: Option<&str>,
) -> Utf8PathBuf {
    let owner = match kind {
        SaveDataKind::User => profile_uuid.unwrap_or(ZERO_UUID),
        SaveDataKind::Device => ZERO_UUID,
    };
    user_nand
        .join("save")
        .join("0000000000000000")
        .join(owner)
        .join(format!("{title_id:016X}"))
}

/// Opens one program file and turns it into a running core.
pub trait Loader: Send {
    fn read_program_id(&self) -> Result<u64, SystemStatus>;

    fn read_control_data(&self) -> Option<ControlData>;

    /// Bring up the core for `program_index`.
    fn load(self: Box<Self>, program_index: usize) -> Result<Box<dyn EmulationCore>, SystemStatus>;
}

/// Picks a [`Loader`] for a file.
pub trait LoaderFactory: Send + Sync {
    fn get_loader(&self, path: &Utf8Path, program_index: usize) -> Option<Box<dyn Loader>>;
}
