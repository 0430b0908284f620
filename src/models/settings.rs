use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Upper bound on the recently-opened list.
pub const MAX_RECENT_FILES: usize = 10;

/// Frontend settings, loaded from `settings.yaml`.
///
/// This is passed explicitly to whatever needs it. The controller keeps the
/// global copy and, while a title runs, an active copy with that title's
/// custom overlay applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub install: InstallSettings,

    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub profiles: Vec<UserProfile>,

    #[serde(default)]
    pub recent_files: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default = "default_true")]
    pub confirm_before_closing: bool,

    #[serde(default)]
    pub pause_when_in_background: bool,

    #[serde(default)]
    pub select_user_on_boot: bool,

    #[serde(default)]
    pub fullscreen: bool,

    #[serde(default)]
    pub current_user: usize,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            confirm_before_closing: true,
            pause_when_in_background: false,
            select_user_on_boot: false,
            fullscreen: false,
            current_user: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallSettings {
    /// Permit installing base applications from NSP/XCI into NAND.
    #[serde(default)]
    pub allow_base_install: bool,

    /// Replace an already-installed entry with the same title id.
    #[serde(default = "default_true")]
    pub allow_overwrite: bool,

    /// Pre-selected index in the NCA title type prompt.
    #[serde(default = "default_nca_title_type")]
    pub default_nca_title_type: usize,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            allow_base_install: false,
            allow_overwrite: true,
            default_nca_title_type: default_nca_title_type(),
        }
    }
}

/// Storage locations. Relative paths resolve against the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_nand_dir")]
    pub nand_dir: Utf8PathBuf,

    #[serde(default = "default_sdmc_dir")]
    pub sdmc_dir: Utf8PathBuf,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: Utf8PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: Utf8PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            nand_dir: default_nand_dir(),
            sdmc_dir: default_sdmc_dir(),
            cache_dir: default_cache_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl PathSettings {
    pub fn resolve(base: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }

    pub fn system_nand(&self, base: &Utf8Path) -> Utf8PathBuf {
        Self::resolve(base, &self.nand_dir).join("system")
    }

    pub fn user_nand(&self, base: &Utf8Path) -> Utf8PathBuf {
        Self::resolve(base, &self.nand_dir).join("user")
    }

    pub fn sdmc(&self, base: &Utf8Path) -> Utf8PathBuf {
        Self::resolve(base, &self.sdmc_dir)
    }

    pub fn cache(&self, base: &Utf8Path) -> Utf8PathBuf {
        Self::resolve(base, &self.cache_dir)
    }

    pub fn logs(&self, base: &Utf8Path) -> Utf8PathBuf {
        Self::resolve(base, &self.log_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_true")]
    pub console: bool,

    /// Write the log file as JSON lines instead of plain text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            debug: false,
            console: true,
            json: false,
        }
    }
}

/// A local user profile that owns save data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// 128-bit profile id as 32 hex digits.
    pub uuid: String,
    pub name: String,
}

impl Settings {
    /// Move `path` to the front of the recent list, dropping any older entry
    /// for it and trimming the list to [`MAX_RECENT_FILES`].
    pub fn push_recent_file(&mut self, path: &Utf8Path) {
        self.recent_files.retain(|p| p != path);
        self.recent_files.insert(0, path.to_path_buf());
        self.recent_files.truncate(MAX_RECENT_FILES);
    }

    pub fn remove_recent_file(&mut self, path: &Utf8Path) -> bool {
        let before = self.recent_files.len();
        self.recent_files.retain(|p| p != path);
        before != self.recent_files.len()
    }

    pub fn profile(&self, index: usize) -> Option<&UserProfile> {
        self.profiles.get(index)
    }
}

fn default_true() -> bool {
    true
}

fn default_nca_title_type() -> usize {
    crate::models::ContentTitleType::DEFAULT_SELECTION
}

fn default_nand_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("nand")
}

fn default_sdmc_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("sdmc")
}

fn default_cache_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("cache")
}

fn default_log_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("logs")
}
