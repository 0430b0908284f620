use crate::models::Settings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use std::fs;

/// Prefix for environment overrides, e.g. `EMUHOST_GENERAL__FULLSCREEN=true`.
pub const ENV_PREFIX: &str = "EMUHOST";

/// Configuration manager for the global settings file and per-title overlays.
///
/// Layout under the configuration directory:
/// - `settings.yaml`: global [`Settings`]
/// - `custom/<key>.yaml`: per-title overrides, keyed by [`per_game_key`](Self::per_game_key)
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    custom_dir: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join("settings.yaml"),
            custom_dir: config_dir.join("custom"),
            config_dir,
        })
    }

    /// Defaults, then `settings.yaml`, without environment overrides.
    fn file_layers(&self, base: &Settings) -> Result<ConfigBuilder<DefaultState>> {
        let defaults = Config::try_from(base).context("Failed to serialize base settings")?;
        Ok(Config::builder()
            .add_source(defaults)
            .add_source(File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false)))
    }

    /// Load the global settings.
    ///
    /// Layers built-in defaults, `settings.yaml` and `EMUHOST_*` environment
    /// variables. A missing file yields the defaults.
    pub fn load_settings(&self) -> Result<Settings> {
        self.load_settings_with_env(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    /// [`load_settings`](Self::load_settings) with an explicit environment source.
    pub fn load_settings_with_env(&self, env: Environment) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings: Settings = self
            .file_layers(&Settings::default())?
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Defaults and `settings.yaml` only: the settings to write back, free of
    /// environment overrides.
    pub fn load_stored_settings(&self) -> Result<Settings> {
        self.file_layers(&Settings::default())?
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Name of the per-title configuration for a program.
    ///
    /// The title id as 16 upper-case hex digits, or the file name when the
    /// program has no title id.
    pub fn per_game_key(title_id: u64, path: &Utf8Path) -> String {
        if title_id == 0 {
            path.file_name().unwrap_or(path.as_str()).to_string()
        } else {
            format!("{title_id:016X}")
        }
    }

    pub fn per_game_path(&self, key: &str) -> Utf8PathBuf {
        self.custom_dir.join(format!("{key}.yaml"))
    }

    pub fn has_per_game(&self, key: &str) -> bool {
        self.per_game_path(key).exists()
    }

    /// Settings for one title: `base` with `custom/<key>.yaml` layered over it.
    pub fn load_per_game(&self, base: &Settings, key: &str) -> Result<Settings> {
        let path = self.per_game_path(key);
        let defaults = Config::try_from(base).context("Failed to serialize base settings")?;

        let settings: Settings = Config::builder()
            .add_source(defaults)
            .add_source(File::new(path.as_str(), FileFormat::Yaml).required(false))
            .build()
            .with_context(|| format!("Failed to read per-game settings: {}", path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse per-game settings: {}", path))?;

        if path.exists() {
            tracing::info!("Applied per-game settings from {}", path);
        }
        Ok(settings)
    }

    pub fn save_per_game(&self, key: &str, settings: &Settings) -> Result<()> {
        fs::create_dir_all(&self.custom_dir)
            .with_context(|| format!("Failed to create directory: {}", self.custom_dir))?;

        let path = self.per_game_path(key);
        let yaml_string = serde_yaml_ng::to_string(settings)
            .context("Failed to serialize per-game settings to YAML")?;

        fs::write(&path, yaml_string)
            .with_context(|| format!("Failed to write per-game settings: {}", path))?;

        tracing::info!("Saved per-game settings to {}", path);
        Ok(())
    }

    /// Delete a title's custom configuration. Returns false if none existed.
    pub fn remove_per_game(&self, key: &str) -> Result<bool> {
        let path = self.per_game_path(key);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove per-game settings: {}", path))?;

        tracing::info!("Removed per-game settings {}", path);
        Ok(true)
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
