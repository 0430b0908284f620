use crate::models::{ContentTitleType, InstallSettings, PathSettings, StoreTarget};
use crate::services::package::Package;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Destination a package's bytes are copied into.
pub trait ContentSink: Write {
    /// Set the destination length, truncating or zero-extending.
    fn resize(&mut self, len: u64) -> io::Result<()>;
}

impl ContentSink for fs::File {
    fn resize(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl ContentSink for io::Cursor<Vec<u8>> {
    fn resize(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        if self.position() > len {
            self.set_position(len);
        }
        Ok(())
    }
}

/// Copy callback a store uses to move package bytes into its destination.
///
/// Returns false when the copy was aborted; the destination has then been
/// resized to zero.
pub trait BlockCopy {
    fn copy(&mut self, src: &mut dyn Read, src_len: u64, dest: &mut dyn ContentSink) -> bool;
}

/// Result of [`ContentStore::install_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallEntryResult {
    Success,
    OverwriteExisting,
    ErrorAlreadyExists,
    ErrorCopyFailed,
    ErrorMetaFailed,
    /// A base application from a container was refused by policy.
    ErrorBaseInstall,
}

/// Rules a store applies to one install, taken from the settings per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallPolicy {
    pub allow_overwrite: bool,
    /// Accept base applications from NSP/XCI containers.
    pub allow_base_install: bool,
}

impl Default for InstallPolicy {
    fn default() -> Self {
        Self {
            allow_overwrite: true,
            allow_base_install: false,
        }
    }
}

impl From<&InstallSettings> for InstallPolicy {
    fn from(settings: &InstallSettings) -> Self {
        Self {
            allow_overwrite: settings.allow_overwrite,
            allow_base_install: settings.allow_base_install,
        }
    }
}

/// An installed title as recorded by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub title_id: u64,
    pub title_type: ContentTitleType,
}

/// A persistent registry of installed titles.
pub trait ContentStore: Send + Sync {
    fn name(&self) -> &str;

    fn install_entry(
        &self,
        package: &dyn Package,
        title_type: ContentTitleType,
        policy: InstallPolicy,
        copier: &mut dyn BlockCopy,
    ) -> InstallEntryResult;

    /// Returns true if an entry for `title_id` existed and was removed.
    fn remove_existing_entry(&self, title_id: u64) -> bool;

    fn has_entry(&self, title_id: u64) -> bool;

    fn list_entries(&self) -> Vec<StoreEntry>;
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    title_id: u64,
    title_type: ContentTitleType,
    source: String,
    size: u64,
}

const CONTENT_FILE: &str = "content.bin";
const META_FILE: &str = "meta.yaml";

/// Directory-backed content store.
///
/// Each title lives in `<root>/<TITLE_ID>/` as `content.bin` plus `meta.yaml`.
/// A title directory without `meta.yaml` is an incomplete install and is
/// not listed.
pub struct FsContentStore {
    name: String,
    root: Utf8PathBuf,
}

impl FsContentStore {
    pub fn new(name: impl Into<String>, root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn entry_dir(&self, title_id: u64) -> Utf8PathBuf {
        self.root.join(format!("{title_id:016X}"))
    }

    pub fn content_path(&self, title_id: u64) -> Utf8PathBuf {
        self.entry_dir(title_id).join(CONTENT_FILE)
    }

    fn discard(&self, dir: &Utf8Path) {
        if let Err(e) = fs::remove_dir_all(dir) {
            tracing::warn!("[{}] Failed to discard partial entry {}: {}", self.name, dir, e);
        }
    }

    fn read_meta(dir: &Utf8Path) -> Option<EntryMeta> {
        let text = fs::read_to_string(dir.join(META_FILE)).ok()?;
        serde_yaml_ng::from_str(&text).ok()
    }
}

impl ContentStore for FsContentStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn install_entry(
        &self,
        package: &dyn Package,
        title_type: ContentTitleType,
        policy: InstallPolicy,
        copier: &mut dyn BlockCopy,
    ) -> InstallEntryResult {
        let title_id = package.title_id();
        if title_id == 0 {
            tracing::error!("[{}] {} has no title id", self.name, package.path());
            return InstallEntryResult::ErrorMetaFailed;
        }

        if package.kind().is_container()
            && title_type == ContentTitleType::Application
            && !policy.allow_base_install
        {
            tracing::warn!(
                "[{}] Refusing base install of {:016X} from {}",
                self.name,
                title_id,
                package.path()
            );
            return InstallEntryResult::ErrorBaseInstall;
        }

        // A directory without metadata is a leftover partial install: cleared,
        // but not counted as an overwrite.
        let dir = self.entry_dir(title_id);
        let existed = self.has_entry(title_id);
        if existed && !policy.allow_overwrite {
            return InstallEntryResult::ErrorAlreadyExists;
        }
        if dir.exists()
            && let Err(e) = fs::remove_dir_all(&dir)
        {
            tracing::error!("[{}] Failed to remove existing {}: {}", self.name, dir, e);
            return InstallEntryResult::ErrorCopyFailed;
        }

        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::error!("[{}] Failed to create {}: {}", self.name, dir, e);
            return InstallEntryResult::ErrorCopyFailed;
        }

        let copied = package
            .open_content()
            .and_then(|src| Ok((src, fs::File::create(dir.join(CONTENT_FILE))?)))
            .map(|(mut src, mut dest)| copier.copy(&mut src, package.content_size(), &mut dest));

        match copied {
            Ok(true) => {}
            Ok(false) => {
                self.discard(&dir);
                return InstallEntryResult::ErrorCopyFailed;
            }
            Err(e) => {
                tracing::error!("[{}] Failed to open {}: {}", self.name, package.path(), e);
                self.discard(&dir);
                return InstallEntryResult::ErrorCopyFailed;
            }
        }

        let meta = EntryMeta {
            title_id,
            title_type,
            source: package.path().to_string(),
            size: package.content_size(),
        };
        let written = serde_yaml_ng::to_string(&meta)
            .map_err(io::Error::other)
            .and_then(|yaml| fs::write(dir.join(META_FILE), yaml));
        if let Err(e) = written {
            tracing::error!("[{}] Failed to write metadata for {:016X}: {}", self.name, title_id, e);
            self.discard(&dir);
            return InstallEntryResult::ErrorMetaFailed;
        }

        tracing::info!(
            "[{}] Installed {:016X} ({}) from {}",
            self.name,
            title_id,
            title_type.label(),
            package.path()
        );

        if existed {
            InstallEntryResult::OverwriteExisting
        } else {
            InstallEntryResult::Success
        }
    }

    fn remove_existing_entry(&self, title_id: u64) -> bool {
        let dir = self.entry_dir(title_id);
        if !dir.exists() {
            return false;
        }
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!("[{}] Removed {:016X}", self.name, title_id);
                true
            }
            Err(e) => {
                tracing::error!("[{}] Failed to remove {:016X}: {}", self.name, title_id, e);
                false
            }
        }
    }

    fn has_entry(&self, title_id: u64) -> bool {
        self.entry_dir(title_id).join(META_FILE).exists()
    }

    fn list_entries(&self) -> Vec<StoreEntry> {
        let Ok(read_dir) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut entries: Vec<StoreEntry> = read_dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Utf8PathBuf::try_from(entry.path()).ok())
            .filter_map(|dir| Self::read_meta(&dir))
            .map(|meta| StoreEntry {
                title_id: meta.title_id,
                title_type: meta.title_type,
            })
            .collect();
        entries.sort_by_key(|e| e.title_id);
        entries
    }
}

/// The set of stores the frontend installs into and removes from.
#[derive(Clone)]
pub struct ContentStores {
    pub system_nand: Arc<dyn ContentStore>,
    pub user_nand: Arc<dyn ContentStore>,
    pub sdmc: Arc<dyn ContentStore>,
}

impl ContentStores {
    /// Filesystem stores under the configured NAND and SD directories.
    pub fn open_fs(paths: &PathSettings, base: &Utf8Path) -> Self {
        Self {
            system_nand: Arc::new(FsContentStore::new("system", paths.system_nand(base))),
            user_nand: Arc::new(FsContentStore::new("user", paths.user_nand(base))),
            sdmc: Arc::new(FsContentStore::new("sdmc", paths.sdmc(base))),
        }
    }

    pub fn for_target(&self, target: StoreTarget) -> &Arc<dyn ContentStore> {
        match target {
            StoreTarget::SystemNand => &self.system_nand,
            StoreTarget::UserNand => &self.user_nand,
            StoreTarget::Sdmc => &self.sdmc,
        }
    }

    /// Stores searched, in order, when removing installed content.
    pub fn removable(&self) -> [&Arc<dyn ContentStore>; 2] {
        [&self.user_nand, &self.sdmc]
    }
}
