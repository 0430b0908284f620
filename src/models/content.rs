use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Bytes copied per progress tick during installation.
pub const INSTALL_BLOCK_SIZE: usize = 0x1000;

/// Classification of installable title content.
///
/// The discriminants match the on-disk content metadata. There is a deliberate
/// hole between [`FirmwarePackageB`](Self::FirmwarePackageB) (0x05) and
/// [`Application`](Self::Application) (0x80); everything at or above the
/// application boundary lives in the user content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ContentTitleType {
    SystemProgram = 0x01,
    SystemDataArchive = 0x02,
    SystemUpdate = 0x03,
    FirmwarePackageA = 0x04,
    FirmwarePackageB = 0x05,
    Application = 0x80,
    Update = 0x81,
    AddOnContent = 0x82,
    DeltaTitle = 0x83,
}

/// Which store a title type is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreTarget {
    SystemNand,
    UserNand,
    Sdmc,
}

impl ContentTitleType {
    /// Title types in the order an operator is offered them for a bare NCA.
    pub const SELECTABLE: [ContentTitleType; 9] = [
        Self::SystemProgram,
        Self::SystemDataArchive,
        Self::SystemUpdate,
        Self::FirmwarePackageA,
        Self::FirmwarePackageB,
        Self::Application,
        Self::Update,
        Self::AddOnContent,
        Self::DeltaTitle,
    ];

    /// Pre-selected entry in the NCA title type prompt ("Game").
    pub const DEFAULT_SELECTION: usize = 5;

    /// First selection index that lies past the enumeration gap.
    pub const GAP_INDEX: usize = 5;

    /// Number of unused discriminants between `FirmwarePackageB` and `Application`.
    pub const GAP_WIDTH: u8 = Self::Application as u8 - Self::FirmwarePackageB as u8 - 1;

    /// Map a zero-based selection index to a title type.
    ///
    /// Indices below [`GAP_INDEX`](Self::GAP_INDEX) map directly onto the
    /// system range starting at 0x01; indices at or past it are shifted by
    /// [`GAP_WIDTH`](Self::GAP_WIDTH). Returns `None` for indices beyond the
    /// last selectable entry.
    pub fn from_selection_index(index: usize) -> Option<Self> {
        if index >= Self::SELECTABLE.len() {
            return None;
        }
        let mut raw = index as u8 + 1;
        if index >= Self::GAP_INDEX {
            raw += Self::GAP_WIDTH;
        }
        Self::from_raw(raw)
    }

    /// Inverse of [`from_selection_index`](Self::from_selection_index).
    pub fn selection_index(self) -> usize {
        let raw = self.as_u8();
        if raw >= Self::Application.as_u8() {
            (raw - Self::GAP_WIDTH - 1) as usize
        } else {
            (raw - 1) as usize
        }
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::SystemProgram),
            0x02 => Some(Self::SystemDataArchive),
            0x03 => Some(Self::SystemUpdate),
            0x04 => Some(Self::FirmwarePackageA),
            0x05 => Some(Self::FirmwarePackageB),
            0x80 => Some(Self::Application),
            0x81 => Some(Self::Update),
            0x82 => Some(Self::AddOnContent),
            0x83 => Some(Self::DeltaTitle),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Store a bare NCA of this type is installed into.
    pub fn target_store(self) -> StoreTarget {
        if self.as_u8() >= Self::Application.as_u8() {
            StoreTarget::UserNand
        } else {
            StoreTarget::SystemNand
        }
    }

    /// Operator-facing label.
    pub fn label(self) -> &'static str {
        match self {
            Self::SystemProgram => "System Application",
            Self::SystemDataArchive => "System Archive",
            Self::SystemUpdate => "System Application Update",
            Self::FirmwarePackageA => "Firmware Package (Type A)",
            Self::FirmwarePackageB => "Firmware Package (Type B)",
            Self::Application => "Game",
            Self::Update => "Game Update",
            Self::AddOnContent => "Game DLC",
            Self::DeltaTitle => "Delta Title",
        }
    }
}

/// Container format of a package, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    Nsp,
    Xci,
    Nca,
}

impl ContainerKind {
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        let ext = path.extension()?.to_ascii_lowercase();
        match ext.as_str() {
            "nsp" => Some(Self::Nsp),
            "xci" => Some(Self::Xci),
            "nca" => Some(Self::Nca),
            _ => None,
        }
    }

    /// NSP and XCI carry their own title metadata; a bare NCA does not.
    pub fn is_container(self) -> bool {
        matches!(self, Self::Nsp | Self::Xci)
    }
}

/// An installable file queued for installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub path: Utf8PathBuf,
    pub kind: ContainerKind,
    pub size: u64,
}

impl PackageFile {
    /// Build a package reference from a path on disk.
    ///
    /// Returns `None` when the extension is not an installable format.
    /// Directories (extracted NSPs) report a size of zero.
    pub fn from_path(path: impl Into<Utf8PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = ContainerKind::from_path(&path)?;
        let size = std::fs::metadata(&path)
            .map(|m| if m.is_file() { m.len() } else { 0 })
            .unwrap_or(0);
        Some(Self { path, kind, size })
    }

    /// Number of progress ticks copying this package will take.
    pub fn block_count(&self) -> u64 {
        self.size.div_ceil(INSTALL_BLOCK_SIZE as u64)
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallOutcome {
    Installed,
    Overwritten,
    Failed,
    BaseInstallRejected,
}

impl std::fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Installed => "installed",
            Self::Overwritten => "overwritten",
            Self::Failed => "failed",
            Self::BaseInstallRejected => "base install rejected",
        };
        f.write_str(label)
    }
}

/// An ordered set of packages being installed together.
///
/// Each package receives exactly one outcome; outcomes are never replaced once
/// recorded.
#[derive(Debug, Clone, Default)]
pub struct InstallBatch {
    packages: Vec<PackageFile>,
    outcomes: IndexMap<Utf8PathBuf, InstallOutcome>,
    blocks_done: u64,
}

impl InstallBatch {
    /// Duplicate paths are collapsed so each package maps to one outcome.
    pub fn new(mut packages: Vec<PackageFile>) -> Self {
        let mut seen = std::collections::HashSet::new();
        packages.retain(|p| seen.insert(p.path.clone()));
        Self {
            packages,
            outcomes: IndexMap::new(),
            blocks_done: 0,
        }
    }

    /// Build a batch from paths, dropping anything that is not NSP/XCI/NCA.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        Self::new(paths.into_iter().filter_map(PackageFile::from_path).collect())
    }

    pub fn packages(&self) -> &[PackageFile] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.packages.len() - self.outcomes.len()
    }

    pub fn total_blocks(&self) -> u64 {
        self.packages.iter().map(PackageFile::block_count).sum()
    }

    pub fn blocks_done(&self) -> u64 {
        self.blocks_done
    }

    pub(crate) fn add_blocks(&mut self, blocks: u64) {
        self.blocks_done += blocks;
    }

    /// Record a package's outcome. The first outcome recorded for a path wins.
    pub fn record(&mut self, path: &Utf8Path, outcome: InstallOutcome) -> bool {
        if self.outcomes.contains_key(path) {
            tracing::warn!("Ignoring second outcome {} for {}", outcome, path);
            return false;
        }
        self.outcomes.insert(path.to_path_buf(), outcome);
        true
    }

    pub fn outcome(&self, path: &Utf8Path) -> Option<InstallOutcome> {
        self.outcomes.get(path).copied()
    }

    pub fn outcomes(&self) -> &IndexMap<Utf8PathBuf, InstallOutcome> {
        &self.outcomes
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    pub fn summary(&self) -> InstallSummary {
        InstallSummary::from_outcomes(self.outcomes.values().copied())
    }
}

/// Aggregate counts shown to the operator after a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSummary {
    pub installed: usize,
    pub overwritten: usize,
    pub failed: usize,
    pub base_rejected: usize,
}

impl InstallSummary {
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = InstallOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.add(outcome);
        }
        summary
    }

    pub fn add(&mut self, outcome: InstallOutcome) {
        match outcome {
            InstallOutcome::Installed => self.installed += 1,
            InstallOutcome::Overwritten => self.overwritten += 1,
            InstallOutcome::Failed => self.failed += 1,
            InstallOutcome::BaseInstallRejected => self.base_rejected += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.installed + self.overwritten + self.failed + self.base_rejected
    }

    pub fn has_base_rejections(&self) -> bool {
        self.base_rejected > 0
    }
}

impl std::fmt::Display for InstallSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} installed, {} overwritten, {} failed",
            self.installed, self.overwritten, self.failed
        )?;
        if self.base_rejected > 0 {
            write!(f, ", {} base installs rejected", self.base_rejected)?;
        }
        Ok(())
    }
}

/// Kind of installed content an operator asks to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstalledEntryType {
    Game,
    Update,
    AddOnContent,
}

/// Title id of the update that patches `program_id`.
pub fn update_title_id(program_id: u64) -> u64 {
    program_id | 0x800
}

/// Base application id an add-on content title id belongs to.
pub fn base_title_id(title_id: u64) -> u64 {
    (title_id ^ 0x1000) & !0xFFF
}
