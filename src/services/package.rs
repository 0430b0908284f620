use crate::models::{ContainerKind, ContentTitleType, PackageFile};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;
use std::io::{self, Read};
use thiserror::Error;

/// Parse state reported by a package reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Success,
    /// Usable NCA that patches a base RomFS not present alongside it.
    MissingBaseRomFs,
    MissingTitleId,
    Empty,
    Malformed,
}

impl PackageStatus {
    /// Whether a bare NCA in this state may be installed.
    pub fn is_installable_nca(self) -> bool {
        matches!(self, Self::Success | Self::MissingBaseRomFs)
    }
}

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Unsupported package format: {0}")]
    UnsupportedFormat(Utf8PathBuf),

    #[error("{0} has no secure partition")]
    NoSecurePartition(Utf8PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// An opened NSP, XCI or NCA.
pub trait Package: Send {
    fn path(&self) -> &Utf8Path;

    fn kind(&self) -> ContainerKind;

    fn status(&self) -> PackageStatus;

    /// The package is an unpacked directory rather than an archive.
    fn is_extracted(&self) -> bool;

    fn title_id(&self) -> u64;

    /// Title type carried by the package's own metadata. Bare NCAs have none.
    fn declared_title_type(&self) -> Option<ContentTitleType>;

    /// Bytes [`open_content`](Self::open_content) will yield.
    fn content_size(&self) -> u64;

    fn open_content(&self) -> io::Result<Box<dyn Read + Send>>;

    /// For a game card image, the NSP-shaped secure partition inside it.
    fn secure_partition(self: Box<Self>) -> Result<Box<dyn Package>, PackageError>;
}

/// Opens queued files as [`Package`]s.
pub trait PackageReader: Send + Sync {
    fn open(&self, file: &PackageFile) -> Result<Box<dyn Package>, PackageError>;
}

/// Reads packages directly from the filesystem.
///
/// Archive internals are not parsed: the title id comes from the 16-digit
/// hex id embedded in the file name (the usual dump naming), and the whole
/// file is treated as the content to store.
pub struct FsPackageReader {
    title_id_pattern: Regex,
}

impl FsPackageReader {
    pub fn new() -> Self {
        Self {
            title_id_pattern: Regex::new(r"(?:^|[^0-9A-Fa-f])([0-9A-Fa-f]{16})(?:[^0-9A-Fa-f]|$)")
                .expect("Invalid title id regex"),
        }
    }

    pub fn parse_title_id(&self, path: &Utf8Path) -> Option<u64> {
        let name = path.file_name()?;
        let caps = self.title_id_pattern.captures(name)?;
        u64::from_str_radix(caps.get(1)?.as_str(), 16).ok()
    }
}

impl Default for FsPackageReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageReader for FsPackageReader {
    fn open(&self, file: &PackageFile) -> Result<Box<dyn Package>, PackageError> {
        let metadata = fs::metadata(&file.path)?;
        let extracted = metadata.is_dir();
        let size = if extracted { 0 } else { metadata.len() };
        let title_id = self.parse_title_id(&file.path).unwrap_or(0);

        let status = if extracted {
            PackageStatus::Success
        } else if size == 0 {
            PackageStatus::Empty
        } else if title_id == 0 {
            PackageStatus::MissingTitleId
        } else {
            PackageStatus::Success
        };

        tracing::debug!(
            "Opened {} ({:?}): title_id={:016X} size={} status={:?}",
            file.path,
            file.kind,
            title_id,
            size,
            status
        );

        Ok(Box::new(FsPackage {
            path: file.path.clone(),
            kind: file.kind,
            status,
            extracted,
            title_id,
            size,
        }))
    }
}

struct FsPackage {
    path: Utf8PathBuf,
    kind: ContainerKind,
    status: PackageStatus,
    extracted: bool,
    title_id: u64,
    size: u64,
}

/// Title type implied by where a title id sits in its application's id range.
pub fn title_type_from_id(title_id: u64) -> ContentTitleType {
    if title_id & 0x1000 != 0 {
        ContentTitleType::AddOnContent
    } else if title_id & 0xFFF == 0x800 {
        ContentTitleType::Update
    } else {
        ContentTitleType::Application
    }
}

impl Package for FsPackage {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn kind(&self) -> ContainerKind {
        self.kind
    }

    fn status(&self) -> PackageStatus {
        self.status
    }

    fn is_extracted(&self) -> bool {
        self.extracted
    }

    fn title_id(&self) -> u64 {
        self.title_id
    }

    fn declared_title_type(&self) -> Option<ContentTitleType> {
        if self.kind.is_container() && self.title_id != 0 {
            Some(title_type_from_id(self.title_id))
        } else {
            None
        }
    }

    fn content_size(&self) -> u64 {
        self.size
    }

    fn open_content(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(&self.path)?))
    }

    fn secure_partition(self: Box<Self>) -> Result<Box<dyn Package>, PackageError> {
        if self.kind != ContainerKind::Xci {
            return Err(PackageError::NoSecurePartition(self.path));
        }
        Ok(Box::new(FsPackage {
            kind: ContainerKind::Nsp,
            ..*self
        }))
    }
}
