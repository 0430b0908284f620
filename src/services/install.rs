use crate::metrics::Metrics;
use crate::models::{
    ContainerKind, ContentTitleType, INSTALL_BLOCK_SIZE, InstallBatch, InstallOutcome,
    InstallSummary, PackageFile, StoreTarget, base_title_id,
};
use crate::services::content_store::{
    BlockCopy, ContentSink, ContentStores, InstallEntryResult, InstallPolicy,
};
use crate::services::package::{Package, PackageReader, PackageStatus};
use crate::state::StateManager;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Another install is already running")]
    Busy,

    #[error("No installable files selected")]
    NoFiles,

    #[error("Install task failed: {0}")]
    Task(String),
}

/// Asks the operator which title type a bare NCA holds.
pub trait TitleTypePrompt {
    /// Returns a zero-based index into [`ContentTitleType::SELECTABLE`], or
    /// `None` if the operator declined.
    fn select_nca_title_type(&self, package: &PackageFile, default_index: usize) -> Option<usize>;
}

/// Block copier that ticks progress and honours cancellation.
///
/// The cancellation flag is checked before every block. Once it is set, or
/// the source turns out shorter than declared, the destination is resized to
/// zero and the copy reports failure.
pub struct ProgressCopier<F: FnMut()> {
    cancel: watch::Receiver<bool>,
    on_block: F,
    blocks: u64,
    cancelled: bool,
}

impl<F: FnMut()> ProgressCopier<F> {
    pub fn new(cancel: watch::Receiver<bool>, on_block: F) -> Self {
        Self {
            cancel,
            on_block,
            blocks: 0,
            cancelled: false,
        }
    }

    pub fn blocks_copied(&self) -> u64 {
        self.blocks
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn abort(dest: &mut dyn ContentSink) -> bool {
        if let Err(e) = dest.resize(0) {
            tracing::warn!("Failed to discard partial content: {}", e);
        }
        false
    }
}

impl<F: FnMut()> BlockCopy for ProgressCopier<F> {
    fn copy(&mut self, src: &mut dyn Read, src_len: u64, dest: &mut dyn ContentSink) -> bool {
        if let Err(e) = dest.resize(src_len) {
            tracing::error!("Failed to size destination to {} bytes: {}", src_len, e);
            return Self::abort(dest);
        }

        let mut buffer = vec![0u8; INSTALL_BLOCK_SIZE];
        let mut offset = 0u64;

        while offset < src_len {
            if *self.cancel.borrow() {
                tracing::info!("Copy cancelled at {}/{} bytes", offset, src_len);
                self.cancelled = true;
                return Self::abort(dest);
            }

            let len = (src_len - offset).min(INSTALL_BLOCK_SIZE as u64) as usize;
            if let Err(e) = src.read_exact(&mut buffer[..len]) {
                tracing::error!("Source ended early at {}/{} bytes: {}", offset, src_len, e);
                return Self::abort(dest);
            }
            if let Err(e) = dest.write_all(&buffer[..len]) {
                tracing::error!("Write failed at {}/{} bytes: {}", offset, src_len, e);
                return Self::abort(dest);
            }

            offset += len as u64;
            self.blocks += 1;
            (self.on_block)();
        }

        true
    }
}

/// Whether `title_id` is `program_id` itself, its update, or one of its add-ons.
pub fn belongs_to_program(title_id: u64, program_id: u64) -> bool {
    title_id == program_id
        || title_id == crate::models::update_title_id(program_id)
        || (title_id & 0x1000 != 0 && base_title_id(title_id) == program_id)
}

/// Sequentially installs an [`InstallBatch`] into the content stores.
pub struct InstallPipeline {
    stores: ContentStores,
    reader: Arc<dyn PackageReader>,
    state: StateManager,
    metrics: Arc<Metrics>,
    policy: InstallPolicy,
    default_nca_index: usize,
    running_title: Option<u64>,
}

impl InstallPipeline {
    pub fn new(
        stores: ContentStores,
        reader: Arc<dyn PackageReader>,
        state: StateManager,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            stores,
            reader,
            state,
            metrics,
            policy: InstallPolicy::default(),
            default_nca_index: ContentTitleType::DEFAULT_SELECTION,
            running_title: None,
        }
    }

    pub fn with_policy(mut self, policy: InstallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_overwrite(mut self, allow: bool) -> Self {
        self.policy.allow_overwrite = allow;
        self
    }

    /// Accept base applications from NSP/XCI containers.
    pub fn with_base_install(mut self, allow: bool) -> Self {
        self.policy.allow_base_install = allow;
        self
    }

    pub fn with_default_nca_title_type(mut self, index: usize) -> Self {
        self.default_nca_index = index;
        self
    }

    /// Packages belonging to this program are refused while it runs.
    pub fn with_running_title(mut self, title_id: Option<u64>) -> Self {
        self.running_title = title_id.filter(|&id| id != 0);
        self
    }

    /// Install every package in `batch`, recording one outcome per package.
    ///
    /// Failures never stop the batch. Once `cancel` is set the package being
    /// copied is discarded and every later package is recorded as failed
    /// without touching a store.
    pub fn run(
        &self,
        batch: &mut InstallBatch,
        prompt: &dyn TitleTypePrompt,
        cancel: &watch::Receiver<bool>,
    ) -> InstallSummary {
        let started = Instant::now();
        self.state.start_install(batch.len(), batch.total_blocks());
        tracing::info!(
            "Installing {} packages ({} blocks)",
            batch.len(),
            batch.total_blocks()
        );

        let packages = batch.packages().to_vec();
        for package in &packages {
            self.state
                .set_current_package(Some(package.file_name().to_string()));

            let (outcome, blocks) = self.install_one(package, prompt, cancel);
            batch.add_blocks(blocks);
            batch.record(&package.path, outcome);

            self.metrics.record_install_outcome(outcome);
            self.state
                .add_install_result(package.file_name().to_string(), outcome);
            tracing::info!("{}: {}", package.path, outcome);
        }

        self.state.finish_install();
        self.metrics.record_install_time(started.elapsed());

        let summary = batch.summary();
        tracing::info!("Install batch finished: {}", summary);
        summary
    }

    fn install_one(
        &self,
        file: &PackageFile,
        prompt: &dyn TitleTypePrompt,
        cancel: &watch::Receiver<bool>,
    ) -> (InstallOutcome, u64) {
        if *cancel.borrow() {
            tracing::info!("Skipping {} after cancellation", file.path);
            return (InstallOutcome::Failed, 0);
        }

        let package = match self.reader.open(file) {
            Ok(package) => package,
            Err(e) => {
                tracing::error!("Failed to open {}: {}", file.path, e);
                return (InstallOutcome::Failed, 0);
            }
        };

        if package.is_extracted() {
            tracing::error!("{} is an extracted package and cannot be installed", file.path);
            return (InstallOutcome::Failed, 0);
        }

        if let Some(running) = self.running_title
            && belongs_to_program(package.title_id(), running)
        {
            tracing::warn!(
                "Refusing to install {:016X} while it is running",
                package.title_id()
            );
            return (InstallOutcome::Failed, 0);
        }

        let Some((package, title_type, target)) = self.resolve_target(file, package, prompt) else {
            return (InstallOutcome::Failed, 0);
        };

        let store = self.stores.for_target(target);
        let state = &self.state;
        let metrics = &self.metrics;
        let mut copier = ProgressCopier::new(cancel.clone(), || {
            state.advance_install_progress(1);
            metrics.record_block_copied();
        });

        let result = store.install_entry(package.as_ref(), title_type, self.policy, &mut copier);
        let blocks = copier.blocks_copied();

        let outcome = match result {
            InstallEntryResult::Success => InstallOutcome::Installed,
            InstallEntryResult::OverwriteExisting => InstallOutcome::Overwritten,
            InstallEntryResult::ErrorBaseInstall => InstallOutcome::BaseInstallRejected,
            other => {
                if copier.was_cancelled() {
                    tracing::info!("{} cancelled", file.path);
                } else {
                    tracing::error!("[{}] install of {} failed: {:?}", store.name(), file.path, other);
                }
                InstallOutcome::Failed
            }
        };
        (outcome, blocks)
    }

    /// Work out title type and destination store for an opened package.
    fn resolve_target(
        &self,
        file: &PackageFile,
        package: Box<dyn Package>,
        prompt: &dyn TitleTypePrompt,
    ) -> Option<(Box<dyn Package>, ContentTitleType, StoreTarget)> {
        match file.kind {
            ContainerKind::Nca => {
                if !package.status().is_installable_nca() {
                    tracing::error!("{} is not a valid NCA: {:?}", file.path, package.status());
                    return None;
                }

                let Some(index) = prompt.select_nca_title_type(file, self.default_nca_index)
                else {
                    tracing::info!("Title type selection declined for {}", file.path);
                    return None;
                };
                let Some(title_type) = ContentTitleType::from_selection_index(index) else {
                    tracing::warn!("Invalid title type index {} for {}", index, file.path);
                    return None;
                };

                Some((package, title_type, title_type.target_store()))
            }
            ContainerKind::Nsp | ContainerKind::Xci => {
                let package = if file.kind == ContainerKind::Xci {
                    match package.secure_partition() {
                        Ok(nsp) => nsp,
                        Err(e) => {
                            tracing::error!("{}", e);
                            return None;
                        }
                    }
                } else {
                    package
                };

                if package.status() != PackageStatus::Success {
                    tracing::error!("{} failed to parse: {:?}", file.path, package.status());
                    return None;
                }

                let Some(title_type) = package.declared_title_type() else {
                    tracing::error!("{} declares no title type", file.path);
                    return None;
                };

                Some((package, title_type, StoreTarget::UserNand))
            }
        }
    }
}
