//! Integration tests for the install pipeline and installed-content removal
//!
//! These tests verify:
//! - Per-package outcome classification across NSP, XCI and NCA batches
//! - Mid-copy cancellation leaves no partial entry behind, at any cancel point
//! - Guards for extracted packages, declined prompts and running titles
//! - Controller notices after a batch and removal of a game's content

mod common;

use camino::{Utf8Path, Utf8PathBuf};
use common::{Answers, Calls, FakeLoaderFactory, build_controller, operator, utf8_temp, write_package};
use emuhost::models::{
    ContainerKind, ContentTitleType, INSTALL_BLOCK_SIZE, InstallBatch, InstallOutcome,
    InstallSummary, InstalledEntryType, PackageFile,
};
use emuhost::services::{
    ContentStores, FsPackageReader, InstallPipeline, Package, PackageError, PackageReader,
    PackageStatus, TitleTypePrompt,
};
use emuhost::{BootRequest, Metrics, SessionError, Settings, StateChange, StateManager};
use proptest::prelude::*;
use std::io::{self, Read};
use std::sync::Arc;
use tokio::sync::watch;

const BASE: u64 = 0x0100_0000_0001_0000;
const BLOCK: usize = INSTALL_BLOCK_SIZE;

struct FixedPrompt(Option<usize>);

impl TitleTypePrompt for FixedPrompt {
    fn select_nca_title_type(&self, _package: &PackageFile, _default_index: usize) -> Option<usize> {
        self.0
    }
}

struct Fixture {
    _temp: tempfile::TempDir,
    base: Utf8PathBuf,
    downloads: Utf8PathBuf,
    stores: ContentStores,
    state: StateManager,
    allow_base_install: bool,
}

fn fixture(allow_base_install: bool) -> Fixture {
    let (temp, base) = utf8_temp();
    let downloads = base.join("downloads");
    std::fs::create_dir_all(&downloads).unwrap();
    let stores = ContentStores::open_fs(&Settings::default().paths, &base);
    Fixture {
        _temp: temp,
        base,
        downloads,
        stores,
        state: StateManager::new(),
        allow_base_install,
    }
}

impl Fixture {
    fn pipeline_with(&self, reader: Arc<dyn PackageReader>) -> InstallPipeline {
        InstallPipeline::new(
            self.stores.clone(),
            reader,
            self.state.clone(),
            Arc::new(Metrics::new()),
        )
        .with_base_install(self.allow_base_install)
    }

    fn pipeline(&self) -> InstallPipeline {
        self.pipeline_with(Arc::new(FsPackageReader::new()))
    }

    fn package(&self, name: &str, len: usize) -> Utf8PathBuf {
        write_package(&self.downloads, name, len)
    }
}

fn not_cancelled() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

fn run(pipeline: &InstallPipeline, paths: &[&Utf8Path], prompt: Option<usize>) -> (InstallBatch, InstallSummary) {
    let mut batch = InstallBatch::from_paths(paths.iter().map(|p| p.to_path_buf()));
    let summary = pipeline.run(&mut batch, &FixedPrompt(prompt), &not_cancelled());
    (batch, summary)
}

#[test]
fn test_mixed_batch_outcomes() {
    let fx = fixture(false);
    let pipeline = fx.pipeline();

    let nca = fx.package("0100000000030000.nca", BLOCK * 2);
    let (_, first) = run(&pipeline, &[&nca], Some(5));
    assert_eq!(first.installed, 1);

    let update = fx.package("0100000000010800.nsp", BLOCK * 3 + 17);
    let card = fx.package("0100000000020000.xci", BLOCK);
    let (batch, summary) = run(&pipeline, &[&update, &nca, &card], Some(5));

    assert_eq!(batch.outcome(&update), Some(InstallOutcome::Installed));
    assert_eq!(batch.outcome(&nca), Some(InstallOutcome::Overwritten));
    assert_eq!(batch.outcome(&card), Some(InstallOutcome::BaseInstallRejected));
    assert_eq!(
        summary,
        InstallSummary {
            installed: 1,
            overwritten: 1,
            failed: 0,
            base_rejected: 1,
        }
    );

    assert!(fx.stores.user_nand.has_entry(0x0100_0000_0001_0800));
    assert!(fx.stores.user_nand.has_entry(0x0100_0000_0003_0000));
    assert!(!fx.stores.user_nand.has_entry(0x0100_0000_0002_0000));

    let snapshot = fx.state.snapshot();
    assert!(!snapshot.is_installing);
    assert_eq!(snapshot.packages_processed(), 3);
    assert_eq!(snapshot.base_rejected_packages, vec!["0100000000020000.xci".to_string()]);
}

#[test]
fn test_base_install_allowed_by_policy() {
    let fx = fixture(true);
    let card = fx.package("0100000000020000.xci", BLOCK);

    let (batch, summary) = run(&fx.pipeline(), &[&card], None);

    assert_eq!(batch.outcome(&card), Some(InstallOutcome::Installed));
    assert_eq!(summary.installed, 1);
    let entries = fx.stores.user_nand.list_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title_type, ContentTitleType::Application);
}

#[test]
fn test_overwrite_disabled_fails_existing_entry() {
    let fx = fixture(false);
    let update = fx.package("0100000000010800.nsp", BLOCK);
    let pipeline = fx.pipeline().with_overwrite(false);

    run(&pipeline, &[&update], None);
    let (batch, _) = run(&pipeline, &[&update], None);

    assert_eq!(batch.outcome(&update), Some(InstallOutcome::Failed));
    assert!(fx.stores.user_nand.has_entry(0x0100_0000_0001_0800));
}

#[test]
fn test_nca_system_types_go_to_system_nand() {
    let fx = fixture(false);
    let nca = fx.package("0100000000000809.nca", BLOCK);

    let (batch, _) = run(&fx.pipeline(), &[&nca], Some(0));

    assert_eq!(batch.outcome(&nca), Some(InstallOutcome::Installed));
    let entries = fx.stores.system_nand.list_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title_type, ContentTitleType::SystemProgram);
    assert!(fx.stores.user_nand.list_entries().is_empty());
}

#[test]
fn test_nca_declined_or_invalid_index_fails() {
    let fx = fixture(false);
    let nca = fx.package("0100000000030000.nca", BLOCK);

    let (declined, _) = run(&fx.pipeline(), &[&nca], None);
    let (invalid, _) = run(&fx.pipeline(), &[&nca], Some(9));

    assert_eq!(declined.outcome(&nca), Some(InstallOutcome::Failed));
    assert_eq!(invalid.outcome(&nca), Some(InstallOutcome::Failed));
    assert!(!fx.stores.user_nand.has_entry(0x0100_0000_0003_0000));
}

#[test]
fn test_extracted_package_fails() {
    let fx = fixture(false);
    let extracted = fx.downloads.join("0100000000010800.nsp");
    std::fs::create_dir_all(&extracted).unwrap();
    let other = fx.package("0100000000040800.nsp", BLOCK);

    let (batch, summary) = run(&fx.pipeline(), &[&extracted, &other], None);

    assert_eq!(batch.outcome(&extracted), Some(InstallOutcome::Failed));
    assert_eq!(batch.outcome(&other), Some(InstallOutcome::Installed));
    assert_eq!(summary.total(), 2);
}

#[test]
fn test_empty_nca_fails() {
    let fx = fixture(false);
    let nca = fx.package("0100000000030000.nca", 0);

    let (batch, _) = run(&fx.pipeline(), &[&nca], Some(5));

    assert_eq!(batch.outcome(&nca), Some(InstallOutcome::Failed));
}

#[test]
fn test_running_title_content_is_refused() {
    let fx = fixture(false);
    let update = fx.package("0100000000010800.nsp", BLOCK);
    let dlc = fx.package("0100000000011001.nsp", BLOCK);
    let unrelated = fx.package("0100000000050800.nsp", BLOCK);
    let pipeline = fx.pipeline().with_running_title(Some(BASE));

    let (batch, _) = run(&pipeline, &[&update, &dlc, &unrelated], None);

    assert_eq!(batch.outcome(&update), Some(InstallOutcome::Failed));
    assert_eq!(batch.outcome(&dlc), Some(InstallOutcome::Failed));
    assert_eq!(batch.outcome(&unrelated), Some(InstallOutcome::Installed));
    assert_eq!(fx.stores.user_nand.list_entries().len(), 1);
}

#[test]
fn test_progress_reaches_total_blocks() {
    let fx = fixture(false);
    let a = fx.package("0100000000010800.nsp", BLOCK * 3 + 1);
    let b = fx.package("0100000000021001.nsp", BLOCK);
    let mut rx = fx.state.subscribe();

    let (batch, _) = run(&fx.pipeline(), &[&a, &b], None);

    assert_eq!(batch.total_blocks(), 5);
    assert_eq!(batch.blocks_done(), 5);
    assert_eq!(fx.state.read(|s| s.install_blocks_done), 5);

    let mut ticks = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let StateChange::InstallProgress { blocks_done, .. } = event {
            ticks.push(blocks_done);
        }
    }
    // start_install publishes the zero mark before the first block.
    assert_eq!(ticks, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_cancel_before_run_fails_every_package() {
    let fx = fixture(false);
    let a = fx.package("0100000000010800.nsp", BLOCK);
    let b = fx.package("0100000000020800.nsp", BLOCK);
    let (tx, rx) = watch::channel(false);
    tx.send_replace(true);

    let mut batch = InstallBatch::from_paths([a.clone(), b.clone()]);
    let summary = fx.pipeline().run(&mut batch, &FixedPrompt(None), &rx);

    assert_eq!(summary.failed, 2);
    assert!(batch.is_complete());
    assert!(fx.stores.user_nand.list_entries().is_empty());
}

// Reader whose content streams raise the cancel flag after a byte budget.

struct TrippingReader {
    inner: FsPackageReader,
    trip_after: u64,
    cancel: Arc<watch::Sender<bool>>,
}

struct TrippingPackage {
    inner: Box<dyn Package>,
    trip_after: u64,
    cancel: Arc<watch::Sender<bool>>,
}

struct TrippingRead {
    inner: Box<dyn Read + Send>,
    remaining: u64,
    cancel: Arc<watch::Sender<bool>>,
}

impl PackageReader for TrippingReader {
    fn open(&self, file: &PackageFile) -> Result<Box<dyn Package>, PackageError> {
        Ok(Box::new(TrippingPackage {
            inner: self.inner.open(file)?,
            trip_after: self.trip_after,
            cancel: Arc::clone(&self.cancel),
        }))
    }
}

impl Package for TrippingPackage {
    fn path(&self) -> &Utf8Path {
        self.inner.path()
    }

    fn kind(&self) -> ContainerKind {
        self.inner.kind()
    }

    fn status(&self) -> PackageStatus {
        self.inner.status()
    }

    fn is_extracted(&self) -> bool {
        self.inner.is_extracted()
    }

    fn title_id(&self) -> u64 {
        self.inner.title_id()
    }

    fn declared_title_type(&self) -> Option<ContentTitleType> {
        self.inner.declared_title_type()
    }

    fn content_size(&self) -> u64 {
        self.inner.content_size()
    }

    fn open_content(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(TrippingRead {
            inner: self.inner.open_content()?,
            remaining: self.trip_after,
            cancel: Arc::clone(&self.cancel),
        }))
    }

    fn secure_partition(self: Box<Self>) -> Result<Box<dyn Package>, PackageError> {
        Ok(Box::new(TrippingPackage {
            inner: self.inner.secure_partition()?,
            trip_after: self.trip_after,
            cancel: self.cancel,
        }))
    }
}

impl Read for TrippingRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.remaining = self.remaining.saturating_sub(n as u64);
        if self.remaining == 0 {
            self.cancel.send_replace(true);
        }
        Ok(n)
    }
}

#[test]
fn test_cancel_mid_copy_discards_partial_entry() {
    let fx = fixture(false);
    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);
    let reader = TrippingReader {
        inner: FsPackageReader::new(),
        trip_after: (BLOCK * 2) as u64,
        cancel: Arc::clone(&tx),
    };
    let pipeline = fx.pipeline_with(Arc::new(reader));

    let big = fx.package("0100000000010800.nsp", BLOCK * 5);
    let later = fx.package("0100000000020800.nsp", BLOCK);
    let nca = fx.package("0100000000030000.nca", BLOCK);

    let mut batch = InstallBatch::from_paths([big.clone(), later.clone(), nca.clone()]);
    let summary = pipeline.run(&mut batch, &FixedPrompt(Some(5)), &rx);

    assert_eq!(batch.outcome(&big), Some(InstallOutcome::Failed));
    assert_eq!(batch.outcome(&later), Some(InstallOutcome::Failed));
    assert_eq!(batch.outcome(&nca), Some(InstallOutcome::Failed));
    assert_eq!(summary.total(), batch.len());
    assert_eq!(batch.blocks_done(), 2);

    let user_nand = Settings::default().paths.user_nand(&fx.base);
    assert!(!user_nand.join("0100000000010800").exists());
    assert!(fx.stores.user_nand.list_entries().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn cancelled_batch_records_every_package_once(
        sizes in prop::collection::vec(1usize..4 * BLOCK, 1..6),
        trip_after in 1u64..(4 * BLOCK) as u64,
    ) {
        let fx = fixture(false);
        let (tx, rx) = watch::channel(false);
        let reader = TrippingReader {
            inner: FsPackageReader::new(),
            trip_after,
            cancel: Arc::new(tx),
        };
        let pipeline = fx.pipeline_with(Arc::new(reader));

        let paths: Vec<Utf8PathBuf> = sizes
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                let title_id = 0x0100_0000_0001_0800u64 + ((i as u64) << 16);
                fx.package(&format!("{title_id:016X}.nsp"), len)
            })
            .collect();
        let tripped = sizes.iter().position(|&len| len as u64 >= trip_after);

        let mut batch = InstallBatch::from_paths(paths.clone());
        let summary = pipeline.run(&mut batch, &FixedPrompt(None), &rx);

        prop_assert!(batch.is_complete());
        prop_assert_eq!(summary.total(), batch.len());
        prop_assert!(batch.blocks_done() <= batch.total_blocks());
        for (i, path) in paths.iter().enumerate() {
            let outcome = batch.outcome(path);
            match tripped {
                Some(t) if i > t => {
                    prop_assert_eq!(outcome, Some(InstallOutcome::Failed));
                }
                Some(t) if i == t => {}
                _ => {
                    prop_assert_eq!(outcome, Some(InstallOutcome::Installed));
                }
            }
        }
        prop_assert_eq!(fx.stores.user_nand.list_entries().len(), summary.installed);
    }
}

// Controller-level install and removal

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn test_controller_notifies_operator_after_batch() {
    let (_temp, base) = utf8_temp();
    let rt = runtime();
    let calls = Arc::new(Calls::default());
    let mut controller = build_controller(
        &base,
        Settings::default(),
        operator(Answers::default(), &calls),
        FakeLoaderFactory::default(),
        &rt,
    );
    let update = write_package(&base, "0100000000010800.nsp", BLOCK);
    let card = write_package(&base, "0100000000010000.xci", BLOCK);
    let mut rx = controller.state().subscribe();

    let summary = controller.install_files(&[update, card]).unwrap();

    assert_eq!(summary.installed, 1);
    assert_eq!(summary.base_rejected, 1);
    assert_eq!(Calls::count(&calls.base_warnings), 1);
    assert_eq!(Calls::count(&calls.results_shown), 1);

    let mut invalidated = false;
    while let Ok(event) = rx.try_recv() {
        invalidated |= matches!(event, StateChange::GameListInvalidated);
    }
    assert!(invalidated);
}

#[test]
fn test_controller_skips_base_warning_without_rejections() {
    let (_temp, base) = utf8_temp();
    let rt = runtime();
    let calls = Arc::new(Calls::default());
    let mut controller = build_controller(
        &base,
        Settings::default(),
        operator(Answers::default(), &calls),
        FakeLoaderFactory::default(),
        &rt,
    );
    let update = write_package(&base, "0100000000010800.nsp", BLOCK);

    controller.install_files(&[update]).unwrap();

    assert_eq!(Calls::count(&calls.base_warnings), 0);
    assert_eq!(Calls::count(&calls.results_shown), 1);
}

#[test]
fn test_base_install_setting_applies_to_next_batch() {
    let (_temp, base) = utf8_temp();
    let rt = runtime();
    let calls = Arc::new(Calls::default());
    let mut controller = build_controller(
        &base,
        Settings::default(),
        operator(Answers::default(), &calls),
        FakeLoaderFactory::default(),
        &rt,
    );
    let card = write_package(&base, "0100000000010000.xci", BLOCK);

    let refused = controller.install_files(&[&card]).unwrap();
    assert_eq!(refused.base_rejected, 1);

    let mut settings = controller.global_settings().clone();
    settings.install.allow_base_install = true;
    controller.update_settings(settings);

    let accepted = controller.install_files(&[&card]).unwrap();
    assert_eq!(accepted.installed, 1);
    assert_eq!(accepted.base_rejected, 0);
    assert_eq!(Calls::count(&calls.base_warnings), 1);
}

#[test]
fn test_dismissed_results_clear_install_state() {
    let (_temp, base) = utf8_temp();
    let rt = runtime();
    let calls = Arc::new(Calls::default());
    let mut controller = build_controller(
        &base,
        Settings::default(),
        operator(Answers::default(), &calls),
        FakeLoaderFactory::default(),
        &rt,
    );
    let update = write_package(&base, "0100000000010800.nsp", BLOCK * 2);
    controller.install_files(&[update]).unwrap();
    assert_eq!(controller.state().read(|s| s.installed_packages.len()), 1);
    let mut rx = controller.state().subscribe();

    assert!(controller.dismiss_install_results());

    let snapshot = controller.state().snapshot();
    assert!(snapshot.installed_packages.is_empty());
    assert_eq!(snapshot.install_blocks_done, 0);
    assert_eq!(snapshot.install_blocks_total, 0);
    let mut saw_reset = false;
    while let Ok(event) = rx.try_recv() {
        saw_reset |= matches!(event, StateChange::StateReset);
    }
    assert!(saw_reset);
}

fn install_game_content(controller: &mut emuhost::SessionController, dir: &Utf8Path) {
    let base_nca = write_package(dir, "0100000000010000.nca", BLOCK);
    let update = write_package(dir, "0100000000010800.nsp", BLOCK);
    let dlc = write_package(dir, "0100000000011001.nsp", BLOCK);
    let unrelated = write_package(dir, "0100000000020800.nsp", BLOCK);
    let summary = controller
        .install_files(&[base_nca, update, dlc, unrelated])
        .unwrap();
    assert_eq!(summary.installed, 4);
}

#[test]
fn test_remove_game_removes_update_and_add_ons() {
    let (_temp, base) = utf8_temp();
    let rt = runtime();
    let calls = Arc::new(Calls::default());
    let settings = Settings::default();
    let stores = ContentStores::open_fs(&settings.paths, &base);
    let mut controller = build_controller(
        &base,
        settings,
        operator(Answers::default(), &calls),
        FakeLoaderFactory::default(),
        &rt,
    );
    install_game_content(&mut controller, &base);

    let removed = controller
        .remove_installed_entry(InstalledEntryType::Game, BASE)
        .unwrap();

    assert_eq!(removed, 3);
    let remaining: Vec<u64> = stores
        .user_nand
        .list_entries()
        .iter()
        .map(|e| e.title_id)
        .collect();
    assert_eq!(remaining, vec![0x0100_0000_0002_0800]);
}

#[test]
fn test_remove_update_only() {
    let (_temp, base) = utf8_temp();
    let rt = runtime();
    let calls = Arc::new(Calls::default());
    let settings = Settings::default();
    let stores = ContentStores::open_fs(&settings.paths, &base);
    let mut controller = build_controller(
        &base,
        settings,
        operator(Answers::default(), &calls),
        FakeLoaderFactory::default(),
        &rt,
    );
    install_game_content(&mut controller, &base);

    let removed = controller
        .remove_installed_entry(InstalledEntryType::Update, BASE)
        .unwrap();

    assert_eq!(removed, 1);
    assert!(stores.user_nand.has_entry(BASE));
    assert!(!stores.user_nand.has_entry(0x0100_0000_0001_0800));
    assert!(stores.user_nand.has_entry(0x0100_0000_0001_1001));
}

#[test]
fn test_remove_declined_keeps_content() {
    let (_temp, base) = utf8_temp();
    let rt = runtime();
    let calls = Arc::new(Calls::default());
    let settings = Settings::default();
    let stores = ContentStores::open_fs(&settings.paths, &base);
    let answers = Answers {
        confirm: false,
        ..Answers::default()
    };
    let mut controller = build_controller(
        &base,
        settings,
        operator(answers, &calls),
        FakeLoaderFactory::default(),
        &rt,
    );
    install_game_content(&mut controller, &base);

    let removed = controller
        .remove_installed_entry(InstalledEntryType::AddOnContent, BASE)
        .unwrap();

    assert_eq!(removed, 0);
    assert_eq!(stores.user_nand.list_entries().len(), 4);
}

#[test]
fn test_remove_running_title_is_refused() {
    let (_temp, base) = utf8_temp();
    let rt = runtime();
    let calls = Arc::new(Calls::default());
    let mut controller = build_controller(
        &base,
        Settings::default(),
        operator(Answers::default(), &calls),
        FakeLoaderFactory::default(),
        &rt,
    );
    controller
        .boot_game(BootRequest::new(base.join("0100000000010000.nsp")))
        .unwrap();

    let result = controller.remove_installed_entry(InstalledEntryType::Game, BASE);

    assert!(matches!(result, Err(SessionError::TitleInUse(id)) if id == BASE));
    controller.request_stop().unwrap();
}
