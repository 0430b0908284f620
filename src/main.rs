//! emuhost - console emulator frontend core
//!
//! Command-line entry point. It initializes:
//! - Configuration ([`ConfigManager`]): `settings.yaml` plus `EMUHOST_*` overrides
//! - Logging (daily rotating file + optional console output)
//! - Tokio runtime (background installs, Ctrl-C handling)
//! - [`SessionController`] with the headless back ends
//!
//! # Execution Flow
//!
//! 1. Parse arguments and load settings from the config directory
//! 2. Install `--install` packages as one batch
//! 3. Boot `--game` and pump worker events until the program exits or Ctrl-C
//! 4. Close the session, persist settings and log metrics

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use emuhost::ui::{ControllerServices, EventLoopBridge};
use emuhost::{APP_NAME, BootRequest, ConfigManager, SessionController, VERSION};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const PUMP_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "emuhost", version, about = "Install titles and run emulation sessions")]
struct Args {
    /// Program file to boot (NSP, XCI or NCA)
    #[arg(short, long)]
    game: Option<Utf8PathBuf>,

    /// User profile index to boot with
    #[arg(short, long)]
    user: Option<usize>,

    /// Start in fullscreen
    #[arg(short, long, default_value_t = false)]
    fullscreen: bool,

    /// Program index inside a multi-program package
    #[arg(long, default_value_t = 0)]
    program: usize,

    /// Package files to install before booting
    #[arg(long, num_args = 1..)]
    install: Vec<Utf8PathBuf>,

    /// Directory holding settings.yaml, NAND, SD and logs
    #[arg(long, default_value = "emuhost-data")]
    config_dir: Utf8PathBuf,

    /// Log at debug level
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_manager = ConfigManager::new(&args.config_dir)?;
    let stored = config_manager.load_stored_settings()?;
    // Overrides apply to this run only; `stored` is what gets saved.
    let mut settings = config_manager.load_settings()?;
    settings.logging.debug |= args.debug;
    settings.general.fullscreen |= args.fullscreen;

    let log_dir = settings.paths.logs(config_manager.config_dir());
    let _guard = emuhost::logging::setup_logging(&log_dir, APP_NAME, &settings.logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("emuhost-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    let bridge = EventLoopBridge::new(runtime.handle().clone());
    let services = ControllerServices::headless(&settings, config_manager.config_dir());
    let mut controller = SessionController::new(
        config_manager,
        settings,
        services,
        runtime.handle().clone(),
    )
    .with_bridge(bridge.clone())
    .with_stored_settings(stored);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        let cancel = controller.cancel_handle();
        bridge.spawn_async(move || async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received");
                cancel.cancel();
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }

    if !args.install.is_empty() {
        match controller.install_files(&args.install) {
            Ok(summary) => tracing::info!("Install finished: {}", summary),
            Err(e) => tracing::error!("Install failed: {}", e),
        }
        controller.dismiss_install_results();
    }

    if let Some(game) = args.game
        && !interrupted.load(Ordering::SeqCst)
    {
        let mut request = BootRequest::new(game).with_program_index(args.program);
        if let Some(user) = args.user {
            request = request.with_user(user);
        }
        if let Err(e) = controller.boot_game(request) {
            tracing::error!("Boot failed: {}", e);
        }
    }

    while !interrupted.load(Ordering::SeqCst) && controller.session().state().is_active() {
        controller.pump_events();
        std::thread::sleep(PUMP_INTERVAL);
    }

    controller.request_close();
    let metrics = controller.metrics();
    drop(controller);

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");

    Ok(())
}
