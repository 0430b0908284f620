// Runtime metrics
//
// Lock-free counters for installs and sessions, logged on shutdown.

use crate::models::InstallOutcome;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters collected over the application lifetime.
#[derive(Debug)]
pub struct Metrics {
    pub packages_installed: AtomicUsize,
    pub packages_overwritten: AtomicUsize,
    pub packages_failed: AtomicUsize,
    pub base_installs_rejected: AtomicUsize,

    /// 4 KiB blocks written into content stores
    pub blocks_copied: AtomicU64,

    /// Wall time spent inside install batches, in milliseconds
    pub total_install_time_ms: AtomicU64,

    pub sessions_booted: AtomicUsize,
    pub load_failures: AtomicUsize,
    pub fatal_errors: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            packages_installed: AtomicUsize::new(0),
            packages_overwritten: AtomicUsize::new(0),
            packages_failed: AtomicUsize::new(0),
            base_installs_rejected: AtomicUsize::new(0),
            blocks_copied: AtomicU64::new(0),
            total_install_time_ms: AtomicU64::new(0),
            sessions_booted: AtomicUsize::new(0),
            load_failures: AtomicUsize::new(0),
            fatal_errors: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_install_outcome(&self, outcome: InstallOutcome) {
        let counter = match outcome {
            InstallOutcome::Installed => &self.packages_installed,
            InstallOutcome::Overwritten => &self.packages_overwritten,
            InstallOutcome::Failed => &self.packages_failed,
            InstallOutcome::BaseInstallRejected => &self.base_installs_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block_copied(&self) {
        self.blocks_copied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_install_time(&self, duration: Duration) {
        self.total_install_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_session_booted(&self) {
        self.sessions_booted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fatal_error(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Packages that received any outcome
    pub fn packages_processed(&self) -> usize {
        self.packages_installed.load(Ordering::Relaxed)
            + self.packages_overwritten.load(Ordering::Relaxed)
            + self.packages_failed.load(Ordering::Relaxed)
            + self.base_installs_rejected.load(Ordering::Relaxed)
    }

    /// Average copy throughput in MiB/s, 0 when nothing was installed.
    pub fn install_throughput_mib_s(&self) -> f64 {
        let ms = self.total_install_time_ms.load(Ordering::Relaxed);
        if ms == 0 {
            return 0.0;
        }
        let bytes = self.blocks_copied.load(Ordering::Relaxed) as f64
            * crate::models::INSTALL_BLOCK_SIZE as f64;
        (bytes / (1024.0 * 1024.0)) / (ms as f64 / 1000.0)
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Packages: {} installed, {} overwritten, {} failed, {} base installs rejected",
            self.packages_installed.load(Ordering::Relaxed),
            self.packages_overwritten.load(Ordering::Relaxed),
            self.packages_failed.load(Ordering::Relaxed),
            self.base_installs_rejected.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Blocks copied: {} ({:.1} MiB/s)",
            self.blocks_copied.load(Ordering::Relaxed),
            self.install_throughput_mib_s()
        );
        tracing::info!(
            "Sessions: {} booted, {} load failures, {} fatal errors",
            self.sessions_booted.load(Ordering::Relaxed),
            self.load_failures.load(Ordering::Relaxed),
            self.fatal_errors.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
