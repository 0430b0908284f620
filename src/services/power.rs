use std::sync::atomic::{AtomicBool, Ordering};

/// Keeps the host awake while a program runs.
pub trait SleepInhibitor: Send + Sync {
    fn prevent_sleep(&self);
    fn allow_sleep(&self);
    fn is_inhibited(&self) -> bool;
}

/// Tracks the requested inhibition and logs it.
///
/// Used where no platform power API is wired in.
#[derive(Debug, Default)]
pub struct LoggingSleepInhibitor {
    inhibited: AtomicBool,
}

impl LoggingSleepInhibitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SleepInhibitor for LoggingSleepInhibitor {
    fn prevent_sleep(&self) {
        if !self.inhibited.swap(true, Ordering::AcqRel) {
            tracing::debug!("OS sleep inhibited");
        }
    }

    fn allow_sleep(&self) {
        if self.inhibited.swap(false, Ordering::AcqRel) {
            tracing::debug!("OS sleep allowed");
        }
    }

    fn is_inhibited(&self) -> bool {
        self.inhibited.load(Ordering::Acquire)
    }
}
