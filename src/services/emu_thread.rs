// Emulation worker thread
//
// The core runs in slices on a dedicated std thread. The controller drives it
// through set_running / request_stop and hears back through WorkerEvent values
// on a tokio channel; nothing crosses the boundary as a panic.

use crate::services::loader::SystemStatus;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long the worker sleeps between checks for a debug-mode acknowledgement.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of running one slice of emulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreStatus {
    Continue,
    /// Still bringing the program up (shader cache, etc).
    Loading {
        stage: String,
        value: u64,
        total: u64,
    },
    /// A debugger stopped execution.
    DebugBreak,
    Error {
        status: SystemStatus,
        details: String,
    },
    /// The program asked to launch another program in the same package.
    ExecuteProgram { program_index: usize },
    /// The program terminated itself.
    Exited,
}

/// A loaded program, owned by the worker thread while it runs.
pub trait EmulationCore: Send {
    fn run_slice(&mut self) -> CoreStatus;

    /// The program has asked not to be interrupted (e.g. while saving).
    fn exit_locked(&self) -> bool;

    fn is_64bit(&self) -> bool;

    fn gpu_vendor(&self) -> String;

    fn shutdown(&mut self);
}

/// Notifications from the worker to the controller.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The core failed. The worker has already stopped executing.
    ErrorThrown {
        status: SystemStatus,
        details: String,
    },
    /// Execution stopped for the debugger. The worker blocks until `ack` fires.
    DebugModeEntered { ack: std_mpsc::SyncSender<()> },
    /// Execution is about to continue after a debug break. The worker blocks
    /// until `ack` fires.
    DebugModeLeft { ack: std_mpsc::SyncSender<()> },
    LoadProgress {
        stage: String,
        value: u64,
        total: u64,
    },
    ExecuteProgram { program_index: usize },
    Exited,
}

#[derive(Debug, Default)]
struct Control {
    running: bool,
    stop: bool,
}

#[derive(Debug, Default)]
struct Shared {
    control: Mutex<Control>,
    changed: Condvar,
    exit_lock: AtomicBool,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_requested(&self) -> bool {
        self.lock().stop
    }

    fn set_running(&self, running: bool) {
        self.lock().running = running;
        self.changed.notify_all();
    }

    /// Block until running or stopping. Returns false when stopping.
    fn wait_until_runnable(&self) -> bool {
        let mut control = self.lock();
        while !control.running && !control.stop {
            control = self
                .changed
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !control.stop
    }
}

/// Handle to the worker thread of one session.
pub struct EmuThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl EmuThread {
    /// Spawn the worker. It starts paused; call [`set_running`](Self::set_running).
    pub fn start(
        core: Box<dyn EmulationCore>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);

        let handle = std::thread::Builder::new()
            .name("emu-thread".to_string())
            .spawn(move || worker_loop(core, worker_shared, events))?;

        tracing::debug!("Emulation thread started");
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub fn set_running(&self, running: bool) {
        self.shared.set_running(running);
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Last exit-lock state the core reported.
    pub fn exit_locked(&self) -> bool {
        self.shared.exit_lock.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it to finish shutting the core down.
    pub fn request_stop(&mut self) {
        {
            let mut control = self.shared.lock();
            control.stop = true;
            control.running = false;
        }
        self.shared.changed.notify_all();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Emulation thread panicked");
            } else {
                tracing::debug!("Emulation thread joined");
            }
        }
    }
}

impl Drop for EmuThread {
    fn drop(&mut self) {
        self.request_stop();
    }
}

/// Send a handshake event and wait for the controller to acknowledge it.
///
/// Gives up if a stop is requested or the controller went away, so a
/// controller blocked in `request_stop` can never deadlock with us.
fn handshake(
    shared: &Shared,
    events: &mpsc::UnboundedSender<WorkerEvent>,
    make: impl FnOnce(std_mpsc::SyncSender<()>) -> WorkerEvent,
) -> bool {
    let (ack_tx, ack_rx) = std_mpsc::sync_channel(1);
    if events.send(make(ack_tx)).is_err() {
        return false;
    }
    loop {
        match ack_rx.recv_timeout(ACK_POLL_INTERVAL) {
            Ok(()) => return true,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => return false,
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                if shared.stop_requested() {
                    return false;
                }
            }
        }
    }
}

fn worker_loop(
    mut core: Box<dyn EmulationCore>,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut in_debug_break = false;

    loop {
        if !shared.wait_until_runnable() {
            break;
        }

        if in_debug_break {
            in_debug_break = false;
            if !handshake(&shared, &events, |ack| WorkerEvent::DebugModeLeft { ack }) {
                break;
            }
        }

        let status = core.run_slice();
        shared.exit_lock.store(core.exit_locked(), Ordering::Release);

        match status {
            CoreStatus::Continue => {}
            CoreStatus::Loading {
                stage,
                value,
                total,
            } => {
                let _ = events.send(WorkerEvent::LoadProgress {
                    stage,
                    value,
                    total,
                });
            }
            CoreStatus::DebugBreak => {
                shared.set_running(false);
                in_debug_break = true;
                if !handshake(&shared, &events, |ack| WorkerEvent::DebugModeEntered { ack }) {
                    break;
                }
            }
            CoreStatus::Error { status, details } => {
                tracing::error!("Core error {}: {}", status, details);
                shared.set_running(false);
                let _ = events.send(WorkerEvent::ErrorThrown { status, details });
            }
            CoreStatus::ExecuteProgram { program_index } => {
                shared.set_running(false);
                let _ = events.send(WorkerEvent::ExecuteProgram { program_index });
            }
            CoreStatus::Exited => {
                let _ = events.send(WorkerEvent::Exited);
                break;
            }
        }
    }

    core.shutdown();
    tracing::debug!("Emulation thread exiting");
}
