// Headless loader and core
//
// Stand-ins for a linked emulation backend: they validate the program file,
// report a short loading phase and then idle at frame rate. The binary uses
// them so session control can be driven from the command line.

use crate::models::ContainerKind;
use crate::services::emu_thread::{CoreStatus, EmulationCore};
use crate::services::loader::{ControlData, Loader, LoaderFactory, SystemStatus};
use crate::services::package::FsPackageReader;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::time::Duration;

/// One emulated frame at 60 Hz.
const FRAME_TIME: Duration = Duration::from_micros(16_667);

/// Loader error code for a zero-length program image.
pub const LOADER_ERROR_EMPTY_IMAGE: u16 = 0x01;

const LOAD_STEPS: u64 = 3;

/// Loader factory for program files on disk.
pub struct HeadlessLoaderFactory {
    reader: FsPackageReader,
}

impl HeadlessLoaderFactory {
    pub fn new() -> Self {
        Self {
            reader: FsPackageReader::new(),
        }
    }
}

impl Default for HeadlessLoaderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderFactory for HeadlessLoaderFactory {
    fn get_loader(&self, path: &Utf8Path, program_index: usize) -> Option<Box<dyn Loader>> {
        ContainerKind::from_path(path)?;
        if !path.is_file() {
            return None;
        }
        tracing::debug!("Headless loader for {} (program {})", path, program_index);
        Some(Box::new(HeadlessLoader {
            path: path.to_path_buf(),
            title_id: self.reader.parse_title_id(path).unwrap_or(0),
        }))
    }
}

struct HeadlessLoader {
    path: Utf8PathBuf,
    title_id: u64,
}

impl Loader for HeadlessLoader {
    fn read_program_id(&self) -> Result<u64, SystemStatus> {
        Ok(self.title_id)
    }

    fn read_control_data(&self) -> Option<ControlData> {
        None
    }

    fn load(self: Box<Self>, program_index: usize) -> Result<Box<dyn EmulationCore>, SystemStatus> {
        let size = fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|_| SystemStatus::ERROR_GET_LOADER)?;
        if size == 0 {
            return Err(SystemStatus::loader_error(LOADER_ERROR_EMPTY_IMAGE));
        }
        tracing::info!(
            "Headless core loaded {} (program {}, {} bytes)",
            self.path,
            program_index,
            size
        );
        Ok(Box::new(HeadlessCore { load_step: 0 }))
    }
}

/// Core that idles at frame rate.
pub struct HeadlessCore {
    load_step: u64,
}

impl EmulationCore for HeadlessCore {
    fn run_slice(&mut self) -> CoreStatus {
        std::thread::sleep(FRAME_TIME);
        if self.load_step < LOAD_STEPS {
            self.load_step += 1;
            return CoreStatus::Loading {
                stage: "Preparing".to_string(),
                value: self.load_step,
                total: LOAD_STEPS,
            };
        }
        CoreStatus::Continue
    }

    fn exit_locked(&self) -> bool {
        false
    }

    fn is_64bit(&self) -> bool {
        true
    }

    fn gpu_vendor(&self) -> String {
        "Software".to_string()
    }

    fn shutdown(&mut self) {
        tracing::debug!("Headless core shut down");
    }
}
