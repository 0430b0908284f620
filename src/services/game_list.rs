use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// On-disk cache of scanned game list metadata.
///
/// Anything that changes installed content must call
/// [`invalidate`](Self::invalidate) so the next listing re-scans.
#[derive(Debug, Clone)]
pub struct GameListCache {
    dir: Utf8PathBuf,
}

impl GameListCache {
    pub fn new(cache_dir: &Utf8Path) -> Self {
        Self {
            dir: cache_dir.join("game_list"),
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Discard the cache. Returns false if there was nothing cached.
    pub fn invalidate(&self) -> Result<bool> {
        if !self.dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.dir)
            .with_context(|| format!("Failed to remove game list cache: {}", self.dir))?;
        tracing::info!("Invalidated game list cache at {}", self.dir);
        Ok(true)
    }
}
