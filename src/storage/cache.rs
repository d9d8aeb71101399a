use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::CacheError;
use crate::kernel::telemetry::buffer::HEADER;

pub const DEFAULT_CACHE_FILE: &str = "beacon_analytics_cache";

/// Single-file mirror of the buffer's unsent events.
///
/// The file holds exactly the buffer's raw bytes (header, closed events,
/// trailing separator) with no framing. A missing file means nothing is
/// pending. On a target without writable persistent storage the cache is
/// disabled and every operation is a no-op.
#[derive(Debug, Clone)]
pub struct DiskCache {
    path: Option<PathBuf>,
}

impl DiskCache {
    /// Cache file inside `dir`, enabled only if the directory exists or can
    /// be created.
    pub fn probe(dir: &Path, file_name: &str) -> Self {
        match fs::create_dir_all(dir) {
            Ok(()) => Self {
                path: Some(dir.join(file_name)),
            },
            Err(e) => {
                info!("Persistent storage unavailable at {} ({}), disk cache disabled", dir.display(), e);
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn path_display(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "<disabled>".to_string(),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.as_ref().is_some_and(|p| p.exists())
    }

    /// Replaces the cache with `raw`. A header-only image deletes the file
    /// instead of writing an empty batch.
    pub fn save(&self, raw: &[u8]) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if raw.len() <= HEADER.len() {
            return self.clear();
        }

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, raw).map_err(|e| io_error(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| io_error(path, e))?;

        debug!("Wrote {} bytes to analytics cache", raw.len());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Cleared analytics cache");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }

    pub fn load(&self) -> Result<Option<Vec<u8>>, CacheError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        match fs::read(path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}
