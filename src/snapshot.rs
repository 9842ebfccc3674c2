use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CollectError, Result};
use crate::model::CollectionRun;

/// Durable, overwritable record of everything completed so far.
pub trait SnapshotSink: Send {
    /// Replace the stored record with `run`, atomically.
    fn write(&mut self, run: &CollectionRun) -> Result<()>;
    fn load(&self) -> Result<CollectionRun>;
    fn describe(&self) -> String;
}

/// Pretty-printed JSON array, written to a temp file and renamed into place.
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotSink for JsonSnapshot {
    fn write(&mut self, run: &CollectionRun) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| CollectError::io(dir, e))?;
        }
        let body = serde_json::to_vec_pretty(run)?;
        let tmp = self.temp_path();
        fs::write(&tmp, body).map_err(|e| CollectError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| CollectError::io(&self.path, e))?;
        Ok(())
    }

    fn load(&self) -> Result<CollectionRun> {
        let raw = fs::read(&self.path).map_err(|e| CollectError::io(&self.path, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }
}
