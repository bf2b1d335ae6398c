//! JSON snapshot of the cache index on local disk.
//!
//! Saves go to a temporary file in the same directory, which is then renamed over the
//! snapshot path. A crash mid-write leaves the previous snapshot intact.
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::AppError;
use crate::model::CacheIndex;

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `index` to the snapshot path, replacing any previous snapshot.
    pub fn save(&self, index: &CacheIndex) -> Result<(), AppError> {
        let persist_err = |source: std::io::Error| AppError::Persist {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(persist_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, index)
                .map_err(|e| persist_err(std::io::Error::from(e)))?;
            writer.flush().map_err(persist_err)?;
        }
        tmp.persist(&self.path).map_err(|e| persist_err(e.error))?;

        info!(
            path = %self.path.display(),
            named_channels = index.named_channel_count(),
            programmes = index.programme_count(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Read the snapshot back.
    ///
    /// A missing file is [`AppError::NoSnapshot`]; unreadable JSON is
    /// [`AppError::SnapshotCorrupt`].
    pub fn load(&self) -> Result<CacheIndex, AppError> {
        let bytes = std::fs::read(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                AppError::NoSnapshot(self.path.clone())
            } else {
                AppError::SnapshotRead {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        serde_json::from_slice(&bytes).map_err(|source| AppError::SnapshotCorrupt {
            path: self.path.clone(),
            source,
        })
    }
}
