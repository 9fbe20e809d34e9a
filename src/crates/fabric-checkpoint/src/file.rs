//! Disk-backed [`CheckpointStore`] using write-temp-then-rename for atomicity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{CheckpointStoreError, Result};
use crate::traits::CheckpointStore;

/// One `<name>.chkp` file per node under a base directory.
///
/// Writes go to `<name>.chkp.tmp` first and are renamed into place, so a
/// crash mid-write leaves either the old file or nothing, never a
/// half-written one. On recovery a file that can't be read as valid UTF-8
/// trimmed text is treated as absent rather than fatal — a partial write
/// from a crash should not block the node from starting.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Use `dir` (created if missing on first [`store`](Self::store) call)
    /// as the directory holding `<name>.chkp` marker files.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.chkp"))
    }

    fn tmp_path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.chkp.tmp"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name);

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(node = name, "no prior checkpoint on disk");
                return Ok(None);
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(node = name, "checkpoint file not parseable, discarding");
                let _ = tokio::fs::remove_file(&path).await;
                return Ok(None);
            }
            Err(source) => {
                return Err(CheckpointStoreError::Io {
                    name: name.to_string(),
                    source,
                })
            }
        };

        if let Err(source) = tokio::fs::remove_file(&path).await {
            if source.kind() != std::io::ErrorKind::NotFound {
                return Err(CheckpointStoreError::Io {
                    name: name.to_string(),
                    source,
                });
            }
        }

        let marker = contents.trim().to_string();
        if marker.is_empty() {
            warn!(node = name, "checkpoint file empty, discarding");
            return Ok(None);
        }

        debug!(node = name, marker = %marker, "recovered checkpoint");
        Ok(Some(marker))
    }

    async fn store(&self, name: &str, marker: &str) -> Result<()> {
        ensure_dir(&self.dir, name).await?;

        let tmp_path = self.tmp_path_for(name);
        tokio::fs::write(&tmp_path, marker)
            .await
            .map_err(|source| CheckpointStoreError::Io {
                name: name.to_string(),
                source,
            })?;

        let path = self.path_for(name);
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| CheckpointStoreError::Rename {
                name: name.to_string(),
                source,
            })?;

        debug!(node = name, marker = %marker, "stored checkpoint");
        Ok(())
    }
}

async fn ensure_dir(dir: &Path, name: &str) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| CheckpointStoreError::Io {
            name: name.to_string(),
            source,
        })
}
