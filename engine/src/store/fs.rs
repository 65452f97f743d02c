use std::path::{Path, PathBuf};

use stepseg_common::step::{Step, StepRecord};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::keys::{index_prefix, step_file_name, MANIFEST_NAME};
use super::{manifest_bytes, StepRef, StepStore, StoreError};

/// Writes step screenshots as PNG files into a local directory.
pub struct FsStepStore {
    dir: PathBuf,
    /// Set once the output directory has been created.
    ready: OnceCell<()>,
}

impl FsStepStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ready: OnceCell::new(),
        }
    }

    /// Create the output directory if it does not exist yet.
    /// Only the first successful call touches the filesystem.
    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        self.ready
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.dir)
                    .await
                    .map_err(|e| StoreError::Io(self.dir.display().to_string(), e))?;
                info!(dir = %self.dir.display(), "output directory ready");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<PathBuf, StoreError> {
        self.ensure_dir().await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StoreError::Io(path.display().to_string(), e))?;
        debug!(path = %path.display(), size = data.len(), "wrote file");
        Ok(path)
    }

    /// Remove files left behind for `index` by an earlier run whose step had a
    /// different timestamp.
    async fn remove_stale(&self, index: usize, keep: &str) -> Result<(), StoreError> {
        let prefix = index_prefix(index);
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::Io(self.dir.display().to_string(), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(self.dir.display().to_string(), e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".png") && name != keep {
                let path = entry.path();
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| StoreError::Io(path.display().to_string(), e))?;
                debug!(path = %path.display(), "removed stale step file");
            }
        }
        Ok(())
    }
}

impl StepStore for FsStepStore {
    async fn persist(&self, index: usize, step: &Step) -> Result<StepRef, StoreError> {
        let png = step.frame().encode_png()?;
        let name = step_file_name(index, step.timestamp());
        let path = self.write(&name, &png).await?;
        self.remove_stale(index, &name).await?;
        Ok(StepRef::new(path.display().to_string()))
    }

    async fn put_manifest(&self, records: &[StepRecord]) -> Result<StepRef, StoreError> {
        let data = manifest_bytes(records)?;
        let path = self.write(MANIFEST_NAME, &data).await?;
        Ok(StepRef::new(path.display().to_string()))
    }

    fn name(&self) -> &str {
        "fs"
    }
}
