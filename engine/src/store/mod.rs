//! Persistence of retained steps.
//!
//! A store turns each step into an addressable artifact (a file path or an
//! object key) and finally writes a manifest listing every step. Names are
//! derived from the step index and timestamp only, so persisting the same
//! step again overwrites the earlier artifact.

pub mod fs;
pub mod keys;
pub mod s3;

use std::fmt;

use stepseg_common::config::{StoreBackend, StoreConfig};
use stepseg_common::frame::FrameError;
use stepseg_common::step::{Step, StepRecord};
use tracing::info;

pub use fs::FsStepStore;
pub use s3::S3StepStore;

/// Opaque reference to a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRef(String);

impl StepRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[allow(async_fn_in_trait)]
pub trait StepStore {
    /// Persist the frame of `step` as step number `index`.
    /// Must not alter the step; calling again with the same index overwrites.
    async fn persist(&self, index: usize, step: &Step) -> Result<StepRef, StoreError>;

    /// Persist the manifest describing all persisted steps.
    async fn put_manifest(&self, records: &[StepRecord]) -> Result<StepRef, StoreError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Result of persisting a full step list.
#[derive(Debug, Clone)]
pub struct PersistedSteps {
    pub records: Vec<StepRecord>,
    pub manifest: StepRef,
}

/// Persist `steps` in ascending index order, then write the manifest.
///
/// Stops at the first failure; the error carries the failing index. The step
/// list is untouched either way, so the call can be retried as-is.
pub async fn persist_all<St>(store: &St, steps: &[Step]) -> Result<PersistedSteps, StoreError>
where
    St: StepStore + ?Sized,
{
    let mut records = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        let reference = store
            .persist(index, step)
            .await
            .map_err(|e| StoreError::Step {
                index,
                source: Box::new(e),
            })?;
        info!(
            index,
            ts = step.timestamp(),
            reference = %reference,
            store = store.name(),
            "persisted step"
        );
        records.push(step.record(index, reference.as_str()));
    }

    let manifest = store.put_manifest(&records).await?;
    info!(
        steps = records.len(),
        manifest = %manifest,
        store = store.name(),
        "wrote step manifest"
    );
    Ok(PersistedSteps { records, manifest })
}

pub(crate) fn manifest_bytes(records: &[StepRecord]) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(records).map_err(|e| StoreError::Serialize(e.to_string()))
}

/// The store selected in the configuration file.
pub enum ConfiguredStore {
    Fs(FsStepStore),
    S3(S3StepStore),
}

impl ConfiguredStore {
    pub async fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.backend {
            StoreBackend::Fs => {
                let store = FsStepStore::new(&config.output_dir);
                store.ensure_dir().await?;
                Ok(Self::Fs(store))
            }
            StoreBackend::S3 => {
                let s3_config = config.s3.as_ref().ok_or(StoreError::MissingS3Config)?;
                let store = S3StepStore::new(s3_config).await;
                store.ensure_bucket().await?;
                Ok(Self::S3(store))
            }
        }
    }
}

impl StepStore for ConfiguredStore {
    async fn persist(&self, index: usize, step: &Step) -> Result<StepRef, StoreError> {
        match self {
            Self::Fs(store) => store.persist(index, step).await,
            Self::S3(store) => store.persist(index, step).await,
        }
    }

    async fn put_manifest(&self, records: &[StepRecord]) -> Result<StepRef, StoreError> {
        match self {
            Self::Fs(store) => store.put_manifest(records).await,
            Self::S3(store) => store.put_manifest(records).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Fs(store) => store.name(),
            Self::S3(store) => store.name(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to encode step frame: {0}")]
    Encode(#[from] FrameError),
    #[error("I/O error on {0}: {1}")]
    Io(String, std::io::Error),
    #[error("failed to create bucket: {0}")]
    CreateBucket(String),
    #[error("failed to put object: {0}")]
    PutObject(String),
    #[error("failed to serialize manifest: {0}")]
    Serialize(String),
    #[error("store backend \"s3\" selected without an S3 section")]
    MissingS3Config,
    #[error("failed to persist step {index}: {source}")]
    Step {
        index: usize,
        #[source]
        source: Box<StoreError>,
    },
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::segmenter::testing::frame;

    /// In-memory store that fails on one chosen index.
    struct FlakyStore {
        fail_on: Option<usize>,
        calls: Mutex<Vec<usize>>,
    }

    impl StepStore for FlakyStore {
        async fn persist(&self, index: usize, step: &Step) -> Result<StepRef, StoreError> {
            self.calls.lock().unwrap().push(index);
            if self.fail_on == Some(index) {
                return Err(StoreError::PutObject("bucket unavailable".into()));
            }
            Ok(StepRef::new(keys::step_key("mem/", index, step.timestamp())))
        }

        async fn put_manifest(&self, _records: &[StepRecord]) -> Result<StepRef, StoreError> {
            Ok(StepRef::new(keys::manifest_key("mem/")))
        }
    }

    fn steps(timestamps: &[f64]) -> Vec<Step> {
        timestamps.iter().map(|&ts| Step::new(frame(ts), 0.5)).collect()
    }

    #[tokio::test]
    async fn persists_in_ascending_order() {
        let store = FlakyStore {
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        };
        let list = steps(&[0.0, 2.0, 4.0]);
        let persisted = persist_all(&store, &list).await.unwrap();

        assert_eq!(*store.calls.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(persisted.records.len(), 3);
        assert_eq!(persisted.records[1].index, 1);
        assert_eq!(persisted.records[1].timestamp, 2.0);
        assert_eq!(
            persisted.records[1].reference,
            "mem/step_001_19700101T000002000Z.png"
        );
        assert_eq!(persisted.manifest.as_str(), "mem/steps.json");
    }

    #[tokio::test]
    async fn stops_at_first_failure_with_index() {
        let store = FlakyStore {
            fail_on: Some(1),
            calls: Mutex::new(Vec::new()),
        };
        let list = steps(&[0.0, 2.0, 4.0]);
        let err = persist_all(&store, &list).await.unwrap_err();

        assert!(matches!(err, StoreError::Step { index: 1, .. }));
        assert_eq!(*store.calls.lock().unwrap(), vec![0, 1]);
        // The in-memory result is intact and can be retried.
        assert_eq!(list.len(), 3);
        assert_eq!(list[1].timestamp(), 2.0);
    }

    #[test]
    fn manifest_serializes_records() {
        let records = vec![Step::new(frame(1.5), 0.25).record(0, "a.png")];
        let bytes = manifest_bytes(&records).unwrap();
        let parsed: Vec<StepRecord> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, records);
    }
}
