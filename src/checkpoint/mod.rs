//! Optional per-stage checkpoints.
//!
//! A rerun of the same execution can reuse a stage's result set instead of
//! dispatching it again. Records are keyed by `(execution_name, stage)` and
//! carry a fingerprint of the work units that produced them; a record whose
//! fingerprint does not match the units about to be dispatched is ignored.
//!
//! Checkpointing is off unless the run configuration enables it; the
//! pipeline then opens a [`FileCheckpointStore`] under the configured
//! directory. `None` is the disabled store.

mod file;

pub use file::FileCheckpointStore;

use std::fmt;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::pipeline::Stage;

/// Errors raised while reading or writing checkpoint records.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure.
    #[error("checkpoint I/O failed for {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded.
    #[error("checkpoint record for stage `{stage}` is malformed: {source}")]
    Codec {
        /// Stage of the record.
        stage: Stage,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The execution name would escape the checkpoint root.
    #[error("execution name `{0}` cannot name a checkpoint directory")]
    InvalidExecutionName(String),

    /// Work units could not be serialized for fingerprinting.
    #[error("failed to fingerprint work units: {0}")]
    Fingerprint(#[source] serde_json::Error),
}

/// Content hash of a stage's dispatched work units and the function that
/// runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    /// Hash the serialized form of `units`.
    pub fn of<T: Serialize>(units: &[T]) -> Result<Self, CheckpointError> {
        Self::of_batch("", units)
    }

    /// Hash a function signature followed by the serialized `units`.
    pub fn of_batch<T: Serialize>(signature: &str, units: &[T]) -> Result<Self, CheckpointError> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(signature.len() as u64).to_le_bytes());
        hasher.update(signature.as_bytes());
        for unit in units {
            let bytes = serde_json::to_vec(unit).map_err(CheckpointError::Fingerprint)?;
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Ok(Self(hasher.finalize()))
    }

    /// Lowercase hex form stored in records.
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Storage for per-stage result sets.
pub trait CheckpointStore {
    /// Whether the pipeline should consult this store at all.
    fn enabled(&self) -> bool {
        true
    }

    /// Results recorded for `stage` under a matching fingerprint, if any.
    fn load<T: DeserializeOwned>(
        &self,
        stage: Stage,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Vec<T>>, CheckpointError>;

    /// Record the results of `stage`.
    fn save<T: Serialize>(
        &self,
        stage: Stage,
        fingerprint: &Fingerprint,
        results: &[T],
    ) -> Result<(), CheckpointError>;
}

/// A missing store disables checkpointing.
impl<S: CheckpointStore> CheckpointStore for Option<S> {
    fn enabled(&self) -> bool {
        self.as_ref().map_or(false, CheckpointStore::enabled)
    }

    fn load<T: DeserializeOwned>(
        &self,
        stage: Stage,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Vec<T>>, CheckpointError> {
        match self {
            Some(store) => store.load(stage, fingerprint),
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(
        &self,
        stage: Stage,
        fingerprint: &Fingerprint,
        results: &[T],
    ) -> Result<(), CheckpointError> {
        match self {
            Some(store) => store.save(stage, fingerprint, results),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_tracks_content_and_order() {
        let a = Fingerprint::of(&["x", "y"]).unwrap();
        let b = Fingerprint::of(&["x", "y"]).unwrap();
        let c = Fingerprint::of(&["y", "x"]).unwrap();
        let d = Fingerprint::of(&["xy"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_signature_changes_fingerprint() {
        let units = ["fa0_fq0", "fa0_fq1"];
        let plain = Fingerprint::of_batch("gem_indexer_mapper", &units).unwrap();
        let filtered = Fingerprint::of_batch("gem_indexer_mapper unmapped=fq1", &units).unwrap();
        assert_ne!(plain, filtered);
        assert_eq!(plain, Fingerprint::of_batch("gem_indexer_mapper", &units).unwrap());
    }

    #[test]
    fn test_absent_store_is_inert() {
        let store: Option<FileCheckpointStore> = None;
        let fingerprint = Fingerprint::of::<u8>(&[]).unwrap();
        store.save(Stage::Map, &fingerprint, &[1u8, 2]).unwrap();
        assert!(!store.enabled());
        assert!(store
            .load::<u8>(Stage::Map, &fingerprint)
            .unwrap()
            .is_none());
    }
}
