use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CheckpointError, CheckpointStore, Fingerprint};
use crate::config::{is_path_segment, PipelineRunConfig};
use crate::pipeline::Stage;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord<R> {
    execution_name: String,
    stage: String,
    fingerprint: String,
    results: R,
}

/// JSON checkpoint records under `<root>/<execution_name>/<stage>.json`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
    execution_name: String,
}

impl FileCheckpointStore {
    /// Store for one execution under `root`.
    ///
    /// The execution name must be a single path component so that its
    /// records, and [`clear`](Self::clear), stay inside `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        execution_name: impl Into<String>,
    ) -> Result<Self, CheckpointError> {
        let execution_name = execution_name.into();
        if !is_path_segment(&execution_name) {
            return Err(CheckpointError::InvalidExecutionName(execution_name));
        }
        Ok(Self {
            root: root.into(),
            execution_name,
        })
    }

    /// Store described by the run configuration, when checkpointing is on.
    pub fn from_config(config: &PipelineRunConfig) -> Result<Option<Self>, CheckpointError> {
        match (&config.checkpoint_dir, config.checkpointing) {
            (Some(dir), true) => Self::new(dir, config.execution_name.clone()).map(Some),
            _ => Ok(None),
        }
    }

    /// Directory holding this execution's records.
    pub fn execution_dir(&self) -> PathBuf {
        self.root.join(&self.execution_name)
    }

    /// Path of one stage's record.
    pub fn record_path(&self, stage: Stage) -> PathBuf {
        self.execution_dir().join(format!("{}.json", stage.as_str()))
    }

    /// Remove every record of this execution.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        let dir = self.execution_dir();
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        debug!(path = %dir.display(), "cleared checkpoints");
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load<T: DeserializeOwned>(
        &self,
        stage: Stage,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Vec<T>>, CheckpointError> {
        let path = self.record_path(stage);
        if !path.exists() {
            debug!(stage = %stage, path = %path.display(), "no checkpoint");
            return Ok(None);
        }

        let file = File::open(&path).map_err(|source| io_error(&path, source))?;
        let record: CheckpointRecord<Vec<T>> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| CheckpointError::Codec { stage, source })?;

        if record.execution_name != self.execution_name || record.stage != stage.as_str() {
            warn!(
                stage = %stage,
                path = %path.display(),
                "checkpoint belongs to another execution or stage, ignoring"
            );
            return Ok(None);
        }
        if record.fingerprint != fingerprint.to_hex() {
            warn!(
                stage = %stage,
                recorded = %record.fingerprint,
                expected = %fingerprint,
                "checkpoint inputs changed, ignoring"
            );
            return Ok(None);
        }
        Ok(Some(record.results))
    }

    fn save<T: Serialize>(
        &self,
        stage: Stage,
        fingerprint: &Fingerprint,
        results: &[T],
    ) -> Result<(), CheckpointError> {
        let dir = self.execution_dir();
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;

        let record = CheckpointRecord {
            execution_name: self.execution_name.clone(),
            stage: stage.as_str().to_string(),
            fingerprint: fingerprint.to_hex(),
            results,
        };

        // Records are replaced atomically via rename.
        let path = self.record_path(stage);
        let tmp = path.with_extension("json.tmp");
        let file = File::create(&tmp).map_err(|source| io_error(&tmp, source))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &record)
            .map_err(|source| CheckpointError::Codec { stage, source })?;
        writer.flush().map_err(|source| io_error(&tmp, source))?;
        drop(writer);
        fs::rename(&tmp, &path).map_err(|source| io_error(&path, source))?;

        debug!(stage = %stage, results = results.len(), path = %path.display(), "checkpoint saved");
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CheckpointError {
    CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_fingerprint_guard() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path(), "exec-a").unwrap();
        let fingerprint = Fingerprint::of(&["unit-0", "unit-1"]).unwrap();

        assert!(store
            .load::<u32>(Stage::Correction, &fingerprint)
            .unwrap()
            .is_none());

        store.save(Stage::Correction, &fingerprint, &[7u32, 9]).unwrap();
        assert_eq!(
            store.load::<u32>(Stage::Correction, &fingerprint).unwrap(),
            Some(vec![7, 9])
        );

        let changed = Fingerprint::of(&["unit-0"]).unwrap();
        assert!(store
            .load::<u32>(Stage::Correction, &changed)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_executions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let fingerprint = Fingerprint::of(&[1u8]).unwrap();
        let a = FileCheckpointStore::new(dir.path(), "exec-a").unwrap();
        let b = FileCheckpointStore::new(dir.path(), "exec-b").unwrap();

        a.save(Stage::Map, &fingerprint, &["x".to_string()]).unwrap();
        assert!(b.load::<String>(Stage::Map, &fingerprint).unwrap().is_none());

        a.clear().unwrap();
        assert!(a.load::<String>(Stage::Map, &fingerprint).unwrap().is_none());
        b.clear().unwrap();
    }

    #[test]
    fn test_from_config_requires_opt_in() {
        let config = PipelineRunConfig::new("bucket", "exec-a");
        assert!(FileCheckpointStore::from_config(&config).unwrap().is_none());

        let config = config.with_checkpoint_dir("/tmp/varcall-ckpt");
        let store = FileCheckpointStore::from_config(&config).unwrap().unwrap();
        assert_eq!(
            store.record_path(Stage::Pileup),
            PathBuf::from("/tmp/varcall-ckpt/exec-a/pileup.json")
        );
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path(), "exec-a").unwrap();
        fs::create_dir_all(store.execution_dir()).unwrap();
        fs::write(store.record_path(Stage::Map), b"{not json").unwrap();

        let fingerprint = Fingerprint::of(&[1u8]).unwrap();
        assert!(matches!(
            store.load::<u8>(Stage::Map, &fingerprint),
            Err(CheckpointError::Codec { stage: Stage::Map, .. })
        ));
    }

    #[test]
    fn test_rejects_names_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["..", ".", "", "nested/run", "../sibling"] {
            assert!(
                matches!(
                    FileCheckpointStore::new(dir.path(), name),
                    Err(CheckpointError::InvalidExecutionName(_))
                ),
                "{name:?} accepted"
            );
        }
    }
}
