//! Dry-run work functions.
//!
//! The real indexer/mapper, index correction and filter/mpileup functions run
//! remotely and are opaque to the orchestrator. These stand-ins honour the
//! same input/output shapes and derive the storage keys the real functions
//! write, which is enough to exercise a whole run locally.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::chunks::{ReadChunkId, ReferenceChunkId, StorageKey};
use crate::correlate::{CorrectedIndex, MapResult};
use crate::executor::{WorkFunction, WorkFunctionError};
use crate::workunit::{CorrectionWorkUnit, MapperWorkUnit, PileupWorkUnit};

/// Final artifact of the filter/mpileup stage for one chunk pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpileupArtifact {
    /// Reference side of the pair.
    pub reference_chunk_id: ReferenceChunkId,
    /// Read side of the pair.
    pub read_chunk_id: ReadChunkId,
    /// Corrected index used to build the pileup.
    pub corrected_index_key: StorageKey,
    /// Pileup output object.
    pub mpileup_key: StorageKey,
}

/// Stage-1 stand-in: indexes the reference chunk and maps the read chunk.
#[derive(Debug, Clone, Default)]
pub struct DryRunMapper {
    unmapped: HashSet<ReadChunkId>,
}

impl DryRunMapper {
    /// Mapper where every pair produces a mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend that no read of the given chunks aligns anywhere.
    pub fn with_unmapped<I>(mut self, read_chunks: I) -> Self
    where
        I: IntoIterator<Item = ReadChunkId>,
    {
        self.unmapped.extend(read_chunks);
        self
    }
}

impl WorkFunction for DryRunMapper {
    type Input = MapperWorkUnit;
    type Output = Option<MapResult>;

    fn name(&self) -> &'static str {
        "gem_indexer_mapper"
    }

    fn description(&self) -> &'static str {
        "Index a reference chunk and map a read chunk against it."
    }

    fn signature(&self) -> String {
        let mut unmapped: Vec<ReadChunkId> = self.unmapped.iter().copied().collect();
        unmapped.sort_unstable();
        if unmapped.is_empty() {
            return self.name().to_string();
        }
        let ids: Vec<String> = unmapped.iter().map(|id| id.to_string()).collect();
        format!("{} unmapped={}", self.name(), ids.join(","))
    }

    fn call(&self, unit: &MapperWorkUnit) -> Result<Option<MapResult>, WorkFunctionError> {
        if self.unmapped.contains(&unit.read_chunk_id) {
            return Ok(None);
        }
        let exec = &unit.config.execution_name;
        let pair = format!("{}_{}", unit.reference_chunk_id, unit.read_chunk_id);
        Ok(Some(MapResult {
            read_chunk_id: unit.read_chunk_id,
            reference_chunk_id: unit.reference_chunk_id,
            map_index_key: StorageKey::new(format!("map_index_files/{exec}/{pair}_map.index.txt")),
            filtered_map_key: StorageKey::new(format!(
                "filtered_map_files/{exec}/{pair}_filt_wline_no.map"
            )),
        }))
    }
}

/// Correction stand-in: merges a read chunk's map indexes into one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunCorrection;

impl WorkFunction for DryRunCorrection {
    type Input = CorrectionWorkUnit;
    type Output = CorrectedIndex;

    fn name(&self) -> &'static str {
        "index_correction"
    }

    fn description(&self) -> &'static str {
        "Consolidate the map indexes of one read chunk across reference chunks."
    }

    fn call(&self, unit: &CorrectionWorkUnit) -> Result<CorrectedIndex, WorkFunctionError> {
        if unit.map_index_keys.is_empty() {
            return Err(WorkFunctionError::new(format!(
                "no map indexes supplied for read chunk {}",
                unit.read_chunk_id
            )));
        }
        Ok(CorrectedIndex {
            read_chunk_id: unit.read_chunk_id,
            corrected_index_key: StorageKey::new(format!(
                "corrected_index/{}/{}.txt",
                unit.config.execution_name, unit.read_chunk_id
            )),
        })
    }
}

/// Filter/mpileup stand-in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPileup;

impl WorkFunction for DryRunPileup {
    type Input = PileupWorkUnit;
    type Output = MpileupArtifact;

    fn name(&self) -> &'static str {
        "filter_index_to_mpileup"
    }

    fn description(&self) -> &'static str {
        "Filter the map file with the corrected index and generate an mpileup."
    }

    fn call(&self, unit: &PileupWorkUnit) -> Result<MpileupArtifact, WorkFunctionError> {
        let format = unit.config.file_format;
        Ok(MpileupArtifact {
            reference_chunk_id: unit.reference_chunk_id,
            read_chunk_id: unit.read_chunk_id,
            corrected_index_key: unit.corrected_index_key.clone(),
            mpileup_key: StorageKey::new(format!(
                "{format}/{}/{}_{}.{format}",
                unit.config.execution_name, unit.reference_chunk_id, unit.read_chunk_id
            )),
        })
    }
}
