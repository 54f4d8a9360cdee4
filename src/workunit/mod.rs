//! Work-unit generation for the three fan-out stages.
//!
//! Generators are pure: they read the run configuration and the keyed state
//! left by the previous stage and return the parameter records for the next
//! fan-out. They never touch the executor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunks::{
    ChunkKind, ChunkRegistry, ReadChunk, ReadChunkId, ReferenceChunk, ReferenceChunkId,
    StorageKey,
};
use crate::config::PipelineRunConfig;
use crate::correlate::{CorrectedIndexes, CorrelationError, MapResult, ReadChunkGroups};

/// Parameters for one stage-1 indexer/mapper invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperWorkUnit {
    /// Run configuration.
    pub config: Arc<PipelineRunConfig>,
    /// Reference side of the pair.
    pub reference_chunk_id: ReferenceChunkId,
    /// Reference chunk handle.
    pub reference_chunk: ReferenceChunk,
    /// Read chunk handle.
    pub read_chunk: ReadChunk,
    /// Read side of the pair.
    pub read_chunk_id: ReadChunkId,
}

/// Parameters for one index correction invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionWorkUnit {
    /// Run configuration.
    pub config: Arc<PipelineRunConfig>,
    /// Read chunk whose map indexes are corrected.
    pub read_chunk_id: ReadChunkId,
    /// Map indexes of that read chunk, one per mapped reference chunk.
    pub map_index_keys: Vec<StorageKey>,
}

/// Parameters for one filter/mpileup invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PileupWorkUnit {
    /// Run configuration.
    pub config: Arc<PipelineRunConfig>,
    /// Reference side of the pair.
    pub reference_chunk_id: ReferenceChunkId,
    /// Reference chunk handle.
    pub reference_chunk: ReferenceChunk,
    /// Read side of the pair.
    pub read_chunk_id: ReadChunkId,
    /// Read chunk handle.
    pub read_chunk: ReadChunk,
    /// Filtered map file produced by stage 1 for this pair.
    pub filtered_map_key: StorageKey,
    /// Corrected index of this pair's read chunk.
    pub corrected_index_key: StorageKey,
}

/// Full cross product of reference and read chunks.
///
/// Units are ordered reference-major. Either side being empty yields no
/// units.
pub fn mapper_work_units(
    config: &Arc<PipelineRunConfig>,
    reference: &[ReferenceChunk],
    reads: &[ReadChunk],
) -> Vec<MapperWorkUnit> {
    let mut units = Vec::with_capacity(reference.len() * reads.len());
    for fasta_chunk in reference {
        for fastq_chunk in reads {
            units.push(MapperWorkUnit {
                config: Arc::clone(config),
                reference_chunk_id: fasta_chunk.id,
                reference_chunk: fasta_chunk.clone(),
                read_chunk: fastq_chunk.clone(),
                read_chunk_id: fastq_chunk.id,
            });
        }
    }
    units
}

/// One correction unit per read chunk present in the stage-1 results.
pub fn correction_work_units(
    config: &Arc<PipelineRunConfig>,
    map_results: &[MapResult],
) -> Vec<CorrectionWorkUnit> {
    correction_work_units_for_groups(config, &ReadChunkGroups::from_map_results(map_results))
}

/// Correction units for already grouped stage-1 results, in read chunk order.
pub fn correction_work_units_for_groups(
    config: &Arc<PipelineRunConfig>,
    groups: &ReadChunkGroups,
) -> Vec<CorrectionWorkUnit> {
    groups
        .iter()
        .map(|(read_chunk_id, map_index_keys)| CorrectionWorkUnit {
            config: Arc::clone(config),
            read_chunk_id,
            map_index_keys,
        })
        .collect()
}

/// One filter/mpileup unit per stage-1 result, joined with its read chunk's
/// corrected index.
///
/// Chunk handles and corrected indexes are resolved by id. A stage-1 result
/// whose read chunk has no corrected index fails with
/// [`CorrelationError::Unresolved`] rather than being skipped.
pub fn pileup_work_units(
    config: &Arc<PipelineRunConfig>,
    registry: &ChunkRegistry,
    map_results: &[MapResult],
    corrected: &CorrectedIndexes,
) -> Result<Vec<PileupWorkUnit>, CorrelationError> {
    map_results
        .iter()
        .map(|result| {
            let reference_chunk = registry
                .reference_chunk(result.reference_chunk_id)
                .ok_or(CorrelationError::UnknownChunk {
                    kind: ChunkKind::Reference,
                    id: result.reference_chunk_id.0,
                    available: registry.num_reference(),
                })?;
            let read_chunk =
                registry
                    .read_chunk(result.read_chunk_id)
                    .ok_or(CorrelationError::UnknownChunk {
                        kind: ChunkKind::Read,
                        id: result.read_chunk_id.0,
                        available: registry.num_reads(),
                    })?;
            let corrected_index_key = corrected.resolve(result.read_chunk_id)?.clone();

            Ok(PileupWorkUnit {
                config: Arc::clone(config),
                reference_chunk_id: result.reference_chunk_id,
                reference_chunk: reference_chunk.clone(),
                read_chunk_id: result.read_chunk_id,
                read_chunk: read_chunk.clone(),
                filtered_map_key: result.filtered_map_key.clone(),
                corrected_index_key,
            })
        })
        .collect()
}
