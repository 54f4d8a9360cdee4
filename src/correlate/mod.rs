//! Stage result correlation.
//!
//! Executors return results in no particular order, so nothing here relies
//! on list positions. Results are re-keyed by the chunk ids they carry and
//! every hand-off between stages checks that the key sets line up.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunks::{ChunkKind, ChunkRegistry, ReadChunkId, ReferenceChunkId, StorageKey};

/// Output of the stage-1 indexer/mapper for one (reference, read) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapResult {
    /// Read chunk that was mapped.
    pub read_chunk_id: ReadChunkId,
    /// Reference chunk it was mapped against.
    pub reference_chunk_id: ReferenceChunkId,
    /// Map index written by the mapper.
    pub map_index_key: StorageKey,
    /// Filtered map file written by the mapper.
    pub filtered_map_key: StorageKey,
}

/// Output of index correction for one read chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectedIndex {
    /// Read chunk the index belongs to.
    pub read_chunk_id: ReadChunkId,
    /// Corrected index object.
    pub corrected_index_key: StorageKey,
}

/// Cross-stage identity failures.
#[derive(Debug, Error, PartialEq)]
pub enum CorrelationError {
    /// A read chunk needed downstream has no correction result.
    #[error("unresolved chunk correlation: read chunk {read_chunk_id} has no corrected index")]
    Unresolved {
        /// Read chunk that could not be resolved.
        read_chunk_id: ReadChunkId,
    },

    /// A result names a chunk the registry does not hold.
    #[error("result references unknown {kind} chunk {id} (registry holds {available})")]
    UnknownChunk {
        /// Partition side.
        kind: ChunkKind,
        /// Offending id.
        id: usize,
        /// Number of chunks on that side.
        available: usize,
    },

    /// The same (reference, read) pair was reported twice by stage 1.
    #[error("duplicate map result for pair ({reference_chunk_id}, {read_chunk_id})")]
    DuplicatePair {
        /// Reference side of the pair.
        reference_chunk_id: ReferenceChunkId,
        /// Read side of the pair.
        read_chunk_id: ReadChunkId,
    },

    /// Two correction results carry the same read chunk id.
    #[error("duplicate corrected index for read chunk {read_chunk_id}")]
    DuplicateCorrection {
        /// Repeated read chunk.
        read_chunk_id: ReadChunkId,
    },

    /// A correction result arrived for a read chunk that was never dispatched.
    #[error("corrected index for read chunk {read_chunk_id} was never requested")]
    UnexpectedCorrection {
        /// Unrequested read chunk.
        read_chunk_id: ReadChunkId,
    },
}

/// Group `items` by key in a single pass.
///
/// Groups come back in ascending key order; values keep their input order.
pub fn group_by_key<I, K, V, F>(items: I, mut key_value: F) -> BTreeMap<K, Vec<V>>
where
    I: IntoIterator,
    K: Ord,
    F: FnMut(I::Item) -> (K, V),
{
    let mut groups: BTreeMap<K, Vec<V>> = BTreeMap::new();
    for item in items {
        let (key, value) = key_value(item);
        groups.entry(key).or_default().push(value);
    }
    groups
}

/// Index `(key, value)` pairs into an ascending keyed map.
///
/// Returns the first repeated key as the error.
pub fn index_by_key<I, K, V>(pairs: I) -> Result<BTreeMap<K, V>, K>
where
    I: IntoIterator<Item = (K, V)>,
    K: Ord,
{
    let mut indexed = BTreeMap::new();
    for (key, value) in pairs {
        if indexed.contains_key(&key) {
            return Err(key);
        }
        indexed.insert(key, value);
    }
    Ok(indexed)
}

/// Check that stage-1 results only name registered chunks and that no pair
/// appears twice.
pub fn validate_map_results(
    results: &[MapResult],
    registry: &ChunkRegistry,
) -> Result<(), CorrelationError> {
    let mut seen = HashSet::with_capacity(results.len());
    for result in results {
        if registry.reference_chunk(result.reference_chunk_id).is_none() {
            return Err(CorrelationError::UnknownChunk {
                kind: ChunkKind::Reference,
                id: result.reference_chunk_id.0,
                available: registry.num_reference(),
            });
        }
        if registry.read_chunk(result.read_chunk_id).is_none() {
            return Err(CorrelationError::UnknownChunk {
                kind: ChunkKind::Read,
                id: result.read_chunk_id.0,
                available: registry.num_reads(),
            });
        }
        if !seen.insert((result.reference_chunk_id, result.read_chunk_id)) {
            return Err(CorrelationError::DuplicatePair {
                reference_chunk_id: result.reference_chunk_id,
                read_chunk_id: result.read_chunk_id,
            });
        }
    }
    Ok(())
}

/// Stage-1 map index keys grouped by read chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadChunkGroups {
    groups: BTreeMap<ReadChunkId, Vec<(ReferenceChunkId, StorageKey)>>,
}

impl ReadChunkGroups {
    /// Group results by read chunk id.
    ///
    /// Within a group, keys are ordered by reference chunk id so the outcome
    /// does not depend on the order the executor returned results in.
    pub fn from_map_results(results: &[MapResult]) -> Self {
        let mut groups = group_by_key(results, |result| {
            (
                result.read_chunk_id,
                (result.reference_chunk_id, result.map_index_key.clone()),
            )
        });
        for keys in groups.values_mut() {
            keys.sort_by_key(|(reference_chunk_id, _)| *reference_chunk_id);
        }
        Self { groups }
    }

    /// Number of distinct read chunks.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no read chunk produced a mapping.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether `id` has a group.
    pub fn contains(&self, id: ReadChunkId) -> bool {
        self.groups.contains_key(&id)
    }

    /// Read chunk ids in ascending order.
    pub fn read_chunk_ids(&self) -> impl Iterator<Item = ReadChunkId> + '_ {
        self.groups.keys().copied()
    }

    /// Map index keys of one group, ordered by reference chunk.
    pub fn map_index_keys(&self, id: ReadChunkId) -> Option<Vec<StorageKey>> {
        self.groups
            .get(&id)
            .map(|keys| keys.iter().map(|(_, key)| key.clone()).collect())
    }

    /// Iterate `(read chunk, map index keys)` in ascending read chunk order.
    pub fn iter(&self) -> impl Iterator<Item = (ReadChunkId, Vec<StorageKey>)> + '_ {
        self.groups
            .iter()
            .map(|(id, keys)| (*id, keys.iter().map(|(_, key)| key.clone()).collect()))
    }

    /// Read chunks of the registry that produced no mapping at all.
    pub fn missing_from(&self, registry: &ChunkRegistry) -> Vec<ReadChunkId> {
        registry
            .read_chunks()
            .iter()
            .map(|chunk| chunk.id)
            .filter(|id| !self.groups.contains_key(id))
            .collect()
    }
}

/// Corrected index keys addressed by read chunk id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectedIndexes {
    by_read_chunk: BTreeMap<ReadChunkId, StorageKey>,
}

impl CorrectedIndexes {
    /// Key the correction results by read chunk, rejecting duplicates.
    pub fn from_results<I>(results: I) -> Result<Self, CorrelationError>
    where
        I: IntoIterator<Item = CorrectedIndex>,
    {
        let by_read_chunk = index_by_key(
            results
                .into_iter()
                .map(|result| (result.read_chunk_id, result.corrected_index_key)),
        )
        .map_err(|read_chunk_id| CorrelationError::DuplicateCorrection { read_chunk_id })?;
        Ok(Self { by_read_chunk })
    }

    /// Require exactly one corrected index per requested group.
    pub fn ensure_covers(&self, groups: &ReadChunkGroups) -> Result<(), CorrelationError> {
        if let Some(read_chunk_id) = groups
            .read_chunk_ids()
            .find(|id| !self.by_read_chunk.contains_key(id))
        {
            return Err(CorrelationError::Unresolved { read_chunk_id });
        }
        if let Some(read_chunk_id) = self
            .by_read_chunk
            .keys()
            .copied()
            .find(|id| !groups.contains(*id))
        {
            return Err(CorrelationError::UnexpectedCorrection { read_chunk_id });
        }
        Ok(())
    }

    /// Corrected index for `id`.
    pub fn get(&self, id: ReadChunkId) -> Option<&StorageKey> {
        self.by_read_chunk.get(&id)
    }

    /// Corrected index for `id`, or an unresolved-correlation error.
    pub fn resolve(&self, id: ReadChunkId) -> Result<&StorageKey, CorrelationError> {
        self.get(id)
            .ok_or(CorrelationError::Unresolved { read_chunk_id: id })
    }

    /// Corrected index keys in ascending read chunk order.
    pub fn ordered_keys(&self) -> Vec<StorageKey> {
        self.by_read_chunk.values().cloned().collect()
    }

    /// Whether the ids form the contiguous range `[0, len)`.
    pub fn is_dense(&self) -> bool {
        self.by_read_chunk
            .keys()
            .enumerate()
            .all(|(position, id)| id.0 == position)
    }

    /// Number of corrected indexes.
    pub fn len(&self) -> usize {
        self.by_read_chunk.len()
    }

    /// Whether there are none.
    pub fn is_empty(&self) -> bool {
        self.by_read_chunk.is_empty()
    }

    /// Results sorted by read chunk id.
    pub fn to_results(&self) -> Vec<CorrectedIndex> {
        self.by_read_chunk
            .iter()
            .map(|(id, key)| CorrectedIndex {
                read_chunk_id: *id,
                corrected_index_key: key.clone(),
            })
            .collect()
    }
}
