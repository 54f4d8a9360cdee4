//! Chunk registry: the ordered reference and read partitions of one run.
//!
//! Partitioning itself happens upstream. This module only receives the
//! resulting chunk handles and guarantees that each chunk's id equals its
//! zero-based position, so ids can be used as join keys across stages.

mod manifest;

pub use manifest::{ChunkEntry, ChunkManifest};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a reference (FASTA) chunk, `fa_i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceChunkId(pub usize);

/// Identity of a read (FASTQ) chunk, `fq_i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadChunkId(pub usize);

impl fmt::Display for ReferenceChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fa{}", self.0)
    }
}

impl fmt::Display for ReadChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fq{}", self.0)
    }
}

/// Key of an object in cloud storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Wrap a raw key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorageKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for StorageKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Half-open byte range `[start, end)` inside the source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte.
    pub start: u64,
    /// One past the last byte.
    pub end: u64,
}

/// Which side of the cross product a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Reference partition.
    Reference,
    /// Read partition.
    Read,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Reference => f.write_str("reference"),
            ChunkKind::Read => f.write_str("read"),
        }
    }
}

/// Errors describing malformed partitioning output.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A chunk's id does not match its position.
    #[error("{kind} chunk at position {position} carries id {id}; ids must be dense and positional")]
    NonPositionalId {
        /// Partition side.
        kind: ChunkKind,
        /// Position in the sequence.
        position: usize,
        /// Id found in the handle.
        id: usize,
    },

    /// A chunk has no storage key.
    #[error("{kind} chunk {position} has an empty storage key")]
    EmptyKey {
        /// Partition side.
        kind: ChunkKind,
        /// Position in the sequence.
        position: usize,
    },

    /// A chunk's byte range is inverted.
    #[error("{kind} chunk {position} has invalid byte range {start}..{end}")]
    InvalidRange {
        /// Partition side.
        kind: ChunkKind,
        /// Position in the sequence.
        position: usize,
        /// Range start.
        start: u64,
        /// Range end.
        end: u64,
    },

    /// The manifest could not be decoded.
    #[error("malformed chunk manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The manifest could not be read.
    #[error("failed to read chunk manifest: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to one partition of the reference sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceChunk {
    /// Position in the registry.
    pub id: ReferenceChunkId,
    /// Object holding the chunk.
    pub key: StorageKey,
    /// Byte range inside `key`, when the chunk is a slice of a larger object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ByteRange>,
}

/// Handle to one partition of the read data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadChunk {
    /// Position in the registry.
    pub id: ReadChunkId,
    /// Object holding the chunk.
    pub key: StorageKey,
    /// Byte range inside `key`, when the chunk is a slice of a larger object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ByteRange>,
}

/// Ordered reference and read chunks for one run.
#[derive(Debug, Clone, Default)]
pub struct ChunkRegistry {
    reference: Vec<ReferenceChunk>,
    reads: Vec<ReadChunk>,
}

impl ChunkRegistry {
    /// Build a registry, checking that every id equals its position.
    ///
    /// Empty sequences are accepted; the pipeline then runs every stage as a
    /// no-op.
    pub fn new(reference: Vec<ReferenceChunk>, reads: Vec<ReadChunk>) -> Result<Self, ChunkError> {
        for (position, chunk) in reference.iter().enumerate() {
            check_handle(ChunkKind::Reference, position, chunk.id.0, &chunk.key, chunk.range)?;
        }
        for (position, chunk) in reads.iter().enumerate() {
            check_handle(ChunkKind::Read, position, chunk.id.0, &chunk.key, chunk.range)?;
        }
        Ok(Self { reference, reads })
    }

    /// Build a registry from bare keys, assigning positional ids.
    pub fn from_keys<R, Q>(reference: R, reads: Q) -> Result<Self, ChunkError>
    where
        R: IntoIterator,
        R::Item: Into<StorageKey>,
        Q: IntoIterator,
        Q::Item: Into<StorageKey>,
    {
        let reference = reference
            .into_iter()
            .enumerate()
            .map(|(i, key)| ReferenceChunk {
                id: ReferenceChunkId(i),
                key: key.into(),
                range: None,
            })
            .collect();
        let reads = reads
            .into_iter()
            .enumerate()
            .map(|(i, key)| ReadChunk {
                id: ReadChunkId(i),
                key: key.into(),
                range: None,
            })
            .collect();
        Self::new(reference, reads)
    }

    /// Reference chunks in id order.
    pub fn reference_chunks(&self) -> &[ReferenceChunk] {
        &self.reference
    }

    /// Read chunks in id order.
    pub fn read_chunks(&self) -> &[ReadChunk] {
        &self.reads
    }

    /// Look up a reference chunk by id.
    pub fn reference_chunk(&self, id: ReferenceChunkId) -> Option<&ReferenceChunk> {
        self.reference.get(id.0)
    }

    /// Look up a read chunk by id.
    pub fn read_chunk(&self, id: ReadChunkId) -> Option<&ReadChunk> {
        self.reads.get(id.0)
    }

    /// Number of reference chunks (`M`).
    pub fn num_reference(&self) -> usize {
        self.reference.len()
    }

    /// Number of read chunks (`N`).
    pub fn num_reads(&self) -> usize {
        self.reads.len()
    }

    /// Whether either side is empty, making the cross product empty.
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty() || self.reads.is_empty()
    }
}

fn check_handle(
    kind: ChunkKind,
    position: usize,
    id: usize,
    key: &StorageKey,
    range: Option<ByteRange>,
) -> Result<(), ChunkError> {
    if id != position {
        return Err(ChunkError::NonPositionalId { kind, position, id });
    }
    if key.as_str().trim().is_empty() {
        return Err(ChunkError::EmptyKey { kind, position });
    }
    if let Some(range) = range {
        if range.start > range.end {
            return Err(ChunkError::InvalidRange {
                kind,
                position,
                start: range.start,
                end: range.end,
            });
        }
    }
    Ok(())
}
