use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{
    ByteRange, ChunkError, ChunkRegistry, ReadChunk, ReadChunkId, ReferenceChunk,
    ReferenceChunkId, StorageKey,
};

/// One chunk as listed by the upstream partitioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    /// Object holding the chunk.
    pub key: StorageKey,
    /// Optional byte range within the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ByteRange>,
}

/// JSON document handed over by the partitioner.
///
/// Position in each list is the chunk id:
///
/// ```json
/// { "reference": [{"key": "fasta/hg19_0.fa"}],
///   "reads": [{"key": "fastq/SRR6052133_1.fq", "range": {"start": 0, "end": 4096}}] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    /// Reference chunks in partition order.
    #[serde(default)]
    pub reference: Vec<ChunkEntry>,
    /// Read chunks in partition order.
    #[serde(default)]
    pub reads: Vec<ChunkEntry>,
}

impl ChunkManifest {
    /// Decode a manifest from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ChunkError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Decode a manifest file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ChunkError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Turn the listed entries into a validated registry.
    pub fn into_registry(self) -> Result<ChunkRegistry, ChunkError> {
        let reference = self
            .reference
            .into_iter()
            .enumerate()
            .map(|(i, entry)| ReferenceChunk {
                id: ReferenceChunkId(i),
                key: entry.key,
                range: entry.range,
            })
            .collect();
        let reads = self
            .reads
            .into_iter()
            .enumerate()
            .map(|(i, entry)| ReadChunk {
                id: ReadChunkId(i),
                key: entry.key,
                range: entry.range,
            })
            .collect();
        ChunkRegistry::new(reference, reads)
    }
}
