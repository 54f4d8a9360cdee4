//! # Chunk-correlated distributed alignment
//!
//! Orchestrates the three-stage alignment phase of a serverless variant
//! calling pipeline over partitioned inputs.
//!
//! ## Stages
//!
//! 1. **Index + map**: one invocation per (reference chunk × read chunk) pair.
//! 2. **Index correction**: one invocation per read chunk, consolidating that
//!    chunk's map indexes across all reference chunks.
//! 3. **Filter + mpileup**: one invocation per stage-1 mapping, joined with
//!    the corrected index of its read chunk.
//!
//! Chunk ids are the join keys between stages. Each hand-off re-keys the
//! previous stage's results by id and checks that the key sets line up, so a
//! missing or duplicated result aborts the run instead of silently pairing
//! the wrong files.
//!
//! ## Usage Example
//!
//! ```no_run
//! use varcall_align::chunks::ChunkRegistry;
//! use varcall_align::config::PipelineRunConfig;
//! use varcall_align::executor::LocalExecutor;
//! use varcall_align::functions::{DryRunCorrection, DryRunMapper, DryRunPileup};
//! use varcall_align::pipeline::{AlignmentPipeline, StageFunctions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineRunConfig::new("my-bucket", "run-42");
//! let registry = ChunkRegistry::from_keys(["fasta/ref_0.fa"], ["fastq/r_0.fq", "fastq/r_1.fq"])?;
//! let mut pipeline = AlignmentPipeline::new(config, LocalExecutor::new(8)?)?;
//! let functions = StageFunctions {
//!     mapper: DryRunMapper::new(),
//!     correction: DryRunCorrection,
//!     pileup: DryRunPileup,
//! };
//! let output = pipeline.run(&registry, &functions)?;
//! assert_eq!(output.artifacts.len(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod checkpoint; // Optional per-stage result reuse
pub mod chunks;     // Chunk registry and manifests
pub mod config;     // Run configuration
pub mod correlate;  // Stage result correlation
pub mod executor;   // Distributed executor adapter
pub mod functions;  // Dry-run work functions
pub mod logging;    // tracing subscriber setup
pub mod pipeline;   // Three-stage orchestrator
pub mod report;     // TSV rendering
pub mod workunit;   // Work-unit generators

// Re-exports for convenience
pub use chunks::{ChunkRegistry, ReadChunkId, ReferenceChunkId, StorageKey};
pub use config::PipelineRunConfig;
pub use correlate::{CorrectedIndex, MapResult};
pub use executor::{Executor, LocalExecutor, WorkFunction};
pub use pipeline::{AlignmentPipeline, PipelineOutput, PipelineState, Stage, StageFunctions};

use thiserror::Error;

/// Terminal failure of a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Run configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// Chunk sequences from the partitioner are malformed.
    #[error("partitioning error: {0}")]
    Partitioning(#[from] chunks::ChunkError),

    /// Results of two stages could not be matched by chunk id.
    #[error(transparent)]
    Correlation(#[from] correlate::CorrelationError),

    /// A stage failed on the execution substrate.
    #[error("stage `{stage}` failed: {source}")]
    Execution {
        /// Stage whose barrier failed.
        stage: Stage,
        /// Executor failure.
        #[source]
        source: executor::ExecutorError,
    },

    /// Checkpoint records could not be read or written.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_error_message_is_preserved() {
        let err = PipelineError::from(correlate::CorrelationError::Unresolved {
            read_chunk_id: ReadChunkId(3),
        });
        assert_eq!(
            err.to_string(),
            "unresolved chunk correlation: read chunk fq3 has no corrected index"
        );
    }

    #[test]
    fn test_execution_error_names_stage() {
        let err = PipelineError::Execution {
            stage: Stage::Correction,
            source: executor::ExecutorError::Unavailable("pool gone".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "stage `correction` failed: executor unavailable: pool gone"
        );
    }
}
