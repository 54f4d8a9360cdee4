//! Pipeline orchestrator.
//!
//! Drives the three fan-out/fan-in stages in order:
//!
//! ```text
//! registry ──► mapper units (M × N) ──► executor ──► map results
//!          ──► group by read chunk  ──► correction units ──► executor ──► corrected indexes
//!          ──► join by read chunk   ──► pileup units ──► executor ──► artifacts
//! ```
//!
//! Every stage is a full barrier. The orchestrator is single-threaded; all
//! parallelism lives behind the [`Executor`]. Results are correlated by the
//! chunk ids they carry, never by their position in the returned batch.

mod state;

pub use state::{PipelineState, Stage};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointStore, FileCheckpointStore, Fingerprint};
use crate::chunks::{ChunkManifest, ChunkRegistry, ReadChunkId};
use crate::config::PipelineRunConfig;
use crate::correlate::{
    self, CorrectedIndex, CorrectedIndexes, MapResult, ReadChunkGroups,
};
use crate::executor::{Executor, ExecutorError, WorkFunction};
use crate::workunit::{self, CorrectionWorkUnit, MapperWorkUnit, PileupWorkUnit};
use crate::PipelineError;

/// The remote functions invoked by each stage.
#[derive(Debug, Clone)]
pub struct StageFunctions<M, C, P> {
    /// Stage 1: reference indexing and read mapping.
    pub mapper: M,
    /// Stage 2: index correction.
    pub correction: C,
    /// Stage 3: filtering and mpileup generation.
    pub pileup: P,
}

/// Work-unit counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Stage-1 units dispatched (`M × N`).
    pub mapper_units: usize,
    /// Correction units dispatched (one per mapped read chunk).
    pub correction_units: usize,
    /// Stage-3 units dispatched (one per stage-1 mapping).
    pub pileup_units: usize,
    /// Stages served from a checkpoint instead of the executor.
    pub checkpoint_hits: usize,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput<A> {
    /// Stage-3 artifacts, one per mapped (reference, read) pair.
    pub artifacts: Vec<A>,
    /// Stage-1 mappings ordered by (reference chunk, read chunk).
    pub map_results: Vec<MapResult>,
    /// Read chunks that produced no mapping against any reference chunk.
    pub unmapped_read_chunks: Vec<ReadChunkId>,
    /// Corrected index per mapped read chunk.
    pub corrected_indexes: CorrectedIndexes,
    /// States visited, starting at [`PipelineState::Init`].
    pub trace: Vec<PipelineState>,
    /// Unit counts.
    pub stats: RunStats,
}

/// Three-stage alignment orchestrator.
///
/// [`PipelineRunConfig::checkpointing`] is the only switch for checkpoints:
/// when it is off, no store is consulted or written, attached or not.
#[derive(Debug)]
pub struct AlignmentPipeline<E, C = Option<FileCheckpointStore>> {
    config: Arc<PipelineRunConfig>,
    executor: E,
    checkpoints: C,
    state: PipelineState,
    trace: Vec<PipelineState>,
}

impl<E: Executor> AlignmentPipeline<E> {
    /// Validate `config` and create a pipeline.
    ///
    /// When the configuration enables checkpointing, records are kept in a
    /// [`FileCheckpointStore`] under its checkpoint directory.
    pub fn new(config: PipelineRunConfig, executor: E) -> Result<Self, PipelineError> {
        config.validate()?;
        let checkpoints = FileCheckpointStore::from_config(&config)?;
        if let Some(store) = &checkpoints {
            info!(path = %store.execution_dir().display(), "checkpointing enabled");
        }
        Ok(Self {
            config: Arc::new(config),
            executor,
            checkpoints,
            state: PipelineState::Init,
            trace: vec![PipelineState::Init],
        })
    }
}

impl<E: Executor, C: CheckpointStore> AlignmentPipeline<E, C> {
    /// Replace the checkpoint store.
    ///
    /// The store stays unused unless the configuration enables
    /// checkpointing.
    pub fn with_checkpoints<S: CheckpointStore>(self, checkpoints: S) -> AlignmentPipeline<E, S> {
        if !self.config.checkpointing && checkpoints.enabled() {
            warn!("checkpointing is disabled in the run configuration; attached store will not be used");
        }
        AlignmentPipeline {
            config: self.config,
            executor: self.executor,
            checkpoints,
            state: self.state,
            trace: self.trace,
        }
    }

    /// Shared run configuration.
    pub fn config(&self) -> &Arc<PipelineRunConfig> {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Executor in use.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Checkpoint store in use.
    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// Whether stages consult and record checkpoints.
    pub fn checkpointing(&self) -> bool {
        self.config.checkpointing && self.checkpoints.enabled()
    }

    /// Decode a partitioner manifest and run on it.
    pub fn run_manifest<M, X, P>(
        &mut self,
        manifest: ChunkManifest,
        functions: &StageFunctions<M, X, P>,
    ) -> Result<PipelineOutput<P::Output>, PipelineError>
    where
        M: WorkFunction<Input = MapperWorkUnit, Output = Option<MapResult>>,
        X: WorkFunction<Input = CorrectionWorkUnit, Output = CorrectedIndex>,
        P: WorkFunction<Input = PileupWorkUnit>,
    {
        let registry = manifest.into_registry()?;
        self.run(&registry, functions)
    }

    /// Run all three stages over `registry`.
    ///
    /// Either every stage completes and an artifact exists for every mapped
    /// pair, or the run aborts with the first error. Nothing is retried.
    pub fn run<M, X, P>(
        &mut self,
        registry: &ChunkRegistry,
        functions: &StageFunctions<M, X, P>,
    ) -> Result<PipelineOutput<P::Output>, PipelineError>
    where
        M: WorkFunction<Input = MapperWorkUnit, Output = Option<MapResult>>,
        X: WorkFunction<Input = CorrectionWorkUnit, Output = CorrectedIndex>,
        P: WorkFunction<Input = PileupWorkUnit>,
    {
        self.state = PipelineState::Init;
        self.trace = vec![PipelineState::Init];
        let mut stats = RunStats::default();

        info!(
            execution = %self.config.execution_name,
            reference_chunks = registry.num_reference(),
            read_chunks = registry.num_reads(),
            "starting alignment pipeline"
        );
        if registry.is_empty() {
            warn!("chunk registry has an empty side; every stage will be a no-op");
        }

        let units = workunit::mapper_work_units(
            &self.config,
            registry.reference_chunks(),
            registry.read_chunks(),
        );
        stats.mapper_units = units.len();
        let outcomes = self.dispatch(Stage::Map, &functions.mapper, units, &mut stats)?;

        let mut map_results: Vec<MapResult> = outcomes.into_iter().flatten().collect();
        correlate::validate_map_results(&map_results, registry)?;
        map_results.sort_by_key(|result| (result.reference_chunk_id, result.read_chunk_id));

        let groups = ReadChunkGroups::from_map_results(&map_results);
        let unmapped_read_chunks = groups.missing_from(registry);
        if !unmapped_read_chunks.is_empty() && !registry.is_empty() {
            warn!(
                read_chunks = ?unmapped_read_chunks,
                "read chunks produced no mapping and are excluded from correction and pileup"
            );
        }

        let units = workunit::correction_work_units_for_groups(&self.config, &groups);
        stats.correction_units = units.len();
        let corrected = self.dispatch(Stage::Correction, &functions.correction, units, &mut stats)?;
        let corrected_indexes = CorrectedIndexes::from_results(corrected)?;
        corrected_indexes.ensure_covers(&groups)?;

        let units =
            workunit::pileup_work_units(&self.config, registry, &map_results, &corrected_indexes)?;
        stats.pileup_units = units.len();
        let artifacts = self.dispatch(Stage::Pileup, &functions.pileup, units, &mut stats)?;

        info!(
            artifacts = artifacts.len(),
            checkpoint_hits = stats.checkpoint_hits,
            "alignment pipeline complete"
        );

        Ok(PipelineOutput {
            artifacts,
            map_results,
            unmapped_read_chunks,
            corrected_indexes,
            trace: self.trace.clone(),
            stats,
        })
    }

    /// Run one stage barrier, consulting checkpoints first when enabled.
    fn dispatch<F: WorkFunction>(
        &mut self,
        stage: Stage,
        function: &F,
        units: Vec<F::Input>,
        stats: &mut RunStats,
    ) -> Result<Vec<F::Output>, PipelineError> {
        let expected = units.len();
        let fingerprint = if self.checkpointing() {
            Some(Fingerprint::of_batch(&function.signature(), &units)?)
        } else {
            None
        };

        self.advance(stage.dispatched());

        if let Some(fingerprint) = &fingerprint {
            if let Some(results) = self.checkpoints.load::<F::Output>(stage, fingerprint)? {
                if results.len() == expected {
                    info!(stage = %stage, results = results.len(), "reusing checkpointed results");
                    stats.checkpoint_hits += 1;
                    self.advance(stage.completed());
                    return Ok(results);
                }
                warn!(
                    stage = %stage,
                    recorded = results.len(),
                    expected,
                    "checkpoint has the wrong number of results, dispatching again"
                );
            }
        }

        info!(stage = %stage, function = function.name(), units = expected, "dispatching stage");
        let results = if units.is_empty() {
            Vec::new()
        } else {
            self.executor
                .map(function, units)
                .map_err(|source| PipelineError::Execution { stage, source })?
        };
        ExecutorError::check_batch(function.name(), expected, results.len())
            .map_err(|source| PipelineError::Execution { stage, source })?;

        if let Some(fingerprint) = &fingerprint {
            self.checkpoints.save(stage, fingerprint, &results)?;
        }

        self.advance(stage.completed());
        info!(stage = %stage, results = results.len(), "stage barrier resolved");
        Ok(results)
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert_eq!(self.state.next(), Some(next));
        debug!(from = %self.state, to = %next, "pipeline transition");
        self.state = next;
        self.trace.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;
    use crate::functions::{DryRunCorrection, DryRunMapper, DryRunPileup};

    fn functions() -> StageFunctions<DryRunMapper, DryRunCorrection, DryRunPileup> {
        StageFunctions {
            mapper: DryRunMapper::new(),
            correction: DryRunCorrection,
            pileup: DryRunPileup,
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let executor = LocalExecutor::new(1).unwrap();
        let err = AlignmentPipeline::new(PipelineRunConfig::new("", "exec"), executor).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_run_visits_every_state() {
        let executor = LocalExecutor::new(2).unwrap();
        let mut pipeline =
            AlignmentPipeline::new(PipelineRunConfig::new("bucket", "exec"), executor).unwrap();
        let registry = ChunkRegistry::from_keys(["fa0"], ["fq0", "fq1"]).unwrap();

        let output = pipeline.run(&registry, &functions()).unwrap();
        assert_eq!(output.trace.len(), 7);
        assert_eq!(output.trace.first(), Some(&PipelineState::Init));
        assert!(pipeline.state().is_terminal());
        assert_eq!(
            output.stats,
            RunStats {
                mapper_units: 2,
                correction_units: 2,
                pileup_units: 2,
                checkpoint_hits: 0,
            }
        );
    }

    #[test]
    fn test_run_twice_restarts_state_machine() {
        let executor = LocalExecutor::new(1).unwrap();
        let mut pipeline =
            AlignmentPipeline::new(PipelineRunConfig::new("bucket", "exec"), executor).unwrap();
        let registry = ChunkRegistry::from_keys(["fa0"], ["fq0"]).unwrap();

        pipeline.run(&registry, &functions()).unwrap();
        let output = pipeline.run(&registry, &functions()).unwrap();
        assert_eq!(output.trace.len(), 7);
    }
}
