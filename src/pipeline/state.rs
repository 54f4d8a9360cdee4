use std::fmt;

/// The three fan-out stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reference indexing and read mapping over the full cross product.
    Map,
    /// Per read chunk index correction.
    Correction,
    /// Filtering and mpileup generation per chunk pair.
    Pileup,
}

impl Stage {
    /// All stages in order.
    pub const ALL: [Stage; 3] = [Stage::Map, Stage::Correction, Stage::Pileup];

    /// Stable stage name, used for logs and checkpoint records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Map => "map",
            Stage::Correction => "correction",
            Stage::Pileup => "pileup",
        }
    }

    /// State entered when the stage's batch is handed to the executor.
    pub fn dispatched(&self) -> PipelineState {
        match self {
            Stage::Map => PipelineState::MapDispatched,
            Stage::Correction => PipelineState::CorrectionDispatched,
            Stage::Pileup => PipelineState::PileupDispatched,
        }
    }

    /// State entered when the stage's barrier resolves.
    pub fn completed(&self) -> PipelineState {
        match self {
            Stage::Map => PipelineState::MapComplete,
            Stage::Correction => PipelineState::CorrectionComplete,
            Stage::Pileup => PipelineState::PileupComplete,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linear run state machine; there is no branching and no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing dispatched yet.
    Init,
    /// Stage-1 batch handed to the executor.
    MapDispatched,
    /// Stage-1 barrier resolved.
    MapComplete,
    /// Correction batch handed to the executor.
    CorrectionDispatched,
    /// Correction barrier resolved.
    CorrectionComplete,
    /// Stage-3 batch handed to the executor.
    PileupDispatched,
    /// Stage-3 barrier resolved (terminal).
    PileupComplete,
}

impl PipelineState {
    /// The only state that may follow this one.
    pub fn next(&self) -> Option<PipelineState> {
        use PipelineState::*;
        match self {
            Init => Some(MapDispatched),
            MapDispatched => Some(MapComplete),
            MapComplete => Some(CorrectionDispatched),
            CorrectionDispatched => Some(CorrectionComplete),
            CorrectionComplete => Some(PileupDispatched),
            PileupDispatched => Some(PileupComplete),
            PileupComplete => None,
        }
    }

    /// Whether the run has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::PileupComplete)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "INIT",
            PipelineState::MapDispatched => "STAGE1_DISPATCHED",
            PipelineState::MapComplete => "STAGE1_COMPLETE",
            PipelineState::CorrectionDispatched => "CORRECTION_DISPATCHED",
            PipelineState::CorrectionComplete => "CORRECTION_COMPLETE",
            PipelineState::PileupDispatched => "STAGE3_DISPATCHED",
            PipelineState::PileupComplete => "STAGE3_COMPLETE",
        };
        f.write_str(name)
    }
}
