//! Distributed executor adapter.
//!
//! The only seam between the orchestrator and the execution substrate. A
//! stage hands a function and its parameter records to [`Executor::map`] and
//! blocks until the whole batch has resolved. Results may come back in any
//! order; callers must correlate them through the ids they carry.

mod local;

pub use local::LocalExecutor;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Failure reported by a work function for a single invocation.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct WorkFunctionError {
    message: String,
}

impl WorkFunctionError {
    /// Build an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by an executor for a whole batch.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// One invocation failed; the batch is abandoned.
    #[error("function `{function}` failed on work unit {index}: {source}")]
    Function {
        /// Function name.
        function: &'static str,
        /// Position of the failing unit in the dispatched batch.
        index: usize,
        /// Error returned by the function.
        #[source]
        source: WorkFunctionError,
    },

    /// The barrier resolved with a different number of results than units.
    #[error("function `{function}` returned {received} results for {expected} work units")]
    IncompleteBatch {
        /// Function name.
        function: &'static str,
        /// Units dispatched.
        expected: usize,
        /// Results received.
        received: usize,
    },

    /// The worker pool could not be created or reached.
    #[error("executor unavailable: {0}")]
    Unavailable(String),
}

impl ExecutorError {
    /// Check that a resolved batch holds one result per dispatched unit.
    pub fn check_batch(
        function: &'static str,
        expected: usize,
        received: usize,
    ) -> Result<(), ExecutorError> {
        if expected == received {
            Ok(())
        } else {
            Err(ExecutorError::IncompleteBatch {
                function,
                expected,
                received,
            })
        }
    }
}

/// A remotely invocable function with typed parameter records.
pub trait WorkFunction: Send + Sync {
    /// Parameter record sent with each invocation.
    type Input: Serialize + Send + Sync;
    /// Value produced by each invocation.
    type Output: Serialize + DeserializeOwned + Send;

    /// Name the substrate knows the function by.
    fn name(&self) -> &'static str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// Identifies the function and any parameters that change its output.
    ///
    /// Part of the checkpoint fingerprint, so a rerun with different
    /// parameters does not reuse stale results.
    fn signature(&self) -> String {
        self.name().to_string()
    }

    /// Run one invocation.
    fn call(&self, input: &Self::Input) -> Result<Self::Output, WorkFunctionError>;
}

/// Fan-out/fan-in over a pool of workers.
pub trait Executor {
    /// Invoke `function` once per element of `iterdata` and wait for all of
    /// them.
    ///
    /// Fails as a whole if any invocation fails. The order of the returned
    /// results is unspecified.
    fn map<F>(&self, function: &F, iterdata: Vec<F::Input>) -> Result<Vec<F::Output>, ExecutorError>
    where
        F: WorkFunction;
}
