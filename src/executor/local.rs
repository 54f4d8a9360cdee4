use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use super::{Executor, ExecutorError, WorkFunction};

/// Executes work units on a local thread pool.
///
/// Stands in for the remote substrate in dry runs and tests. The pool size
/// plays the role of the concurrent function quota.
#[derive(Debug)]
pub struct LocalExecutor {
    pool: ThreadPool,
}

impl LocalExecutor {
    /// Create an executor with `workers` threads.
    pub fn new(workers: usize) -> Result<Self, ExecutorError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("varcall-worker-{i}"))
            .build()
            .map_err(|err| ExecutorError::Unavailable(err.to_string()))?;
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Executor for LocalExecutor {
    fn map<F>(&self, function: &F, iterdata: Vec<F::Input>) -> Result<Vec<F::Output>, ExecutorError>
    where
        F: WorkFunction,
    {
        let name = function.name();
        debug!(
            function = name,
            units = iterdata.len(),
            workers = self.workers(),
            "dispatching batch"
        );

        self.pool.install(|| {
            iterdata
                .par_iter()
                .enumerate()
                .map(|(index, unit)| {
                    function
                        .call(unit)
                        .map_err(|source| ExecutorError::Function {
                            function: name,
                            index,
                            source,
                        })
                })
                .collect::<Result<Vec<_>, _>>()
        })
    }
}
