#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use varcall_align::chunks::ChunkRegistry;
use varcall_align::config::PipelineRunConfig;
use varcall_align::executor::{Executor, ExecutorError, WorkFunction, WorkFunctionError};
use varcall_align::functions::{DryRunCorrection, DryRunMapper, DryRunPileup};
use varcall_align::pipeline::StageFunctions;

const UPDATE_ENV: &str = "VARCALL_UPDATE_SNAPSHOTS";

fn snapshot_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
        .join(name)
}

/// Compare a rendered TSV against `tests/snapshots/<name>` row by row.
///
/// Metadata (`##`) rows and data rows are compared the same way; the first
/// differing row is reported with its line number. Setting
/// `VARCALL_UPDATE_SNAPSHOTS` rewrites the file instead.
pub fn assert_tsv_snapshot(name: &str, actual: &str) {
    let path = snapshot_path(name);
    if std::env::var_os(UPDATE_ENV).is_some() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected = fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("snapshot {} not found; set {UPDATE_ENV}=1", path.display()));
    let expected_rows = rows(&expected);
    let actual_rows = rows(actual);

    for (line, (want, got)) in expected_rows.iter().zip(&actual_rows).enumerate() {
        assert_eq!(
            want,
            got,
            "{} differs at line {}; set {UPDATE_ENV}=1 to regenerate",
            path.display(),
            line + 1
        );
    }
    assert_eq!(
        expected_rows.len(),
        actual_rows.len(),
        "{} has {} rows, rendered {}",
        path.display(),
        expected_rows.len(),
        actual_rows.len()
    );
}

fn rows(tsv: &str) -> Vec<Vec<&str>> {
    tsv.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(|line| line.split('\t').collect())
        .collect()
}

pub fn config(execution_name: &str) -> PipelineRunConfig {
    PipelineRunConfig::new("test-bucket", execution_name)
}

/// Registry with `reference` FASTA chunks and `reads` FASTQ chunks.
pub fn registry(reference: usize, reads: usize) -> ChunkRegistry {
    let reference_keys: Vec<String> = (0..reference).map(|i| format!("fasta/ref_{i}.fa")).collect();
    let read_keys: Vec<String> = (0..reads).map(|i| format!("fastq/reads_{i}.fq")).collect();
    ChunkRegistry::from_keys(reference_keys, read_keys).expect("registry builds")
}

pub fn dry_run_functions() -> StageFunctions<DryRunMapper, DryRunCorrection, DryRunPileup> {
    StageFunctions {
        mapper: DryRunMapper::new(),
        correction: DryRunCorrection,
        pileup: DryRunPileup,
    }
}

/// How a [`ScriptedExecutor`] permutes a resolved batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOrder {
    InOrder,
    Reversed,
    Rotated(usize),
}

/// Sequential executor that returns results in a scripted order and can be
/// told to lose results or fail outright for one function.
#[derive(Debug)]
pub struct ScriptedExecutor {
    order: ResultOrder,
    drop_last_from: Option<&'static str>,
    fail_on: Option<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(order: ResultOrder) -> Self {
        Self {
            order,
            drop_last_from: None,
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn dropping_last_from(mut self, function: &'static str) -> Self {
        self.drop_last_from = Some(function);
        self
    }

    pub fn failing_on(mut self, function: &'static str) -> Self {
        self.fail_on = Some(function);
        self
    }

    /// Number of batches dispatched so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Executor for ScriptedExecutor {
    fn map<F>(&self, function: &F, iterdata: Vec<F::Input>) -> Result<Vec<F::Output>, ExecutorError>
    where
        F: WorkFunction,
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(function.name()) {
            return Err(ExecutorError::Function {
                function: function.name(),
                index: 0,
                source: WorkFunctionError::new("scripted remote failure"),
            });
        }

        let mut results = iterdata
            .iter()
            .enumerate()
            .map(|(index, input)| {
                function
                    .call(input)
                    .map_err(|source| ExecutorError::Function {
                        function: function.name(),
                        index,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        match self.order {
            ResultOrder::InOrder => {}
            ResultOrder::Reversed => results.reverse(),
            ResultOrder::Rotated(by) => {
                if !results.is_empty() {
                    let by = by % results.len();
                    results.rotate_left(by);
                }
            }
        }
        if self.drop_last_from == Some(function.name()) {
            results.pop();
        }
        Ok(results)
    }
}
