#[path = "common/mod.rs"]
mod common;

use std::collections::HashSet;

use blake3::hash;
use common::{assert_tsv_snapshot, ResultOrder, ScriptedExecutor};
use varcall_align::chunks::{ChunkRegistry, ReadChunkId};
use varcall_align::config::{FileFormat, PipelineRunConfig};
use varcall_align::functions::{DryRunCorrection, DryRunMapper, DryRunPileup};
use varcall_align::pipeline::{AlignmentPipeline, StageFunctions};
use varcall_align::report::render_summary;

fn partial_coverage_registry() -> ChunkRegistry {
    ChunkRegistry::from_keys(
        ["fasta/ref_0.fa", "fasta/ref_1.fa"],
        ["fastq/r_0.fq", "fastq/r_1.fq", "fastq/r_2.fq"],
    )
    .expect("registry builds")
}

fn functions() -> StageFunctions<DryRunMapper, DryRunCorrection, DryRunPileup> {
    StageFunctions {
        mapper: DryRunMapper::new().with_unmapped([ReadChunkId(1)]),
        correction: DryRunCorrection,
        pileup: DryRunPileup,
    }
}

#[test]
fn partial_coverage_summary_matches_golden() {
    let mut pipeline = AlignmentPipeline::new(
        PipelineRunConfig::new("bucket", "snapshot"),
        ScriptedExecutor::new(ResultOrder::Reversed),
    )
    .expect("pipeline builds");
    let output = pipeline
        .run(&partial_coverage_registry(), &functions())
        .expect("run succeeds");

    let actual = render_summary("snapshot", &output).expect("rendering succeeds");
    assert_tsv_snapshot("summary/partial_coverage.tsv", &actual);
}

#[test]
fn csv_summary_matches_golden() {
    let mut pipeline = AlignmentPipeline::new(
        PipelineRunConfig::new("bucket", "csv-run").with_file_format(FileFormat::Csv),
        ScriptedExecutor::new(ResultOrder::InOrder),
    )
    .expect("pipeline builds");
    let registry = ChunkRegistry::from_keys(["fasta/ref_0.fa"], ["fastq/r_0.fq", "fastq/r_1.fq"])
        .expect("registry builds");
    let output = pipeline
        .run(
            &registry,
            &StageFunctions {
                mapper: DryRunMapper::new(),
                correction: DryRunCorrection,
                pileup: DryRunPileup,
            },
        )
        .expect("run succeeds");

    let actual = render_summary("csv-run", &output).expect("rendering succeeds");
    assert_tsv_snapshot("summary/single_reference_csv.tsv", &actual);
}

#[test]
fn summary_is_deterministic_across_result_orders() {
    let mut fingerprints = HashSet::new();
    for rotation in 0..5 {
        let mut pipeline = AlignmentPipeline::new(
            PipelineRunConfig::new("bucket", "snapshot"),
            ScriptedExecutor::new(ResultOrder::Rotated(rotation)),
        )
        .expect("pipeline builds");
        let output = pipeline
            .run(&partial_coverage_registry(), &functions())
            .expect("run succeeds");
        let summary = render_summary("snapshot", &output).expect("rendering succeeds");
        fingerprints.insert(hash(summary.as_bytes()));
    }

    assert_eq!(fingerprints.len(), 1, "summaries diverged across result orders");
}
