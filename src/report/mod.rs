//! Plain-text rendering of stage plans and run summaries.

use std::collections::HashMap;
use std::io::Write;

use anyhow::{anyhow, Result};

use crate::functions::MpileupArtifact;
use crate::pipeline::PipelineOutput;
use crate::workunit::MapperWorkUnit;

const PLAN_HEADER: &str = "#unit\treference_chunk\tread_chunk\treference_key\tread_key\n";

const SUMMARY_COLUMNS: &str =
    "#reference_chunk\tread_chunk\tfiltered_map\tcorrected_index\tmpileup\n";

/// Write the stage-1 fan-out as TSV, one line per work unit.
pub fn write_plan<W: Write>(writer: &mut W, units: &[MapperWorkUnit]) -> Result<()> {
    writer.write_all(PLAN_HEADER.as_bytes())?;
    for (index, unit) in units.iter().enumerate() {
        writeln!(
            writer,
            "{index}\t{}\t{}\t{}\t{}",
            unit.reference_chunk_id, unit.read_chunk_id, unit.reference_chunk.key, unit.read_chunk.key
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a completed run as TSV: a `##` metadata block, then one line per
/// artifact ordered by (reference chunk, read chunk).
pub fn write_summary<W: Write>(
    writer: &mut W,
    execution_name: &str,
    output: &PipelineOutput<MpileupArtifact>,
) -> Result<()> {
    let unmapped = if output.unmapped_read_chunks.is_empty() {
        ".".to_string()
    } else {
        output
            .unmapped_read_chunks
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    };

    writeln!(writer, "##execution={execution_name}")?;
    writeln!(writer, "##mapper_units={}", output.stats.mapper_units)?;
    writeln!(writer, "##correction_units={}", output.stats.correction_units)?;
    writeln!(writer, "##pileup_units={}", output.stats.pileup_units)?;
    writeln!(writer, "##checkpoint_hits={}", output.stats.checkpoint_hits)?;
    writeln!(writer, "##unmapped_read_chunks={unmapped}")?;
    writer.write_all(SUMMARY_COLUMNS.as_bytes())?;

    let filtered: HashMap<_, _> = output
        .map_results
        .iter()
        .map(|result| {
            (
                (result.reference_chunk_id, result.read_chunk_id),
                &result.filtered_map_key,
            )
        })
        .collect();

    let mut artifacts: Vec<&MpileupArtifact> = output.artifacts.iter().collect();
    artifacts.sort_by_key(|artifact| (artifact.reference_chunk_id, artifact.read_chunk_id));

    for artifact in artifacts {
        let filtered_map = filtered
            .get(&(artifact.reference_chunk_id, artifact.read_chunk_id))
            .ok_or_else(|| {
                anyhow!(
                    "artifact for ({}, {}) has no stage-1 mapping",
                    artifact.reference_chunk_id,
                    artifact.read_chunk_id
                )
            })?;
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}",
            artifact.reference_chunk_id,
            artifact.read_chunk_id,
            filtered_map,
            artifact.corrected_index_key,
            artifact.mpileup_key
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Render a run summary into a string (useful for tests and snapshots).
pub fn render_summary(
    execution_name: &str,
    output: &PipelineOutput<MpileupArtifact>,
) -> Result<String> {
    let mut buffer = Vec::new();
    write_summary(&mut buffer, execution_name, output)?;
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered summary is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chunks::ChunkRegistry;
    use crate::config::PipelineRunConfig;
    use crate::workunit::mapper_work_units;

    #[test]
    fn test_plan_lists_every_unit() {
        let config = Arc::new(PipelineRunConfig::new("bucket", "exec"));
        let registry = ChunkRegistry::from_keys(["ref.fa"], ["a.fq", "b.fq"]).unwrap();
        let units = mapper_work_units(&config, registry.reference_chunks(), registry.read_chunks());

        let mut buffer = Vec::new();
        write_plan(&mut buffer, &units).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "#unit\treference_chunk\tread_chunk\treference_key\tread_key\n\
             0\tfa0\tfq0\tref.fa\ta.fq\n\
             1\tfa0\tfq1\tref.fa\tb.fq\n"
        );
    }
}
