use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use varcall_align::chunks::{ChunkManifest, ReadChunkId};
use varcall_align::config::{FileFormat, PipelineRunConfig, SeqType};
use varcall_align::executor::LocalExecutor;
use varcall_align::functions::{DryRunCorrection, DryRunMapper, DryRunPileup};
use varcall_align::pipeline::{AlignmentPipeline, StageFunctions};
use varcall_align::{logging, report, workunit};

#[derive(Parser, Debug)]
#[command(
    name = "varcall-align",
    about = "Three-stage chunk-correlated alignment orchestrator for serverless variant calling"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the stage-1 fan-out (reference × read chunk pairs) as TSV.
    Plan {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run all three stages locally with dry-run work functions.
    Run {
        #[command(flatten)]
        run: RunArgs,
        /// Read chunk ids that should produce no mapping (comma separated).
        #[arg(long, value_delimiter = ',')]
        unmapped: Vec<usize>,
        /// Remove this execution's checkpoints after a successful run.
        #[arg(long, requires = "checkpoint_dir")]
        clear_checkpoints: bool,
        /// Write the run summary here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Chunk manifest (JSON) produced by the partitioner.
    manifest: PathBuf,
    /// Storage bucket for intermediate and final outputs.
    #[arg(short, long)]
    bucket: String,
    /// Bucket holding the reference FASTA (defaults to --bucket).
    #[arg(long)]
    fasta_bucket: Option<String>,
    /// Execution name used to namespace outputs and checkpoints.
    #[arg(short, long, default_value = "varcall")]
    execution_name: String,
    /// Reads per FASTQ chunk.
    #[arg(long, default_value_t = 200_000)]
    fastq_read_n: usize,
    /// Input is paired-end.
    #[arg(long)]
    paired: bool,
    /// Additional strata kept when filtering the map file.
    #[arg(short, long, default_value_t = 0)]
    tolerance: u32,
    /// mpileup format: csv or parquet.
    #[arg(long, default_value = "parquet")]
    file_format: String,
    /// Map function timeout in seconds (max 900).
    #[arg(long, default_value_t = 900)]
    func_timeout_map: u64,
    /// Memory per map function in MB (max 2048).
    #[arg(long, default_value_t = 2048)]
    runtime_mem: u32,
    /// Concurrent function quota.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Enable checkpoints in this directory.
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,
}

impl RunArgs {
    fn to_config(&self) -> Result<PipelineRunConfig> {
        let file_format: FileFormat = self
            .file_format
            .parse()
            .context("invalid --file-format")?;
        let seq_type = if self.paired {
            SeqType::PairedEnd
        } else {
            SeqType::SingleEnd
        };

        let mut config = PipelineRunConfig::new(&self.bucket, &self.execution_name)
            .with_fastq_read_n(self.fastq_read_n)
            .with_seq_type(seq_type)
            .with_tolerance(self.tolerance)
            .with_file_format(file_format)
            .with_func_timeout_map(self.func_timeout_map)
            .with_runtime_mem(self.runtime_mem)
            .with_concurrency(self.concurrency);
        if let Some(bucket) = &self.fasta_bucket {
            config = config.with_fasta_bucket(bucket);
        }
        if let Some(dir) = &self.checkpoint_dir {
            config = config.with_checkpoint_dir(dir);
        }
        config.validate().context("invalid pipeline configuration")?;
        Ok(config)
    }

    fn load_manifest(&self) -> Result<ChunkManifest> {
        ChunkManifest::from_path(&self.manifest)
            .with_context(|| format!("failed to load manifest {}", self.manifest.display()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Plan { run } => run_plan(&run)?,
        Commands::Run {
            run,
            unmapped,
            clear_checkpoints,
            output,
        } => run_pipeline(&run, unmapped, clear_checkpoints, output)?,
    }

    Ok(())
}

fn run_plan(args: &RunArgs) -> Result<()> {
    let config = Arc::new(args.to_config()?);
    let registry = args
        .load_manifest()?
        .into_registry()
        .context("chunk manifest is malformed")?;

    let units = workunit::mapper_work_units(
        &config,
        registry.reference_chunks(),
        registry.read_chunks(),
    );
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    report::write_plan(&mut writer, &units)?;
    Ok(())
}

fn run_pipeline(
    args: &RunArgs,
    unmapped: Vec<usize>,
    clear_checkpoints: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = args.to_config()?;
    let manifest = args.load_manifest()?;
    let execution_name = config.execution_name.clone();

    let executor =
        LocalExecutor::new(config.concurrency).context("failed to start local executor")?;
    let functions = StageFunctions {
        mapper: DryRunMapper::new().with_unmapped(unmapped.into_iter().map(ReadChunkId)),
        correction: DryRunCorrection,
        pileup: DryRunPileup,
    };

    let mut pipeline = AlignmentPipeline::new(config, executor)?;
    let result = pipeline
        .run_manifest(manifest, &functions)
        .context("alignment pipeline failed")?;
    if clear_checkpoints {
        if let Some(store) = pipeline.checkpoints() {
            store.clear().context("failed to clear checkpoints")?;
            info!(path = %store.execution_dir().display(), "checkpoints cleared");
        }
    }

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("failed to create summary file {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    report::write_summary(&mut writer, &execution_name, &result)?;

    Ok(())
}
