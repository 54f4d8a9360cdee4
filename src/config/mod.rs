//! Run configuration shared by every work unit of a pipeline run.
//!
//! A [`PipelineRunConfig`] is built once, validated, and then frozen behind an
//! `Arc` for the lifetime of the run. Every dispatched work unit carries a
//! clone of that `Arc`, so remote functions see exactly the same settings.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for a map function timeout imposed by the execution substrate.
pub const MAX_FUNC_TIMEOUT_SECS: u64 = 900;

/// Upper bound for the memory assigned to each map function (MB).
pub const MAX_RUNTIME_MEM_MB: u32 = 2048;

/// Lines per read in a FASTQ record.
const FASTQ_LINES_PER_READ: usize = 4;

/// Errors raised while building or validating the run configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A required text field was empty.
    #[error("configuration field `{0}` must not be empty")]
    EmptyField(&'static str),

    /// A numeric setting was zero where a positive value is required.
    #[error("configuration field `{0}` must be > 0")]
    ZeroValue(&'static str),

    /// A numeric setting exceeded the substrate limit.
    #[error("configuration field `{field}` is {value}, maximum is {max}")]
    LimitExceeded {
        /// Offending field.
        field: &'static str,
        /// Supplied value.
        value: u64,
        /// Largest accepted value.
        max: u64,
    },

    /// The execution name cannot be used as a single directory name.
    #[error("execution name `{0}` must be a single path component (no `/`, `.` or `..`)")]
    InvalidExecutionName(String),

    /// Checkpointing was enabled without a directory to store records in.
    #[error("checkpointing enabled but no checkpoint directory configured")]
    MissingCheckpointDir,

    /// Unrecognised enum value.
    #[error("unknown {kind} `{value}`")]
    UnknownVariant {
        /// Name of the setting.
        kind: &'static str,
        /// Value that failed to parse.
        value: String,
    },
}

/// Output format of the mpileup files written by the final stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Comma separated text.
    Csv,
    /// Apache Parquet.
    Parquet,
}

impl FileFormat {
    /// Lowercase name, also used as a storage prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "parquet" => Ok(FileFormat::Parquet),
            _ => Err(ConfigError::UnknownVariant {
                kind: "file format",
                value: s.to_string(),
            }),
        }
    }
}

/// Sequencing layout of the read input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeqType {
    /// One FASTQ file.
    SingleEnd,
    /// Two mate FASTQ files.
    PairedEnd,
}

impl SeqType {
    /// Name used in payloads and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SeqType::SingleEnd => "single-end",
            SeqType::PairedEnd => "paired-end",
        }
    }
}

/// Immutable configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunConfig {
    /// Bucket receiving intermediate and final outputs.
    pub storage_bucket: String,

    /// Bucket holding the reference FASTA (defaults to `storage_bucket`).
    pub fasta_bucket: String,

    /// Name of this execution; namespaces every storage key and checkpoint.
    pub execution_name: String,

    /// Reads per FASTQ chunk.
    pub fastq_read_n: usize,

    /// FASTQ chunk size in lines (`4 * fastq_read_n`).
    pub fastq_chunk_size: usize,

    /// Single or paired-end input.
    pub seq_type: SeqType,

    /// Number of additional strata kept when filtering the map file.
    pub tolerance: u32,

    /// Format of the mpileup output.
    pub file_format: FileFormat,

    /// Timeout handed to every map function, in seconds.
    pub func_timeout_map: u64,

    /// Memory assigned to each map function, in MB.
    pub runtime_mem: u32,

    /// Concurrent function quota for one stage.
    pub concurrency: usize,

    /// Reuse and record per-stage results between runs.
    pub checkpointing: bool,

    /// Where checkpoint records live when `checkpointing` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_dir: Option<PathBuf>,
}

impl PipelineRunConfig {
    /// Create a configuration with default tuning for the given buckets.
    pub fn new(storage_bucket: impl Into<String>, execution_name: impl Into<String>) -> Self {
        let storage_bucket = storage_bucket.into();
        let fastq_read_n = 200_000;
        Self {
            fasta_bucket: storage_bucket.clone(),
            storage_bucket,
            execution_name: execution_name.into(),
            fastq_read_n,
            fastq_chunk_size: FASTQ_LINES_PER_READ * fastq_read_n,
            seq_type: SeqType::SingleEnd,
            tolerance: 0,
            file_format: FileFormat::Parquet,
            func_timeout_map: MAX_FUNC_TIMEOUT_SECS,
            runtime_mem: MAX_RUNTIME_MEM_MB,
            concurrency: 1000,
            checkpointing: false,
            checkpoint_dir: None,
        }
    }

    /// Use a separate bucket for the reference FASTA.
    pub fn with_fasta_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.fasta_bucket = bucket.into();
        self
    }

    /// Set reads per FASTQ chunk; also updates the chunk size in lines.
    pub fn with_fastq_read_n(mut self, reads: usize) -> Self {
        self.fastq_read_n = reads;
        self.fastq_chunk_size = FASTQ_LINES_PER_READ * reads;
        self
    }

    /// Set the sequencing layout.
    pub fn with_seq_type(mut self, seq_type: SeqType) -> Self {
        self.seq_type = seq_type;
        self
    }

    /// Set map-file filtering tolerance.
    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the mpileup output format.
    pub fn with_file_format(mut self, format: FileFormat) -> Self {
        self.file_format = format;
        self
    }

    /// Set the per-function timeout in seconds.
    pub fn with_func_timeout_map(mut self, secs: u64) -> Self {
        self.func_timeout_map = secs;
        self
    }

    /// Set memory per map function in MB.
    pub fn with_runtime_mem(mut self, mb: u32) -> Self {
        self.runtime_mem = mb;
        self
    }

    /// Set the concurrent function quota.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Enable checkpointing into `dir`.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpointing = true;
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Check every field against the substrate limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_bucket.trim().is_empty() {
            return Err(ConfigError::EmptyField("storage_bucket"));
        }
        if self.fasta_bucket.trim().is_empty() {
            return Err(ConfigError::EmptyField("fasta_bucket"));
        }
        if self.execution_name.trim().is_empty() {
            return Err(ConfigError::EmptyField("execution_name"));
        }
        if !is_path_segment(&self.execution_name) {
            return Err(ConfigError::InvalidExecutionName(self.execution_name.clone()));
        }
        if self.fastq_read_n == 0 {
            return Err(ConfigError::ZeroValue("fastq_read_n"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroValue("concurrency"));
        }
        if self.func_timeout_map == 0 {
            return Err(ConfigError::ZeroValue("func_timeout_map"));
        }
        if self.func_timeout_map > MAX_FUNC_TIMEOUT_SECS {
            return Err(ConfigError::LimitExceeded {
                field: "func_timeout_map",
                value: self.func_timeout_map,
                max: MAX_FUNC_TIMEOUT_SECS,
            });
        }
        if self.runtime_mem == 0 {
            return Err(ConfigError::ZeroValue("runtime_mem"));
        }
        if self.runtime_mem > MAX_RUNTIME_MEM_MB {
            return Err(ConfigError::LimitExceeded {
                field: "runtime_mem",
                value: u64::from(self.runtime_mem),
                max: u64::from(MAX_RUNTIME_MEM_MB),
            });
        }
        if self.checkpointing && self.checkpoint_dir.is_none() {
            return Err(ConfigError::MissingCheckpointDir);
        }
        Ok(())
    }
}

/// Whether `name` is exactly one normal path component.
///
/// Execution names become directory names under the checkpoint root and
/// storage prefixes, so `.`, `..` and separators are refused.
pub(crate) fn is_path_segment(name: &str) -> bool {
    if name.contains(|c: char| c == '/' || c == '\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineRunConfig::new("bucket", "run-1");
        assert_eq!(config.fasta_bucket, "bucket");
        assert_eq!(config.fastq_chunk_size, 4 * config.fastq_read_n);
        assert!(!config.checkpointing);
        config.validate().unwrap();
    }

    #[test]
    fn test_fastq_chunk_size_tracks_reads() {
        let config = PipelineRunConfig::new("bucket", "run-1").with_fastq_read_n(1000);
        assert_eq!(config.fastq_chunk_size, 4000);
    }

    #[test]
    fn test_rejects_limits() {
        let config = PipelineRunConfig::new("bucket", "run-1").with_func_timeout_map(901);
        assert_eq!(
            config.validate(),
            Err(ConfigError::LimitExceeded {
                field: "func_timeout_map",
                value: 901,
                max: 900,
            })
        );

        let config = PipelineRunConfig::new("bucket", "").with_runtime_mem(512);
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyField("execution_name"))
        );
    }

    #[test]
    fn test_execution_name_must_be_one_component() {
        for name in ["..", ".", "a/b", "../run", "run/", "a\\b"] {
            let config = PipelineRunConfig::new("bucket", name);
            assert_eq!(
                config.validate(),
                Err(ConfigError::InvalidExecutionName(name.to_string())),
                "{name} accepted"
            );
        }
        assert!(is_path_segment("run-1.v2"));
    }

    #[test]
    fn test_checkpointing_needs_directory() {
        let mut config = PipelineRunConfig::new("bucket", "run-1");
        config.checkpointing = true;
        assert_eq!(config.validate(), Err(ConfigError::MissingCheckpointDir));

        let config = config.with_checkpoint_dir("/tmp/ckpt");
        config.validate().unwrap();
    }

    #[test]
    fn test_file_format_parsing() {
        assert_eq!("CSV".parse::<FileFormat>().unwrap(), FileFormat::Csv);
        assert_eq!("parquet".parse::<FileFormat>().unwrap(), FileFormat::Parquet);
        assert!("bam".parse::<FileFormat>().is_err());
    }
}
