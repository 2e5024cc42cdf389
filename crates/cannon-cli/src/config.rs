//! TOML configuration deserialisation for multiplication jobs.

use anyhow::{bail, Context};
use cannon_core::Schedule;
use serde::Deserialize;

/// Top-level job configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Round parameters from TOML.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Side length N of both operands.
    #[serde(default = "default_matrix_size")]
    pub matrix_size: usize,
    /// Seed for operand generation; omitted means non-deterministic.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Engine schedule: "cannon" or "literal". Default: "cannon".
    #[serde(default)]
    pub schedule: Schedule,
    /// Engine worker threads per leader; omitted means Rayon's default.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Longest any rank waits for a message, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            matrix_size: default_matrix_size(),
            seed: None,
            schedule: Schedule::default(),
            threads: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_matrix_size() -> usize {
    6
}
fn default_timeout_ms() -> u64 {
    30_000
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the round report as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}

impl JobConfig {
    /// Reject values no round could run with. The process count comes from
    /// the MPI launcher and is checked when the round starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.run.matrix_size == 0 {
            bail!("run.matrix_size must be at least 1");
        }
        if self.run.threads == Some(0) {
            bail!("run.threads must be at least 1 when set");
        }
        if self.run.timeout_ms == 0 {
            bail!("run.timeout_ms must be positive");
        }
        Ok(())
    }
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let config: JobConfig = toml::from_str(&content)?;
    Ok(config)
}
