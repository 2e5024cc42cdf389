//! Cannon command-line interface.
//!
//! Run a distributed multiplication round under MPI, optionally from a TOML
//! file (build with `--features mpi`):
//! ```sh
//! mpirun -n 9 cannon-cli run
//! mpirun -n 9 cannon-cli run job.toml --seed 7
//! cannon-cli validate job.toml
//! cannon-cli topology
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cannon_core::Schedule;

#[derive(Parser)]
#[command(name = "cannon-cli")]
#[command(about = "Cannon: distributed rolling matrix multiplication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run this process's part of one multiplication round.
    Run {
        /// Path to a job configuration file. Defaults apply without one.
        config: Option<PathBuf>,
        /// Matrix side length (overrides config file setting).
        #[arg(short = 'n', long)]
        size: Option<usize>,
        /// Seed for operand generation (overrides config file setting).
        #[arg(long)]
        seed: Option<u64>,
        /// Engine schedule: cannon or literal (overrides config file setting).
        #[arg(long)]
        schedule: Option<Schedule>,
        /// Output directory; also enables the JSON report.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running a round.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Display the rank layout of the process topology.
    Topology,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            size,
            seed,
            schedule,
            output,
        } => {
            let mut job = match &config {
                Some(path) => {
                    log::info!("configuration: {}", path.display());
                    config::load_config(path)?
                }
                None => config::JobConfig::default(),
            };

            if let Some(size) = size {
                job.run.matrix_size = size;
            }
            if seed.is_some() {
                job.run.seed = seed;
            }
            if let Some(schedule) = schedule {
                job.run.schedule = schedule;
            }

            let Some(report) = runner::run_job(&job)? else {
                return Ok(());
            };
            runner::print_report(&report);

            // Determine output directory
            let out_dir = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&job.output.directory));
            if job.output.save_json || output.is_some() {
                runner::write_report_json(&report, &out_dir.join("report.json"))?;
            }

            println!("Round complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            job.validate()?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Topology => runner::print_topology(),
    }
}
