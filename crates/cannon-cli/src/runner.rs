//! Round runner: ties together configuration, engine and cluster.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use cannon_cluster::{ClusterError, Job, ServerReport, Topology, WorldOptions};
use cannon_compute::{ComputeBackend, CpuBackend};
use cannon_core::CannonEngine;

use crate::config::JobConfig;

/// Run this process's part of one round from a parsed job configuration.
///
/// Only the server ends with a report; every other rank returns `Ok(None)`.
/// So does every rank when the launcher started the wrong number of
/// processes: that is reported and treated as a clean no-op, not a failure.
pub fn run_job(job: &JobConfig) -> Result<Option<ServerReport>> {
    job.validate()?;

    #[cfg(feature = "mpi")]
    {
        run_mpi(job)
    }
    #[cfg(not(feature = "mpi"))]
    {
        anyhow::bail!(
            "Binary was built without --features mpi; rebuild it and start the round with `mpirun -n 9 cannon-cli run`"
        )
    }
}

#[cfg(feature = "mpi")]
fn run_mpi(job: &JobConfig) -> Result<Option<ServerReport>> {
    use cannon_cluster::{run_process, MpiTransport, ProcessOutcome, Transport};

    let mut transport =
        MpiTransport::initialize(world_options(job)).context("Cannot start MPI")?;
    let rank = transport.rank();
    let Some(topology) = bootstrap_topology(transport.size(), rank)? else {
        return Ok(None);
    };
    transport.split_channels(&topology)?;

    let cluster_job = build_job(job)?;
    if rank == topology.server() {
        println!("Cannon Matrix Multiplication");
        println!("============================");
        println!("Backend: {}", cluster_job.engine.backend.device_info().name);
        println!("Schedule: {}", cluster_job.engine.schedule);
    }

    let outcome = run_process(&transport, &topology, &cluster_job)
        .with_context(|| format!("Rank {} failed during the round", rank))?;
    match outcome {
        ProcessOutcome::Server(report) => Ok(Some(report)),
        ProcessOutcome::Leader { .. } | ProcessOutcome::Idle { .. } => Ok(None),
    }
}

/// Lay out the launched pool of `process_count` ranks.
///
/// A wrong count is announced once, by rank 0, and yields `None` on every
/// rank before any communication is attempted.
#[cfg_attr(not(feature = "mpi"), allow(dead_code))]
fn bootstrap_topology(process_count: usize, rank: usize) -> Result<Option<Topology>> {
    match Topology::bootstrap(process_count) {
        Ok(topology) => Ok(Some(topology)),
        Err(ClusterError::ProcessCount { expected, actual }) => {
            log::warn!("refusing to start with {} processes", actual);
            if rank == 0 {
                println!("Number of processes must be {}! Exiting..", expected);
            }
            Ok(None)
        }
        Err(e) => Err(e).context("Cannot lay out the process pool"),
    }
}

#[cfg_attr(not(feature = "mpi"), allow(dead_code))]
fn build_job(job: &JobConfig) -> Result<Job> {
    let backend = create_backend(job.run.threads)?;
    Ok(Job {
        matrix_size: job.run.matrix_size,
        seed: job.run.seed,
        engine: CannonEngine::new(backend, job.run.schedule),
    })
}

#[cfg_attr(not(feature = "mpi"), allow(dead_code))]
fn world_options(job: &JobConfig) -> WorldOptions {
    WorldOptions {
        timeout: Duration::from_millis(job.run.timeout_ms),
    }
}

/// Print both operands and every group's product.
pub fn print_report(report: &ServerReport) {
    println!();
    println!("Matrix A:");
    print!("{}", report.a);
    println!();
    println!("Matrix B:");
    print!("{}", report.b);

    for result in &report.results {
        println!();
        println!("Result matrix from {}:", result.group);
        print!("{}", result.product);
    }

    println!();
    if report.groups_agree() {
        println!("Both groups returned the same product.");
    } else {
        println!("Warning: the groups returned different products.");
    }
}

/// Write the round report to a JSON file.
pub fn write_report_json(report: &ServerReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(report)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Report (JSON) written to: {}", path.display());
    Ok(())
}

/// Print the rank layout of the fixed topology.
pub fn print_topology() -> Result<()> {
    let topology = Topology::bootstrap(cannon_cluster::topology::WORLD_SIZE)?;
    println!("Processes: {}", topology.process_count());
    println!("  rank {:<2} server", topology.server());
    for group in topology.groups() {
        for &rank in group.ranks() {
            let role = if rank == group.leader() { "leader" } else { "member" };
            println!("  rank {:<2} {} {} (channel tag {})", rank, group.id, role, group.id.tag());
        }
    }
    Ok(())
}

/// Create the engine backend, with a dedicated pool when a thread count is
/// configured.
fn create_backend(threads: Option<usize>) -> Result<Arc<dyn ComputeBackend>> {
    match threads {
        Some(n) => {
            let backend = CpuBackend::with_threads(n)
                .with_context(|| format!("Cannot build a pool of {} threads", n))?;
            Ok(Arc::new(backend))
        }
        None => Ok(Arc::new(CpuBackend::new())),
    }
}
