//! The round itself: the server hands both operands to each group's leader,
//! the leaders multiply, and the server collects both products.
//!
//! Each channel carries exactly three messages per round, in this order:
//! A (server → leader), B (server → leader), product (leader → server).
//! Every message is a flat row-major buffer of N² values with no header.

use cannon_core::{CannonEngine, Matrix};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::channel::{establish_channels, InterChannel};
use crate::error::ClusterError;
use crate::topology::{GroupId, Role, Topology};
use crate::transport::Transport;
use crate::world::{World, WorldOptions};

/// Exclusive upper bound of generated matrix entries.
pub const VALUE_BOUND: i64 = 100;

/// Everything a round needs besides the world itself.
pub struct Job {
    /// Side length N of both operands.
    pub matrix_size: usize,
    /// Seed for the server's generator; `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub engine: CannonEngine,
}

/// One group's returned product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupResult {
    pub group: GroupId,
    pub product: Matrix,
}

/// What the server ends a round with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerReport {
    pub a: Matrix,
    pub b: Matrix,
    pub results: Vec<GroupResult>,
}

impl ServerReport {
    /// Whether every group returned the same product.
    pub fn groups_agree(&self) -> bool {
        self.results
            .windows(2)
            .all(|pair| pair[0].product == pair[1].product)
    }
}

/// How a single rank finished the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Server(ServerReport),
    Leader { group: GroupId, product: Matrix },
    Idle { group: GroupId },
}

/// An `n`×`n` matrix with entries drawn uniformly from `[0, VALUE_BOUND)`.
pub fn random_matrix<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Matrix {
    Matrix::from_fn(n, |_, _| rng.gen_range(0..VALUE_BOUND))
}

/// Leader side: receive A then B, multiply, send the product back.
pub fn run_leader(
    ctx: &dyn Transport,
    channel: &InterChannel,
    n: usize,
    engine: &CannonEngine,
) -> Result<Matrix, ClusterError> {
    let a = channel.receive(ctx, n * n)?;
    let b = channel.receive(ctx, n * n)?;
    info!(
        "leader of {} received A and B ({} values each)",
        channel.group(),
        n * n
    );

    let a = Matrix::from_flat(&a, n)?;
    let b = Matrix::from_flat(&b, n)?;
    let product = engine.multiply(&a, &b)?;

    channel.send(ctx, &product.to_flat())?;
    info!("leader of {} returned its product", channel.group());
    Ok(product)
}

/// Server side with given operands: send A then B on every channel, then
/// collect one product per channel in channel order.
pub fn serve(
    ctx: &dyn Transport,
    channels: &[InterChannel],
    a: Matrix,
    b: Matrix,
) -> Result<ServerReport, ClusterError> {
    if a.size() != b.size() {
        return Err(ClusterError::Protocol(format!(
            "operands differ in size: {} and {}",
            a.size(),
            b.size()
        )));
    }
    let n = a.size();
    let (flat_a, flat_b) = (a.to_flat(), b.to_flat());

    for channel in channels {
        info!("server sending operands to {}", channel.group());
        channel.send(ctx, &flat_a)?;
        channel.send(ctx, &flat_b)?;
    }

    let mut results = Vec::with_capacity(channels.len());
    for channel in channels {
        let buffer = channel.receive(ctx, n * n)?;
        info!("server received the product of {}", channel.group());
        results.push(GroupResult {
            group: channel.group(),
            product: Matrix::from_flat(&buffer, n)?,
        });
    }

    Ok(ServerReport { a, b, results })
}

/// Server side: generate both operands, then [`serve`] them.
pub fn run_server<R: Rng + ?Sized>(
    ctx: &dyn Transport,
    channels: &[InterChannel],
    n: usize,
    rng: &mut R,
) -> Result<ServerReport, ClusterError> {
    let a = random_matrix(n, rng);
    let b = random_matrix(n, rng);
    serve(ctx, channels, a, b)
}

/// Everything one rank does in a round.
pub fn run_process(
    ctx: &dyn Transport,
    topology: &Topology,
    job: &Job,
) -> Result<ProcessOutcome, ClusterError> {
    let role = topology.role_of(ctx.rank())?;
    let channels = establish_channels(ctx, topology)?;

    match role {
        Role::Server => {
            let mut rng = match job.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            run_server(ctx, &channels, job.matrix_size, &mut rng).map(ProcessOutcome::Server)
        }
        Role::Leader(group) => {
            let channel = channels
                .first()
                .ok_or_else(|| ClusterError::Protocol(format!("{} has no channel", group)))?;
            let product = run_leader(ctx, channel, job.matrix_size, &job.engine)?;
            Ok(ProcessOutcome::Leader { group, product })
        }
        Role::Member(group) => Ok(ProcessOutcome::Idle { group }),
    }
}

/// Run one round on a fresh in-process world of `process_count` ranks and
/// return the server's report.
///
/// A wrong `process_count` fails before any rank is started. When ranks
/// fail, the first error that is not a timeout is returned, since timeouts
/// are usually a peer's reaction to that failure.
pub fn run_local_round(
    process_count: usize,
    options: WorldOptions,
    job: &Job,
) -> Result<ServerReport, ClusterError> {
    let topology = Topology::bootstrap(process_count)?;
    info!(
        "launching {} ranks: server {}, leaders {} and {}",
        topology.process_count(),
        topology.server(),
        topology.group(GroupId::First).leader(),
        topology.group(GroupId::Second).leader()
    );

    let outcomes = World::launch(topology.process_count(), options, |ctx| {
        run_process(&ctx, &topology, job)
    });

    let mut report = None;
    let mut errors = Vec::new();
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(ProcessOutcome::Server(r)) => report = Some(r),
            Ok(_) => {}
            Err(e) => {
                warn!("rank {} failed: {}", rank, e);
                errors.push(e);
            }
        }
    }

    if !errors.is_empty() {
        let root = errors
            .iter()
            .position(|e| !is_timeout(e))
            .unwrap_or(0);
        return Err(errors.swap_remove(root));
    }
    report.ok_or_else(|| ClusterError::Protocol("server produced no report".into()))
}

fn is_timeout(error: &ClusterError) -> bool {
    matches!(
        error,
        ClusterError::Timeout { .. } | ClusterError::RendezvousTimeout { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_entries_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = random_matrix(6, &mut rng);
        assert_eq!(m.size(), 6);
        assert!(m.to_flat().iter().all(|&v| (0..VALUE_BOUND).contains(&v)));
    }

    #[test]
    fn test_same_seed_same_operands() {
        let a = random_matrix(4, &mut StdRng::seed_from_u64(42));
        let b = random_matrix(4, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_agreement_check() {
        let product = Matrix::from_rows(vec![vec![1]]).unwrap();
        let mut report = ServerReport {
            a: product.clone(),
            b: product.clone(),
            results: vec![
                GroupResult { group: GroupId::First, product: product.clone() },
                GroupResult { group: GroupId::Second, product: product.clone() },
            ],
        };
        assert!(report.groups_agree());
        report.results[1].product = Matrix::from_rows(vec![vec![2]]).unwrap();
        assert!(!report.groups_agree());
    }
}
