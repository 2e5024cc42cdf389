//! End-to-end rounds on a full nine-rank world.

use std::sync::Arc;
use std::time::Duration;

use cannon_compute::CpuBackend;
use cannon_core::{CannonEngine, Matrix, Schedule};
use cannon_cluster::channel::establish_channels;
use cannon_cluster::protocol::{run_leader, serve};
use cannon_cluster::topology::{GROUP_SIZE, WORLD_SIZE};
use cannon_cluster::{
    run_local_round, ClusterError, GroupId, Job, Role, Topology, Transport, World, WorldOptions,
};

fn worked_example() -> (Matrix, Matrix) {
    (
        Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap(),
        Matrix::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap(),
    )
}

fn engine() -> CannonEngine {
    CannonEngine::new(Arc::new(CpuBackend::with_threads(2).unwrap()), Schedule::Cannon)
}

fn short_timeout() -> WorldOptions {
    WorldOptions {
        timeout: Duration::from_millis(300),
    }
}

#[test]
fn test_bootstrap_layout() {
    let topology = Topology::bootstrap(WORLD_SIZE).unwrap();
    assert_eq!(topology.server(), 0);

    let first = topology.group(GroupId::First);
    let second = topology.group(GroupId::Second);
    assert_eq!(first.ranks(), &[1, 2, 3, 4]);
    assert_eq!(second.ranks(), &[5, 6, 7, 8]);
    assert_eq!(first.len(), GROUP_SIZE);
    assert!(first.ranks().iter().all(|r| !second.contains(*r)));

    let mut covered: Vec<usize> = std::iter::once(topology.server())
        .chain(first.ranks().iter().copied())
        .chain(second.ranks().iter().copied())
        .collect();
    covered.sort_unstable();
    assert_eq!(covered, (0..WORLD_SIZE).collect::<Vec<_>>());

    let leaders: Vec<usize> = (0..WORLD_SIZE)
        .filter(|&r| matches!(topology.role_of(r).unwrap(), Role::Leader(_)))
        .collect();
    assert_eq!(leaders, vec![1, 5]);
}

#[test]
fn test_wrong_process_count_fails_before_launch() {
    for count in [0, 1, 8, 10, 16] {
        let job = Job {
            matrix_size: 2,
            seed: Some(1),
            engine: engine(),
        };
        let err = run_local_round(count, short_timeout(), &job).unwrap_err();
        assert!(
            matches!(err, ClusterError::ProcessCount { expected: 9, actual } if actual == count),
            "count {}: {:?}",
            count,
            err
        );
    }
}

#[test]
fn test_worked_example_through_both_groups() {
    let topology = Topology::bootstrap(WORLD_SIZE).unwrap();
    let engine = engine();

    let results = World::launch(WORLD_SIZE, WorldOptions::default(), |ctx| {
        let channels = establish_channels(&ctx, &topology)?;
        match topology.role_of(ctx.rank())? {
            Role::Server => {
                let (a, b) = worked_example();
                let report = serve(&ctx, &channels, a, b)?;
                Ok(Some(report))
            }
            Role::Leader(_) => {
                let product = run_leader(&ctx, &channels[0], 2, &engine)?;
                assert_eq!(product.to_flat(), vec![19, 22, 43, 50]);
                Ok(None)
            }
            Role::Member(_) => Ok(None),
        }
    });

    let report = results[0].as_ref().unwrap().as_ref().unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].group, GroupId::First);
    assert_eq!(report.results[1].group, GroupId::Second);
    for result in &report.results {
        assert_eq!(result.product.to_flat(), vec![19, 22, 43, 50]);
    }
    assert!(report.groups_agree());
    assert!(results.iter().all(|r| r.is_ok()));
}

#[test]
fn test_seeded_round_groups_agree_with_textbook_product() {
    let job = Job {
        matrix_size: 6,
        seed: Some(2024),
        engine: engine(),
    };
    let report = run_local_round(WORLD_SIZE, WorldOptions::default(), &job).unwrap();

    let expected = Matrix::from_array(report.a.as_array().dot(report.b.as_array())).unwrap();
    assert!(report.groups_agree());
    for result in &report.results {
        assert_eq!(result.product, expected);
    }

    let again = run_local_round(WORLD_SIZE, WorldOptions::default(), &job).unwrap();
    assert_eq!(again.a, report.a);
    assert_eq!(again.b, report.b);
}

#[test]
fn test_literal_schedule_round() {
    let job = Job {
        matrix_size: 5,
        seed: Some(9),
        engine: CannonEngine::new(Arc::new(CpuBackend::new()), Schedule::Literal),
    };
    let report = run_local_round(WORLD_SIZE, WorldOptions::default(), &job).unwrap();
    let expected = Matrix::from_array(report.a.as_array().dot(report.b.as_array())).unwrap();
    assert!(report.results.iter().all(|r| r.product == expected));
}

#[test]
fn test_echoing_leader_round_trip_loses_nothing() {
    let topology = Topology::bootstrap(WORLD_SIZE).unwrap();
    let n = 3;

    let results = World::launch(WORLD_SIZE, WorldOptions::default(), |ctx| {
        let channels = establish_channels(&ctx, &topology)?;
        match topology.role_of(ctx.rank())? {
            Role::Server => {
                let a = Matrix::from_fn(n, |i, j| (i * n + j) as i64);
                let b = Matrix::from_fn(n, |i, j| 100 + (i * n + j) as i64);
                let report = serve(&ctx, &channels, a.clone(), b)?;
                for result in &report.results {
                    assert_eq!(result.product, a);
                }
                Ok(())
            }
            Role::Leader(_) => {
                let a = channels[0].receive(&ctx, n * n)?;
                let b = channels[0].receive(&ctx, n * n)?;
                assert_eq!(b[0], 100);
                channels[0].send(&ctx, &a)
            }
            Role::Member(_) => Ok(()),
        }
    });
    for (rank, result) in results.iter().enumerate() {
        assert!(result.is_ok(), "rank {}: {:?}", rank, result);
    }
}

#[test]
fn test_interleaved_channels_do_not_cross_talk() {
    let topology = Topology::bootstrap(WORLD_SIZE).unwrap();

    let results = World::launch(WORLD_SIZE, WorldOptions::default(), |ctx| {
        let channels = establish_channels(&ctx, &topology)?;
        match topology.role_of(ctx.rank())? {
            Role::Server => {
                // Second group first, alternating between channels.
                channels[1].send(&ctx, &[2, 2])?;
                channels[0].send(&ctx, &[1, 1])?;
                channels[1].send(&ctx, &[2, 3])?;
                channels[0].send(&ctx, &[1, 2])?;
                Ok(Vec::new())
            }
            Role::Leader(_) => {
                let mut received = channels[0].receive(&ctx, 2)?;
                received.extend(channels[0].receive(&ctx, 2)?);
                Ok(received)
            }
            Role::Member(_) => Ok(Vec::new()),
        }
    });

    assert_eq!(results[1].as_ref().unwrap(), &vec![1, 1, 1, 2]);
    assert_eq!(results[5].as_ref().unwrap(), &vec![2, 2, 2, 3]);
}

#[test]
fn test_leader_without_data_times_out() {
    let topology = Topology::bootstrap(WORLD_SIZE).unwrap();
    let engine = engine();

    let results = World::launch(WORLD_SIZE, short_timeout(), |ctx| {
        let channels = establish_channels(&ctx, &topology)?;
        match topology.role_of(ctx.rank())? {
            Role::Leader(_) => run_leader(&ctx, &channels[0], 2, &engine).map(|_| ()),
            _ => Ok(()),
        }
    });

    for leader in [1, 5] {
        assert!(
            matches!(results[leader], Err(ClusterError::Timeout { peer: 0, .. })),
            "rank {}: {:?}",
            leader,
            results[leader]
        );
    }
}

#[test]
fn test_wrong_buffer_length_is_a_protocol_violation() {
    let topology = Topology::bootstrap(WORLD_SIZE).unwrap();
    let engine = engine();

    let results = World::launch(WORLD_SIZE, short_timeout(), |ctx| {
        let channels = establish_channels(&ctx, &topology)?;
        match topology.role_of(ctx.rank())? {
            Role::Server => {
                for channel in &channels {
                    channel.send(&ctx, &[1, 2, 3])?;
                }
                Ok(())
            }
            Role::Leader(_) => run_leader(&ctx, &channels[0], 2, &engine).map(|_| ()),
            Role::Member(_) => Ok(()),
        }
    });

    assert!(matches!(results[1], Err(ClusterError::Protocol(_))));
    assert!(matches!(results[5], Err(ClusterError::Protocol(_))));
}

#[test]
fn test_absent_group_member_blocks_channel_construction() {
    let topology = Topology::bootstrap(WORLD_SIZE).unwrap();

    let results = World::launch(WORLD_SIZE, short_timeout(), |ctx| {
        // Rank 3 skips the collective step.
        if ctx.rank() == 3 {
            return Ok(());
        }
        establish_channels(&ctx, &topology).map(|_| ())
    });

    assert!(matches!(results[0], Err(ClusterError::RendezvousTimeout { .. })));
    assert!(matches!(results[1], Err(ClusterError::RendezvousTimeout { .. })));
}
