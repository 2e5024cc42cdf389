//! MPI transport: one OS process per rank, started by `mpirun -n 9`.
//!
//! Channel tags are used as MPI tags unchanged. Every worker group gets its
//! own communicator, split off the world once at start-up, holding the
//! server and that group's ranks; building a channel is a barrier on it.
//!
//! Gated behind the `mpi` feature flag.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};
use mpi::datatype::Equivalence;
use mpi::environment::Universe;
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::*;

use crate::error::ClusterError;
use crate::topology::{GroupId, Role, Topology};
use crate::transport::{check_length, Tag, Transport};
use crate::world::WorldOptions;

/// Pause between completion checks of a pending receive.
const POLL_INTERVAL: Duration = Duration::from_micros(200);

pub struct MpiTransport {
    world: SimpleCommunicator,
    /// Indexed by group tag; `None` where this rank is outside the group.
    channel_comms: Vec<Option<SimpleCommunicator>>,
    options: WorldOptions,
    // Finalizes MPI when dropped, so it must outlive the communicators.
    _universe: Universe,
}

impl MpiTransport {
    /// Initialize MPI for this process.
    pub fn initialize(options: WorldOptions) -> Result<Self, ClusterError> {
        let universe = mpi::initialize()
            .ok_or_else(|| ClusterError::Launch("MPI is already initialized".into()))?;
        let world = universe.world();
        debug!("MPI rank {} of {} started", world.rank(), world.size());
        Ok(Self {
            world,
            channel_comms: Vec::new(),
            options,
            _universe: universe,
        })
    }

    /// Split one communicator per worker group off the world.
    ///
    /// Collective over the whole world: every rank must call this exactly
    /// once, after the topology has been bootstrapped and before any channel
    /// is built.
    pub fn split_channels(&mut self, topology: &Topology) -> Result<(), ClusterError> {
        let role = topology.role_of(self.rank())?;
        let mut comms = Vec::with_capacity(GroupId::ALL.len());
        for group in GroupId::ALL {
            let inside = match role {
                Role::Server => true,
                Role::Leader(id) | Role::Member(id) => id == group,
            };
            let color = if inside {
                Color::with_value(mpi_tag(group.tag())?)
            } else {
                Color::undefined()
            };
            comms.push(self.world.split_by_color(color));
        }
        self.channel_comms = comms;
        debug!("rank {} split the channel communicators", self.rank());
        Ok(())
    }

    fn check_rank(&self, rank: usize) -> Result<i32, ClusterError> {
        if rank >= self.size() {
            return Err(ClusterError::RankOutOfRange {
                rank,
                size: self.size(),
            });
        }
        Ok(rank as i32)
    }
}

impl Transport for MpiTransport {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn send(&self, dest: usize, tag: Tag, payload: Vec<i64>) -> Result<(), ClusterError> {
        let peer = self.check_rank(dest)?;
        trace!("rank {} -> rank {} tag {} ({} values)", self.rank(), dest, tag, payload.len());
        self.world
            .process_at_rank(peer)
            .send_with_tag(&payload[..], mpi_tag(tag)?);
        Ok(())
    }

    fn recv(&self, source: usize, tag: Tag, len: usize) -> Result<Vec<i64>, ClusterError> {
        let peer = self.check_rank(source)?;
        let wire_tag = mpi_tag(tag)?;
        let timeout = self.options.timeout;
        let deadline = Instant::now() + timeout;

        // One spare slot: an overlong message shows up as a wrong count.
        let mut buffer = vec![0i64; len + 1];
        let process = self.world.process_at_rank(peer);
        let status = mpi::request::scope(|scope| {
            let mut request =
                process.immediate_receive_into_with_tag(scope, &mut buffer[..], wire_tag);
            loop {
                match request.test() {
                    Ok(status) => return Ok(status),
                    Err(pending) => request = pending,
                }
                if Instant::now() >= deadline {
                    request.cancel();
                    request.wait();
                    return Err(ClusterError::Timeout {
                        rank: self.rank(),
                        peer: source,
                        tag,
                        waited: timeout,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
        })?;

        let count = status.count(i64::equivalent_datatype()) as usize;
        check_length(self.rank(), source, tag, len, count)?;
        buffer.truncate(len);
        Ok(buffer)
    }

    fn channel_barrier(&self, _topology: &Topology, group: GroupId) -> Result<(), ClusterError> {
        let comm = self
            .channel_comms
            .get(group.tag() as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                ClusterError::Protocol(format!(
                    "rank {} has no communicator for the {} channel",
                    self.rank(),
                    group
                ))
            })?;
        debug!("rank {} waiting at the {} channel barrier", self.rank(), group);
        comm.barrier();
        Ok(())
    }
}

fn mpi_tag(tag: Tag) -> Result<mpi::Tag, ClusterError> {
    mpi::Tag::try_from(tag)
        .map_err(|_| ClusterError::Protocol(format!("tag {} exceeds the MPI tag range", tag)))
}
