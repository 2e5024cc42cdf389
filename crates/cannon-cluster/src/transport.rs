//! The seam between the round protocol and whatever moves messages between
//! ranks.
//!
//! Two transports implement [`Transport`]:
//!
//! | Transport | Feature flag | Use |
//! |---------|-------------|--------|
//! | MPI (`mpi_world::MpiTransport`) | `mpi` | One OS process per rank, started by `mpirun -n 9` |
//! | Threads ([`crate::world::ProcessContext`]) | always | In-process rank pool for tests |

use crate::error::ClusterError;
use crate::topology::{GroupId, Topology};

/// Message tag. Channels use one tag per worker group.
pub type Tag = u32;

/// Point-to-point messaging and the channel-construction barrier, as seen
/// from one rank.
pub trait Transport {
    fn rank(&self) -> usize;

    /// Number of ranks in the launched pool.
    fn size(&self) -> usize;

    /// Hand `payload` to the transport for delivery to `dest`.
    fn send(&self, dest: usize, tag: Tag, payload: Vec<i64>) -> Result<(), ClusterError>;

    /// Block until a message from `source` with `tag` arrives. It must hold
    /// exactly `len` values.
    fn recv(&self, source: usize, tag: Tag, len: usize) -> Result<Vec<i64>, ClusterError>;

    /// Wait until the server and every rank of `group` have reached the
    /// construction step of that group's channel.
    fn channel_barrier(&self, topology: &Topology, group: GroupId) -> Result<(), ClusterError>;
}

pub(crate) fn check_length(
    rank: usize,
    source: usize,
    tag: Tag,
    expected: usize,
    actual: usize,
) -> Result<(), ClusterError> {
    if actual != expected {
        return Err(ClusterError::Protocol(format!(
            "rank {} got {} values from rank {} on tag {}, expected {}",
            rank, actual, source, tag, expected
        )));
    }
    Ok(())
}
