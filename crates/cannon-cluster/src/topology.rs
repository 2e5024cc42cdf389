//! Partition of the process pool into a server and two worker groups.

use std::fmt;

use serde::Serialize;

use crate::error::ClusterError;
use crate::transport::Tag;

/// The only pool size this topology supports.
pub const WORLD_SIZE: usize = 9;
/// Ranks per worker group.
pub const GROUP_SIZE: usize = 4;
pub const SERVER_RANK: usize = 0;

/// One of the two worker groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GroupId {
    First,
    Second,
}

impl GroupId {
    pub const ALL: [GroupId; 2] = [GroupId::First, GroupId::Second];

    /// Tag carried by every message on this group's channel.
    pub fn tag(self) -> Tag {
        match self {
            GroupId::First => 0,
            GroupId::Second => 1,
        }
    }

    /// One-based group number, as shown to users.
    pub fn number(self) -> usize {
        match self {
            GroupId::First => 1,
            GroupId::Second => 2,
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.number())
    }
}

/// Ranks belonging to one worker group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerGroup {
    pub id: GroupId,
    ranks: Vec<usize>,
    leader: usize,
}

impl WorkerGroup {
    fn new(id: GroupId, first_rank: usize) -> Self {
        let ranks: Vec<usize> = (first_rank..first_rank + GROUP_SIZE).collect();
        Self {
            id,
            leader: first_rank,
            ranks,
        }
    }

    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    /// The lowest rank in the group.
    pub fn leader(&self) -> usize {
        self.leader
    }

    pub fn contains(&self, rank: usize) -> bool {
        self.ranks.contains(&rank)
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// What a rank does in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Leader(GroupId),
    Member(GroupId),
}

/// Rank 0 serves; ranks 1–4 form group 1 and ranks 5–8 group 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    server: usize,
    groups: [WorkerGroup; 2],
}

impl Topology {
    /// Lay out a pool of `process_count` ranks. Anything but
    /// [`WORLD_SIZE`] is rejected before any rank is started.
    pub fn bootstrap(process_count: usize) -> Result<Self, ClusterError> {
        if process_count != WORLD_SIZE {
            return Err(ClusterError::ProcessCount {
                expected: WORLD_SIZE,
                actual: process_count,
            });
        }
        Ok(Self {
            server: SERVER_RANK,
            groups: [
                WorkerGroup::new(GroupId::First, SERVER_RANK + 1),
                WorkerGroup::new(GroupId::Second, SERVER_RANK + 1 + GROUP_SIZE),
            ],
        })
    }

    pub fn process_count(&self) -> usize {
        1 + self.groups.iter().map(WorkerGroup::len).sum::<usize>()
    }

    pub fn server(&self) -> usize {
        self.server
    }

    pub fn groups(&self) -> &[WorkerGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> &WorkerGroup {
        match id {
            GroupId::First => &self.groups[0],
            GroupId::Second => &self.groups[1],
        }
    }

    pub fn role_of(&self, rank: usize) -> Result<Role, ClusterError> {
        if rank == self.server {
            return Ok(Role::Server);
        }
        let group = self
            .groups
            .iter()
            .find(|g| g.contains(rank))
            .ok_or(ClusterError::RankOutOfRange {
                rank,
                size: self.process_count(),
            })?;
        if rank == group.leader() {
            Ok(Role::Leader(group.id))
        } else {
            Ok(Role::Member(group.id))
        }
    }
}
