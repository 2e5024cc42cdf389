//! Tagged channels between the server and one worker group's leader.
//!
//! Construction is collective: the server and every rank of the group must
//! call [`InterChannel::establish`] for that group, including members that
//! never use the channel afterwards. After the group's barrier the server
//! and the leader exchange a handshake on the group's tag, which confirms
//! that each end is talking to the rank it expects.

use log::info;

use crate::error::ClusterError;
use crate::topology::{GroupId, Role, Topology};
use crate::transport::{Tag, Transport};

const HELLO: i64 = 0x4845_4c4f;
const ACK: i64 = 0x4143_4b00;

/// Which end of the channel this rank holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Server,
    Leader,
    /// Took part in construction; may not send or receive.
    Member,
}

/// An ordered, tagged server↔leader path for one worker group.
#[derive(Debug, Clone)]
pub struct InterChannel {
    group: GroupId,
    tag: Tag,
    peer: usize,
    endpoint: Endpoint,
}

impl InterChannel {
    /// Collectively build the channel for `group`.
    pub fn establish(
        ctx: &dyn Transport,
        topology: &Topology,
        group: GroupId,
    ) -> Result<Self, ClusterError> {
        let rank = ctx.rank();
        let members = topology.group(group);
        let tag = group.tag();

        let (endpoint, peer) = match topology.role_of(rank)? {
            Role::Server => (Endpoint::Server, members.leader()),
            Role::Leader(id) if id == group => (Endpoint::Leader, topology.server()),
            Role::Member(id) if id == group => (Endpoint::Member, topology.server()),
            _ => {
                return Err(ClusterError::Protocol(format!(
                    "rank {} is on neither side of the {} channel",
                    rank, group
                )))
            }
        };

        ctx.channel_barrier(topology, group)?;

        match endpoint {
            Endpoint::Server => {
                ctx.send(peer, tag, vec![HELLO, i64::from(tag)])?;
                expect_handshake(ctx.recv(peer, tag, 2)?, ACK, tag)?;
            }
            Endpoint::Leader => {
                expect_handshake(ctx.recv(peer, tag, 2)?, HELLO, tag)?;
                ctx.send(peer, tag, vec![ACK, i64::from(tag)])?;
            }
            Endpoint::Member => {}
        }

        info!("rank {} joined the {} channel (tag {}) as {:?}", rank, group, tag, endpoint);
        Ok(Self {
            group,
            tag,
            peer,
            endpoint,
        })
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// The rank at the other end.
    pub fn peer(&self) -> usize {
        self.peer
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Send one flat buffer to the other end.
    pub fn send(&self, ctx: &dyn Transport, buffer: &[i64]) -> Result<(), ClusterError> {
        self.check_active(ctx)?;
        ctx.send(self.peer, self.tag, buffer.to_vec())
    }

    /// Receive the next flat buffer, which must hold `expected_len` values.
    pub fn receive(&self, ctx: &dyn Transport, expected_len: usize) -> Result<Vec<i64>, ClusterError> {
        self.check_active(ctx)?;
        ctx.recv(self.peer, self.tag, expected_len)
    }

    fn check_active(&self, ctx: &dyn Transport) -> Result<(), ClusterError> {
        if self.endpoint == Endpoint::Member {
            return Err(ClusterError::Protocol(format!(
                "rank {} is not the leader of {} and cannot use its channel",
                ctx.rank(),
                self.group
            )));
        }
        Ok(())
    }
}

fn expect_handshake(message: Vec<i64>, kind: i64, tag: Tag) -> Result<(), ClusterError> {
    if message != [kind, i64::from(tag)] {
        return Err(ClusterError::Protocol(format!(
            "bad handshake on tag {}: {:?}",
            tag, message
        )));
    }
    Ok(())
}

/// Build every channel this rank takes part in: both for the server, in
/// group order, and only its own group's for a worker.
pub fn establish_channels(
    ctx: &dyn Transport,
    topology: &Topology,
) -> Result<Vec<InterChannel>, ClusterError> {
    match topology.role_of(ctx.rank())? {
        Role::Server => GroupId::ALL
            .iter()
            .map(|&group| InterChannel::establish(ctx, topology, group))
            .collect(),
        Role::Leader(group) | Role::Member(group) => {
            Ok(vec![InterChannel::establish(ctx, topology, group)?])
        }
    }
}
