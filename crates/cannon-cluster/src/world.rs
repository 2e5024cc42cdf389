//! In-process rank pool: every rank runs on its own thread with a private
//! mailbox. Used to exercise the protocol in tests without an MPI launcher.
//!
//! Ranks exchange [`Envelope`]s addressed by `(source, tag)`. A receive that
//! pulls an envelope meant for a different `(source, tag)` parks it until
//! someone asks for it, so concurrent channels never steal each other's
//! traffic. Every blocking operation is bounded by
//! [`WorldOptions::timeout`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use crate::error::ClusterError;
use crate::topology::{GroupId, Topology};
use crate::transport::{check_length, Tag, Transport};

/// One message in flight.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub source: usize,
    pub tag: Tag,
    pub payload: Vec<i64>,
}

/// Tunables shared by every rank of a world.
#[derive(Debug, Clone)]
pub struct WorldOptions {
    /// Upper bound on any single receive or rendezvous wait.
    pub timeout: Duration,
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

struct Shared {
    senders: Vec<Sender<Envelope>>,
    rendezvous: Mutex<HashMap<String, Arc<Rendezvous>>>,
    options: WorldOptions,
}

/// Handle to the world as seen from one rank.
///
/// Owned by the rank's thread and passed to everything that communicates.
pub struct ProcessContext {
    rank: usize,
    shared: Arc<Shared>,
    mailbox: Receiver<Envelope>,
    parked: RefCell<Vec<Envelope>>,
}

impl Transport for ProcessContext {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.senders.len()
    }

    fn send(&self, dest: usize, tag: Tag, payload: Vec<i64>) -> Result<(), ClusterError> {
        let sender = self
            .shared
            .senders
            .get(dest)
            .ok_or(ClusterError::RankOutOfRange {
                rank: dest,
                size: self.size(),
            })?;
        trace!("rank {} -> rank {} tag {} ({} values)", self.rank, dest, tag, payload.len());
        sender
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| ClusterError::Disconnected {
                rank: self.rank,
                peer: dest,
            })
    }

    fn recv(&self, source: usize, tag: Tag, len: usize) -> Result<Vec<i64>, ClusterError> {
        let payload = self.take(source, tag)?;
        check_length(self.rank, source, tag, len, payload.len())?;
        Ok(payload)
    }

    fn channel_barrier(&self, topology: &Topology, group: GroupId) -> Result<(), ClusterError> {
        let participants = 1 + topology.group(group).len();
        self.rendezvous(&format!("channel-{}", group.tag()), participants)
    }
}

impl ProcessContext {
    /// Next envelope from `source` with `tag`, parked ones first.
    fn take(&self, source: usize, tag: Tag) -> Result<Vec<i64>, ClusterError> {
        {
            let mut parked = self.parked.borrow_mut();
            if let Some(pos) = parked
                .iter()
                .position(|env| env.source == source && env.tag == tag)
            {
                return Ok(parked.remove(pos).payload);
            }
        }

        let timeout = self.shared.options.timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.mailbox.recv_timeout(remaining) {
                Ok(env) if env.source == source && env.tag == tag => return Ok(env.payload),
                Ok(env) => {
                    trace!(
                        "rank {} parks message from rank {} tag {}",
                        self.rank,
                        env.source,
                        env.tag
                    );
                    self.parked.borrow_mut().push(env);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ClusterError::Timeout {
                        rank: self.rank,
                        peer: source,
                        tag,
                        waited: timeout,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ClusterError::Disconnected {
                        rank: self.rank,
                        peer: source,
                    })
                }
            }
        }
    }

    /// Wait until `participants` ranks have reached the rendezvous `key`.
    ///
    /// The first caller fixes the participant count; a later caller that
    /// disagrees is a protocol violation.
    pub fn rendezvous(&self, key: &str, participants: usize) -> Result<(), ClusterError> {
        let point = {
            let mut registry = self.shared.rendezvous.lock();
            registry
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Rendezvous::new(participants)))
                .clone()
        };
        if point.expected != participants {
            return Err(ClusterError::Protocol(format!(
                "rank {} joined rendezvous '{}' expecting {} participants, it was created for {}",
                self.rank, key, participants, point.expected
            )));
        }
        debug!("rank {} waiting at rendezvous '{}'", self.rank, key);
        point.wait(key, self.shared.options.timeout)
    }
}

struct RendezvousState {
    arrived: usize,
    generation: u64,
}

/// Reusable barrier with a bounded wait.
struct Rendezvous {
    expected: usize,
    state: Mutex<RendezvousState>,
    released: Condvar,
}

impl Rendezvous {
    fn new(expected: usize) -> Self {
        Self {
            expected,
            state: Mutex::new(RendezvousState {
                arrived: 0,
                generation: 0,
            }),
            released: Condvar::new(),
        }
    }

    fn wait(&self, key: &str, timeout: Duration) -> Result<(), ClusterError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.expected {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(());
        }

        while state.generation == generation {
            if self.released.wait_until(&mut state, deadline).timed_out()
                && state.generation == generation
            {
                let arrived = state.arrived;
                state.arrived -= 1;
                return Err(ClusterError::RendezvousTimeout {
                    key: key.to_string(),
                    arrived,
                    expected: self.expected,
                    waited: timeout,
                });
            }
        }
        Ok(())
    }
}

/// Entry point for running code on every rank of a fresh world.
pub struct World;

impl World {
    /// Spawn `size` ranks, run `body` on each, and wait for all of them.
    ///
    /// Results are indexed by rank. A rank that panics yields
    /// [`ClusterError::RankPanicked`].
    pub fn launch<T, F>(size: usize, options: WorldOptions, body: F) -> Vec<Result<T, ClusterError>>
    where
        T: Send,
        F: Fn(ProcessContext) -> Result<T, ClusterError> + Send + Sync,
    {
        let (senders, mailboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();
        let shared = Arc::new(Shared {
            senders,
            rendezvous: Mutex::new(HashMap::new()),
            options,
        });

        let body = &body;
        thread::scope(|scope| {
            let handles: Vec<_> = mailboxes
                .into_iter()
                .enumerate()
                .map(|(rank, mailbox)| {
                    let ctx = ProcessContext {
                        rank,
                        shared: Arc::clone(&shared),
                        mailbox,
                        parked: RefCell::new(Vec::new()),
                    };
                    thread::Builder::new()
                        .name(format!("rank-{rank}"))
                        .spawn_scoped(scope, move || body(ctx))
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or(Err(ClusterError::RankPanicked { rank })),
                    Err(e) => Err(ClusterError::Spawn(e)),
                })
                .collect()
        })
    }
}
