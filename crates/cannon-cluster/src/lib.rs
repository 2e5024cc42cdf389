//! # Cannon Cluster
//!
//! Runs one distributed multiplication round across a fixed pool of
//! cooperating processes: a server and two worker groups of four.
//!
//! ## Modules
//!
//! - [`transport`] — The messaging seam every rank talks through.
//! - `mpi_world` — MPI transport, one OS process per rank (feature `mpi`).
//! - [`world`] — In-process pool of thread ranks with per-rank mailboxes,
//!   used to run whole rounds in tests.
//! - [`topology`] — Partition of the pool into server, groups and leaders.
//! - [`channel`] — Tagged server↔leader channels built collectively.
//! - [`protocol`] — What the server, the leaders and the idle members do.
//!
//! Every component that communicates receives its [`Transport`]
//! explicitly.

pub mod channel;
pub mod error;
#[cfg(feature = "mpi")]
pub mod mpi_world;
pub mod protocol;
pub mod topology;
pub mod transport;
pub mod world;

pub use channel::InterChannel;
pub use error::ClusterError;
#[cfg(feature = "mpi")]
pub use mpi_world::MpiTransport;
pub use protocol::{run_local_round, run_process, GroupResult, Job, ProcessOutcome, ServerReport};
pub use topology::{GroupId, Role, Topology, WorkerGroup};
pub use transport::{Tag, Transport};
pub use world::{ProcessContext, World, WorldOptions};
