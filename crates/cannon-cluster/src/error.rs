//! Errors raised while bootstrapping or running a round.

use std::time::Duration;

use cannon_core::{EngineError, MatrixError};
use thiserror::Error;

use crate::transport::Tag;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Number of processes must be {expected}, got {actual}")]
    ProcessCount { expected: usize, actual: usize },

    #[error("Rank {rank} is outside a world of {size} processes")]
    RankOutOfRange { rank: usize, size: usize },

    #[error("Rank {rank} waited {waited:?} for tag {tag} from rank {peer} and got nothing")]
    Timeout {
        rank: usize,
        peer: usize,
        tag: Tag,
        waited: Duration,
    },

    #[error("Rendezvous '{key}' timed out after {waited:?}: {arrived} of {expected} participants arrived")]
    RendezvousTimeout {
        key: String,
        arrived: usize,
        expected: usize,
        waited: Duration,
    },

    #[error("Rank {peer} is no longer reachable from rank {rank}")]
    Disconnected { rank: usize, peer: usize },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Cannot start the message transport: {0}")]
    Launch(String),

    #[error("Rank {rank} panicked")]
    RankPanicked { rank: usize },

    #[error("Failed to start a rank thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
