//! Errors surfaced to callers of the orchestration layer
//!
//! Solver failures are not errors here, they are recorded on the job as
//! [`crate::jobs::JobOutcome::Error`].

use thiserror::Error;

use crate::jobs::store::StoreError;
use crate::jobs::{JobId, NetworkId};
use crate::snapshot::SnapshotError;
use crate::transport::TransportError;

/// A job was rejected before anything was published
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Network {0} does not exist")]
    UnknownNetwork(NetworkId),
    #[error("Reaction {0} is not part of the network")]
    UnknownReaction(String),
    #[error("Gene {0} is not part of the network")]
    UnknownGene(String),
    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Job rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("Job store failure: {0}")]
    Store(#[from] StoreError),
    #[error("Unable to build model snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("Job {0} does not exist")]
    JobNotFound(JobId),
}
