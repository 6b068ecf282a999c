//! Revocation of in-flight requests when their job is deleted

use std::sync::Arc;

use tracing::{debug, info};

use crate::jobs::{CorrelationId, JobRecord};
use crate::transport::routing::RoutingTable;
use crate::transport::{Transport, TransportError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelDecision {
    /// A cancellation request was published for the pending request
    Revoked(CorrelationId),
    /// The job already has a result
    NotNeeded,
}

pub struct CancellationGuard {
    transport: Arc<dyn Transport>,
    routing: RoutingTable,
}

impl CancellationGuard {
    pub fn new(transport: Arc<dyn Transport>, routing: RoutingTable) -> Self {
        Self { transport, routing }
    }

    /// Called right before `record` is deleted
    ///
    /// A result racing with the cancellation is harmless: once the record is gone the
    /// collector discards it.
    pub async fn before_delete(&self, record: &JobRecord) -> Result<CancelDecision, TransportError> {
        if !record.is_cancellable() {
            debug!(job_id = %record.id, "job already completed, nothing to cancel");
            return Ok(CancelDecision::NotNeeded);
        }
        self.transport
            .revoke(self.routing.control_key(), record.correlation_id)
            .await?;
        info!(job_id = %record.id, correlation_id = %record.correlation_id, "pending request revoked");
        Ok(CancelDecision::Revoked(record.correlation_id))
    }
}
