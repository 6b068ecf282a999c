//! Consumer applying worker results to job records

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::jobs::messages::ReceivedResult;
use crate::jobs::store::{Completion, JobStore, StoreError};
use crate::jobs::{CorrelationId, JobId};
use crate::regulation::evaluator::RegulationEvaluator;
use crate::transport::{Envelope, Subscription};

/// What the collector did with one result message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectOutcome {
    /// The result was written to the job
    Applied {
        job_id: JobId,
        correlation_id: CorrelationId,
    },
    /// The job already has a result for this request
    Duplicate {
        job_id: JobId,
        correlation_id: CorrelationId,
    },
    /// The result answers a request the job no longer waits for
    CorrelationMismatch {
        job_id: JobId,
        expected: CorrelationId,
        received: CorrelationId,
    },
    /// The job was deleted
    Orphaned {
        job_id: JobId,
        correlation_id: CorrelationId,
    },
    /// The message names no job
    Unaddressable,
}

pub struct ResultCollector {
    jobs: Arc<dyn JobStore>,
    regulation: Option<Arc<RegulationEvaluator>>,
}

impl ResultCollector {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self {
            jobs,
            regulation: None,
        }
    }

    /// Run the regulation loop on every regulated job that completes successfully
    pub fn with_regulation(mut self, evaluator: Arc<RegulationEvaluator>) -> Self {
        self.regulation = Some(evaluator);
        self
    }

    /// Apply one result message
    ///
    /// Only store failures are errors, every message that reaches the store ends in one of the
    /// [`CollectOutcome`] variants.
    pub async fn collect(&self, envelope: &Envelope) -> Result<CollectOutcome, StoreError> {
        let Some(received) = ReceivedResult::new(&envelope.body) else {
            warn!(routing_key = %envelope.routing_key, correlation_id = %envelope.correlation_id, "result body is not an object, dropped");
            return Ok(CollectOutcome::Unaddressable);
        };
        let Some(job_id) = received.job_id() else {
            warn!(routing_key = %envelope.routing_key, correlation_id = %envelope.correlation_id, "result without a job id, dropped");
            return Ok(CollectOutcome::Unaddressable);
        };
        let correlation_id = received
            .correlation_id()
            .unwrap_or(envelope.correlation_id);

        let Some(record) = self.jobs.get(job_id).await? else {
            debug!(job_id = %job_id, correlation_id = %correlation_id, "result for deleted job discarded");
            return Ok(CollectOutcome::Orphaned {
                job_id,
                correlation_id,
            });
        };
        let outcome = received.outcome(&record.kind);

        match self.jobs.complete(job_id, correlation_id, outcome).await? {
            Completion::Applied(record) => {
                info!(job_id = %job_id, correlation_id = %correlation_id, ok = record.outcome.result().is_some(), "result applied");
                if record.kind.is_regulated() && record.outcome.result().is_some() {
                    if let Some(evaluator) = &self.regulation {
                        if let Err(err) = evaluator.on_completed(&record).await {
                            warn!(job_id = %job_id, error = %err, "regulation state not recorded");
                        }
                    }
                }
                Ok(CollectOutcome::Applied {
                    job_id,
                    correlation_id,
                })
            }
            Completion::Missing => {
                debug!(job_id = %job_id, correlation_id = %correlation_id, "result for deleted job discarded");
                Ok(CollectOutcome::Orphaned {
                    job_id,
                    correlation_id,
                })
            }
            Completion::CorrelationMismatch { stored } => {
                warn!(job_id = %job_id, expected = %stored, received = %correlation_id, "stale result discarded");
                Ok(CollectOutcome::CorrelationMismatch {
                    job_id,
                    expected: stored,
                    received: correlation_id,
                })
            }
            Completion::AlreadyCompleted => {
                debug!(job_id = %job_id, correlation_id = %correlation_id, "duplicate result ignored");
                Ok(CollectOutcome::Duplicate {
                    job_id,
                    correlation_id,
                })
            }
        }
    }

    /// Apply every result already queued on `results`
    pub async fn drain(&self, results: &mut Subscription) -> Result<Vec<CollectOutcome>, StoreError> {
        let mut outcomes = Vec::new();
        while let Some(envelope) = results.try_next() {
            outcomes.push(self.collect(&envelope).await?);
        }
        Ok(outcomes)
    }

    /// Consume `results` until the transport shuts down
    pub async fn run(&self, mut results: Subscription) {
        info!(queue = %results.queue(), "result collector started");
        while let Some(envelope) = results.next().await {
            if let Err(err) = self.collect(&envelope).await {
                warn!(routing_key = %envelope.routing_key, correlation_id = %envelope.correlation_id, error = %err, "result not applied");
            }
        }
        info!(queue = %results.queue(), "result collector stopped");
    }
}
