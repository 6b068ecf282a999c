//! Validation and publication of new jobs

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{OrchestrationError, ValidationError};
use crate::jobs::messages::JobRequest;
use crate::jobs::store::JobStore;
use crate::jobs::{CorrelationId, JobId, JobKind, JobRecord, NewJob};
use crate::metabolic_model::model::Model;
use crate::snapshot::{ModelSnapshot, NetworkStore, SnapshotError};
use crate::transport::routing::RoutingTable;
use crate::transport::{Transport, TransportError};

/// Identifiers of an accepted job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Submission {
    pub job_id: JobId,
    pub correlation_id: CorrelationId,
}

pub struct Dispatcher {
    networks: Arc<dyn NetworkStore>,
    jobs: Arc<dyn JobStore>,
    transport: Arc<dyn Transport>,
    routing: RoutingTable,
}

impl Dispatcher {
    pub fn new(
        networks: Arc<dyn NetworkStore>,
        jobs: Arc<dyn JobStore>,
        transport: Arc<dyn Transport>,
        routing: RoutingTable,
    ) -> Self {
        Self {
            networks,
            jobs,
            transport,
            routing,
        }
    }

    /// Validate `job`, store its record and publish its request
    ///
    /// Nothing is published when validation or the insert fails. A record whose request can't
    /// be published is removed again, so an accepted job always has a record carrying its
    /// correlation id before a result can arrive.
    pub async fn submit(&self, job: NewJob) -> Result<Submission, OrchestrationError> {
        let model = match self.networks.load(&job.network_id).await {
            Ok(model) => model,
            Err(SnapshotError::NetworkNotFound(id)) => {
                return Err(ValidationError::UnknownNetwork(id).into())
            }
            Err(err) => return Err(err.into()),
        };
        validate(&job, &model)?;

        let job_id = JobId::new();
        let category = job.kind.category();
        let (snapshot, report) = ModelSnapshot::build(job.network_id.clone(), &model, &job.knockouts)?;
        let fingerprint = snapshot.fingerprint();
        let request = JobRequest {
            job_id,
            category,
            network_id: job.network_id.clone(),
            model_snapshot: snapshot.into_document(),
            knocked_out_genes: job.knockouts.iter().cloned().collect(),
            fva_params: match &job.kind {
                JobKind::Fva(params) => Some(params.clone()),
                JobKind::Fba | JobKind::RgeFba => None,
            },
        };
        let body = serde_json::to_value(&request)
            .map_err(|err| TransportError::Encoding(err.to_string()))?;

        let routing_key = self.routing.feed_key(category);
        let correlation_id = CorrelationId::new();
        // The record exists before any worker can answer the request
        self.jobs
            .insert(JobRecord::dispatched(job_id, job, correlation_id).with_snapshot(fingerprint.as_str()))
            .await?;

        if let Err(err) = self
            .transport
            .publish_correlated(&routing_key, correlation_id, body)
            .await
        {
            warn!(job_id = %job_id, correlation_id = %correlation_id, routing_key = %routing_key, error = %err, "job request not published, dropping record");
            if let Err(remove_err) = self.jobs.remove(job_id).await {
                warn!(job_id = %job_id, error = %remove_err, "unable to drop unpublished job record");
            }
            return Err(err.into());
        }

        info!(
            job_id = %job_id,
            correlation_id = %correlation_id,
            routing_key = %routing_key,
            snapshot = %fingerprint,
            blocked_reactions = report.reactions.len(),
            "job dispatched"
        );
        Ok(Submission {
            job_id,
            correlation_id,
        })
    }
}

/// Check every reference and parameter of `job` against the network it runs on
pub fn validate(job: &NewJob, model: &Model) -> Result<(), ValidationError> {
    if let Some(gene) = job
        .knockouts
        .iter()
        .find(|id| !model.genes.contains_key(id.as_str()))
    {
        return Err(ValidationError::UnknownGene(gene.clone()));
    }
    if let JobKind::Fva(params) = &job.kind {
        if let Some(reaction) = params
            .reaction_subset
            .iter()
            .find(|id| !model.reactions.contains_key(id.as_str()))
        {
            return Err(ValidationError::UnknownReaction(reaction.clone()));
        }
        if !(0.0..=1.0).contains(&params.fraction_of_optimum) {
            return Err(ValidationError::InvalidParameter {
                name: "fraction_of_optimum",
                reason: format!("{} is outside [0, 1]", params.fraction_of_optimum),
            });
        }
        if let Some(factor) = params.pfba_factor {
            if factor.is_nan() || factor < 1.0 {
                return Err(ValidationError::InvalidParameter {
                    name: "pfba_factor",
                    reason: format!("{factor} is below 1"),
                });
            }
        }
    }
    Ok(())
}
