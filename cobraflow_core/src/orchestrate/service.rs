//! Entry point used by the application owning networks and jobs

use std::sync::Arc;

use tracing::info;

use crate::configuration::Configuration;
use crate::error::OrchestrationError;
use crate::jobs::store::JobStore;
use crate::jobs::{FvaParams, JobId, JobOutcome, JobRecord, NetworkId, NewJob};
use crate::metabolic_model::metabolite::is_coenzyme;
use crate::optimize::NamedValue;
use crate::orchestrate::cancellation::{CancelDecision, CancellationGuard};
use crate::orchestrate::collector::ResultCollector;
use crate::orchestrate::dispatcher::Dispatcher;
use crate::regulation::catalog::RegulationCatalog;
use crate::regulation::evaluator::RegulationEvaluator;
use crate::snapshot::NetworkStore;
use crate::transport::routing::RoutingTable;
use crate::transport::Transport;

/// A job's result next to the result it is usually compared with
#[derive(Clone, Debug, PartialEq)]
pub struct ResultView {
    pub job: JobRecord,
    /// Latest successful job of the same kind on the same network created before `job`
    pub previous: Option<JobRecord>,
    /// Shadow prices of cofactor metabolites, empty for variability results
    pub coenzymes: Vec<NamedValue>,
}

pub struct JobService {
    jobs: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    evaluator: Arc<RegulationEvaluator>,
    collector: Arc<ResultCollector>,
    guard: CancellationGuard,
}

impl JobService {
    /// Wire the orchestration components around shared stores and one transport
    pub fn new(
        networks: Arc<dyn NetworkStore>,
        jobs: Arc<dyn JobStore>,
        transport: Arc<dyn Transport>,
        catalog: Arc<RegulationCatalog>,
        config: &Configuration,
    ) -> Self {
        let routing = RoutingTable::from_configuration(config);
        let dispatcher = Arc::new(Dispatcher::new(
            networks.clone(),
            jobs.clone(),
            transport.clone(),
            routing.clone(),
        ));
        let evaluator = Arc::new(RegulationEvaluator::new(
            catalog,
            networks,
            jobs.clone(),
            dispatcher.clone(),
            config,
        ));
        let collector =
            Arc::new(ResultCollector::new(jobs.clone()).with_regulation(evaluator.clone()));
        Self {
            jobs,
            dispatcher,
            evaluator,
            collector,
            guard: CancellationGuard::new(transport, routing),
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn evaluator(&self) -> Arc<RegulationEvaluator> {
        self.evaluator.clone()
    }

    pub fn collector(&self) -> Arc<ResultCollector> {
        self.collector.clone()
    }

    pub fn guard(&self) -> &CancellationGuard {
        &self.guard
    }

    // region Submission
    pub async fn submit(&self, job: NewJob) -> Result<JobId, OrchestrationError> {
        Ok(self.dispatcher.submit(job).await?.job_id)
    }

    pub async fn submit_fba<I, S>(&self, network_id: NetworkId, knockouts: I) -> Result<JobId, OrchestrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(NewJob::fba(network_id).with_knockouts(knockouts)).await
    }

    pub async fn submit_fva(&self, network_id: NetworkId, params: FvaParams) -> Result<JobId, OrchestrationError> {
        self.submit(NewJob::fva(network_id, params)).await
    }

    /// Submit an FBA job whose result feeds the regulation loop
    pub async fn submit_rge_fba<I, S>(
        &self,
        network_id: NetworkId,
        knockouts: I,
    ) -> Result<JobId, OrchestrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(NewJob::rge_fba(network_id).with_knockouts(knockouts)).await
    }
    // endregion Submission

    // region Queries
    pub async fn get_job(&self, job_id: JobId) -> Result<JobRecord, OrchestrationError> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(OrchestrationError::JobNotFound(job_id))
    }

    pub async fn result_view(&self, job_id: JobId) -> Result<ResultView, OrchestrationError> {
        let job = self.get_job(job_id).await?;
        let previous = self
            .jobs
            .list_for_network(&job.network_id)
            .await?
            .into_iter()
            .filter(|other| {
                other.id != job.id
                    && other.kind.same_kind(&job.kind)
                    && other.created_at <= job.created_at
                    && matches!(other.outcome, JobOutcome::Ok(_))
            })
            .last();
        let coenzymes = job
            .outcome
            .result()
            .and_then(|result| result.as_fba())
            .map(|solution| {
                solution
                    .shadow_prices
                    .iter()
                    .filter(|price| is_coenzyme(&price.name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(ResultView {
            job,
            previous,
            coenzymes,
        })
    }

    /// Every job of the regulation chain started by `origin`, in round order
    pub async fn regulation_chain(&self, origin: JobId) -> Result<Vec<JobRecord>, OrchestrationError> {
        let first = self.get_job(origin).await?;
        let mut chain: Vec<JobRecord> = self
            .jobs
            .list_for_network(&first.network_id)
            .await?
            .into_iter()
            .filter(|record| record.origin() == origin)
            .collect();
        chain.sort_by_key(JobRecord::round);
        Ok(chain)
    }
    // endregion Queries

    /// Delete a job, revoking its request first if no result has arrived
    ///
    /// If the revocation can't be published the job is kept and the error returned.
    pub async fn delete_job(&self, job_id: JobId) -> Result<CancelDecision, OrchestrationError> {
        let record = self.get_job(job_id).await?;
        let decision = self.guard.before_delete(&record).await?;
        self.jobs.remove(job_id).await?;
        info!(job_id = %job_id, decision = ?decision, "job deleted");
        Ok(decision)
    }
}
