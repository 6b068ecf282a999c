//! Solver worker consuming job requests
//!
//! The worker reads requests from the feeds queue, solves them with a [`Solver`] on the
//! blocking thread pool and publishes one result per request, echoing the request's
//! correlation id. Cancellation requests read from the control queue make the worker skip
//! requests it has not started yet; a request already running is finished and its result is
//! discarded by the collector.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexSet;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::configuration::Configuration;
use crate::jobs::messages::{CancelRequest, JobRequest, ResultMessage};
use crate::jobs::{Category, CorrelationId, JobId, JobResult};
use crate::optimize::solvers::{Solver, SolverError, SolverErrorKind, VariabilityParameters};
use crate::snapshot::ModelSnapshot;
use crate::transport::routing::RoutingTable;
use crate::transport::{Envelope, Subscription, Transport, TransportError};

/// What the worker did with one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkOutcome {
    /// A result was published
    Completed {
        job_id: JobId,
        correlation_id: CorrelationId,
        ok: bool,
    },
    /// The request was cancelled before it started
    Revoked { correlation_id: CorrelationId },
    /// The request could not be attributed to a job, nothing was published
    Rejected { correlation_id: CorrelationId },
}

/// Correlation ids remembered by a worker, at most this many of each kind
const REMEMBERED_IDS: usize = 1024;

/// Insertion ordered set dropping its oldest id once full
#[derive(Debug)]
struct RecentIds {
    capacity: usize,
    ids: IndexSet<CorrelationId>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ids: IndexSet::new(),
        }
    }

    fn insert(&mut self, id: CorrelationId) {
        if self.ids.insert(id) && self.ids.len() > self.capacity {
            self.ids.shift_remove_index(0);
        }
    }

    fn remove(&mut self, id: &CorrelationId) -> bool {
        self.ids.shift_remove(id)
    }

    fn contains(&self, id: &CorrelationId) -> bool {
        self.ids.contains(id)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

pub struct Worker<S: Solver + 'static> {
    solver: Arc<S>,
    transport: Arc<dyn Transport>,
    routing: RoutingTable,
    min_interval: Option<Duration>,
    last_start: Option<Instant>,
    revoked: RecentIds,
    finished: RecentIds,
}

impl<S: Solver + 'static> Worker<S> {
    pub fn new(solver: Arc<S>, transport: Arc<dyn Transport>, config: &Configuration) -> Self {
        Self {
            solver,
            transport,
            routing: RoutingTable::from_configuration(config),
            min_interval: config
                .worker_rate_limit
                .filter(|rate| *rate > 0)
                .map(|rate| Duration::from_secs(1) / rate),
            last_start: None,
            revoked: RecentIds::new(REMEMBERED_IDS),
            finished: RecentIds::new(REMEMBERED_IDS),
        }
    }

    /// Remember a cancellation request
    ///
    /// Revocations of requests this worker already finished are ignored. Only the most recent
    /// revocations are kept, older ones are forgotten.
    pub fn note_revocation(&mut self, envelope: &Envelope) {
        let correlation_id = serde_json::from_value::<CancelRequest>(envelope.body.clone())
            .map(|request| request.correlation_id)
            .unwrap_or(envelope.correlation_id);
        if self.finished.contains(&correlation_id) {
            debug!(correlation_id = %correlation_id, "revocation for finished request ignored");
            return;
        }
        debug!(correlation_id = %correlation_id, "revocation noted");
        self.revoked.insert(correlation_id);
    }

    /// Number of revocations waiting for their request
    pub fn pending_revocations(&self) -> usize {
        self.revoked.len()
    }

    /// Solve one request and publish its result
    pub async fn handle(&mut self, envelope: Envelope) -> Result<WorkOutcome, TransportError> {
        let correlation_id = envelope.correlation_id;
        if self.revoked.remove(&correlation_id) {
            info!(correlation_id = %correlation_id, "revoked request skipped");
            return Ok(WorkOutcome::Revoked { correlation_id });
        }
        self.finished.insert(correlation_id);
        let request = match serde_json::from_value::<JobRequest>(envelope.body.clone()) {
            Ok(request) => request,
            Err(err) => return self.reject(&envelope, err.to_string()).await,
        };

        self.throttle().await;
        let job_id = request.job_id;
        let category = request.category;
        debug!(job_id = %job_id, correlation_id = %correlation_id, category = %category, "solving");
        let outcome = self.solve(request).await;

        let ok = outcome.is_ok();
        let message = match outcome {
            Ok(result) => ResultMessage::success(job_id, correlation_id, result),
            Err(error) => {
                info!(job_id = %job_id, correlation_id = %correlation_id, error = %error, "job failed");
                ResultMessage::failure(job_id, correlation_id, error)
            }
        };
        self.publish_result(category, correlation_id, &message).await?;
        Ok(WorkOutcome::Completed {
            job_id,
            correlation_id,
            ok,
        })
    }

    /// Handle every cancellation and request already queued, cancellations first
    pub async fn process_pending(
        &mut self,
        feeds: &mut Subscription,
        control: &mut Subscription,
    ) -> Result<Vec<WorkOutcome>, TransportError> {
        for envelope in control.drain() {
            self.note_revocation(&envelope);
        }
        let mut outcomes = Vec::new();
        while let Some(envelope) = feeds.try_next() {
            outcomes.push(self.handle(envelope).await?);
        }
        Ok(outcomes)
    }

    /// Consume requests until the feeds queue closes
    pub async fn run(mut self, mut feeds: Subscription, mut control: Subscription) {
        info!(queue = %feeds.queue(), "worker started");
        loop {
            tokio::select! {
                biased;
                Some(envelope) = control.next() => self.note_revocation(&envelope),
                feed = feeds.next() => match feed {
                    Some(envelope) => {
                        let correlation_id = envelope.correlation_id;
                        if let Err(err) = self.handle(envelope).await {
                            warn!(correlation_id = %correlation_id, error = %err, "result not published");
                        }
                    }
                    None => break,
                },
            }
        }
        info!(queue = %feeds.queue(), "worker stopped");
    }

    async fn solve(&self, request: JobRequest) -> Result<JobResult, SolverError> {
        let solver = self.solver.clone();
        let task = tokio::task::spawn_blocking(move || {
            let model = ModelSnapshot::from_document(request.network_id, request.model_snapshot)
                .load()
                .map_err(|err| SolverError::new(SolverErrorKind::InvalidSnapshot, err.to_string()))?;
            match request.category {
                Category::Fba => {
                    let solution = solver.optimize(&model)?;
                    if solution.status.is_solved() {
                        Ok(JobResult::Fba(solution))
                    } else {
                        Err(SolverError::from_status(solution.status))
                    }
                }
                Category::Fva => {
                    let parameters = request
                        .fva_params
                        .as_ref()
                        .map(VariabilityParameters::from)
                        .unwrap_or_default();
                    solver.variability(&model, &parameters).map(JobResult::Fva)
                }
            }
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(SolverError::new(
                SolverErrorKind::Other,
                format!("solver task failed: {err}"),
            )),
        }
    }

    /// Answer a request that could not be decoded, if it names its job
    async fn reject(&self, envelope: &Envelope, detail: String) -> Result<WorkOutcome, TransportError> {
        let correlation_id = envelope.correlation_id;
        let job_id = envelope
            .body
            .get("job_id")
            .cloned()
            .and_then(|v| serde_json::from_value::<JobId>(v).ok());
        let Some(job_id) = job_id else {
            warn!(correlation_id = %correlation_id, error = %detail, "unreadable request dropped");
            return Ok(WorkOutcome::Rejected { correlation_id });
        };
        let category = envelope
            .body
            .get("category")
            .cloned()
            .and_then(|v| serde_json::from_value::<Category>(v).ok())
            .unwrap_or(Category::Fba);
        warn!(job_id = %job_id, correlation_id = %correlation_id, error = %detail, "unreadable request");
        let message = ResultMessage::failure(
            job_id,
            correlation_id,
            SolverError::new(SolverErrorKind::MalformedPayload, detail),
        );
        self.publish_result(category, correlation_id, &message).await?;
        Ok(WorkOutcome::Completed {
            job_id,
            correlation_id,
            ok: false,
        })
    }

    async fn publish_result(
        &self,
        category: Category,
        correlation_id: CorrelationId,
        message: &ResultMessage,
    ) -> Result<(), TransportError> {
        let body: Value = serde_json::to_value(message)
            .map_err(|err| TransportError::Encoding(err.to_string()))?;
        self.transport
            .publish_correlated(&self.routing.result_key(category), correlation_id, body)
            .await
    }

    async fn throttle(&mut self) {
        if let (Some(interval), Some(last)) = (self.min_interval, self.last_start) {
            tokio::time::sleep_until(last + interval).await;
        }
        self.last_start = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::messages::ReceivedResult;
    use crate::jobs::{FvaParams, JobKind, JobOutcome, NewJob};
    use crate::optimize::OptimizationStatus;
    use crate::test_fixtures::{Harness, ScriptedSolver, FIXTURE_NETWORK};
    use crate::transport::routing::{CONTROL_QUEUE, FEEDS_QUEUE, RESULTS_QUEUE};
    use serde_json::json;

    struct Queues {
        feeds: Subscription,
        control: Subscription,
        results: Subscription,
    }

    fn queues(harness: &Harness) -> Queues {
        Queues {
            feeds: harness.transport.subscribe(FEEDS_QUEUE).unwrap(),
            control: harness.transport.subscribe(CONTROL_QUEUE).unwrap(),
            results: harness.transport.subscribe(RESULTS_QUEUE).unwrap(),
        }
    }

    fn worker(harness: &Harness, solver: ScriptedSolver) -> Worker<ScriptedSolver> {
        Worker::new(Arc::new(solver), harness.transport.clone(), &harness.config)
    }

    #[tokio::test]
    async fn fba_result_echoes_correlation() {
        let harness = Harness::new();
        let mut queues = queues(&harness);
        let mut worker = worker(&harness, ScriptedSolver::with_shadow_prices(&[("o2_c", 0.1)]));
        let submission = harness
            .dispatcher
            .submit(NewJob::fba(FIXTURE_NETWORK).with_knockouts(["b0432"]))
            .await
            .unwrap();

        let outcomes = worker
            .process_pending(&mut queues.feeds, &mut queues.control)
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![WorkOutcome::Completed {
                job_id: submission.job_id,
                correlation_id: submission.correlation_id,
                ok: true
            }]
        );
        let result = queues.results.try_next().unwrap();
        assert_eq!(result.routing_key, "result.fba");
        assert_eq!(result.correlation_id, submission.correlation_id);
        let received = ReceivedResult::new(&result.body).unwrap();
        let JobOutcome::Ok(JobResult::Fba(solution)) = received.outcome(&JobKind::Fba) else {
            panic!("unexpected result {}", result.body);
        };
        // The snapshot carried the knockout, CYTBO3 is blocked
        let cytbo3 = solution.fluxes.iter().find(|f| f.name == "CYTBO3").unwrap();
        assert_eq!(cytbo3.value, 0.0);
    }

    #[tokio::test]
    async fn fva_uses_request_parameters() {
        let harness = Harness::new();
        let mut queues = queues(&harness);
        let mut worker = worker(&harness, ScriptedSolver::with_shadow_prices(&[]));
        let params = FvaParams {
            reaction_subset: vec!["PFK".to_string()],
            fraction_of_optimum: 0.5,
            ..FvaParams::default()
        };
        harness
            .dispatcher
            .submit(NewJob::fva(FIXTURE_NETWORK, params.clone()))
            .await
            .unwrap();
        worker
            .process_pending(&mut queues.feeds, &mut queues.control)
            .await
            .unwrap();
        let result = queues.results.try_next().unwrap();
        assert_eq!(result.routing_key, "result.fva");
        let received = ReceivedResult::new(&result.body).unwrap();
        let JobOutcome::Ok(JobResult::Fva(solution)) = received.outcome(&JobKind::Fva(params)) else {
            panic!("unexpected result {}", result.body);
        };
        assert_eq!(solution.maximum.len(), 1);
        assert_eq!(solution.maximum[0].value, 0.5);
    }

    #[tokio::test]
    async fn solver_failure_is_reported() {
        let harness = Harness::new();
        let mut queues = queues(&harness);
        let mut worker = worker(
            &harness,
            ScriptedSolver::failing(SolverError::new(SolverErrorKind::Infeasible, "no feasible flux")),
        );
        harness.dispatcher.submit(NewJob::fba(FIXTURE_NETWORK)).await.unwrap();
        worker
            .process_pending(&mut queues.feeds, &mut queues.control)
            .await
            .unwrap();
        let result = queues.results.try_next().unwrap();
        assert_eq!(result.body["ok"], false);
        assert_eq!(result.body["error"]["kind"], "Infeasible");
        assert_eq!(result.body["error"]["detail"], "no feasible flux");
    }

    #[tokio::test]
    async fn revoked_requests_are_skipped() {
        let harness = Harness::new();
        let mut queues = queues(&harness);
        let solver = Arc::new(ScriptedSolver::with_shadow_prices(&[]));
        let mut worker = Worker::new(solver.clone(), harness.transport.clone(), &harness.config);
        let cancelled = harness.dispatcher.submit(NewJob::fba(FIXTURE_NETWORK)).await.unwrap();
        let kept = harness.dispatcher.submit(NewJob::fba(FIXTURE_NETWORK)).await.unwrap();
        harness
            .transport
            .revoke("control.revoke", cancelled.correlation_id)
            .await
            .unwrap();

        let outcomes = worker
            .process_pending(&mut queues.feeds, &mut queues.control)
            .await
            .unwrap();
        assert_eq!(
            outcomes[0],
            WorkOutcome::Revoked {
                correlation_id: cancelled.correlation_id
            }
        );
        assert!(matches!(outcomes[1], WorkOutcome::Completed { job_id, .. } if job_id == kept.job_id));
        assert_eq!(solver.calls(), 1);
        assert_eq!(queues.results.drain().len(), 1);
    }

    #[tokio::test]
    async fn revocations_are_bounded() {
        let harness = Harness::new();
        let mut queues = queues(&harness);
        let mut worker = worker(&harness, ScriptedSolver::with_shadow_prices(&[]));
        let finished = harness.dispatcher.submit(NewJob::fba(FIXTURE_NETWORK)).await.unwrap();
        worker
            .process_pending(&mut queues.feeds, &mut queues.control)
            .await
            .unwrap();

        // Revoking a request after its result went out leaves nothing behind
        harness
            .transport
            .revoke("control.revoke", finished.correlation_id)
            .await
            .unwrap();
        worker
            .process_pending(&mut queues.feeds, &mut queues.control)
            .await
            .unwrap();
        assert_eq!(worker.pending_revocations(), 0);

        // Revocations for requests that never arrive are capped
        for _ in 0..REMEMBERED_IDS + 10 {
            harness
                .transport
                .revoke("control.revoke", CorrelationId::new())
                .await
                .unwrap();
        }
        worker
            .process_pending(&mut queues.feeds, &mut queues.control)
            .await
            .unwrap();
        assert_eq!(worker.pending_revocations(), REMEMBERED_IDS);
    }

    #[test]
    fn recent_ids_drop_the_oldest() {
        let mut ids = RecentIds::new(2);
        let (a, b, c) = (CorrelationId::new(), CorrelationId::new(), CorrelationId::new());
        ids.insert(a);
        ids.insert(b);
        ids.insert(c);
        assert!(!ids.contains(&a));
        assert!(ids.contains(&b) && ids.contains(&c));
        assert!(ids.remove(&b));
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn unsolved_status_and_bad_snapshots_fail() {
        let harness = Harness::new();
        let mut queues = queues(&harness);
        let mut worker = worker(&harness, ScriptedSolver::with_shadow_prices(&[]));
        let job_id = JobId::new();
        harness
            .transport
            .publish(
                "feed.fba",
                json!({
                    "job_id": job_id,
                    "category": "fba",
                    "network_id": FIXTURE_NETWORK,
                    "model_snapshot": "not json",
                    "knocked_out_genes": []
                }),
            )
            .await
            .unwrap();
        harness
            .transport
            .publish("feed.fba", json!({"job_id": JobId::new(), "category": "fva"}))
            .await
            .unwrap();
        harness.transport.publish("feed.fba", json!({})).await.unwrap();

        let outcomes = worker
            .process_pending(&mut queues.feeds, &mut queues.control)
            .await
            .unwrap();
        assert!(matches!(outcomes[0], WorkOutcome::Completed { ok: false, .. }));
        assert!(matches!(outcomes[1], WorkOutcome::Completed { ok: false, .. }));
        assert!(matches!(outcomes[2], WorkOutcome::Rejected { .. }));

        let results = queues.results.drain();
        assert_eq!(results[0].body["error"]["kind"], "InvalidSnapshot");
        assert_eq!(results[1].routing_key, "result.fva");
        assert_eq!(results[1].body["error"]["kind"], "MalformedPayload");
        assert_eq!(
            SolverError::from_status(OptimizationStatus::Unbounded).kind,
            SolverErrorKind::Unbounded
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_spaces_job_starts() {
        let harness = Harness::new();
        let mut queues = queues(&harness);
        let config = Configuration {
            worker_rate_limit: Some(2),
            ..harness.config.clone()
        };
        let mut worker = Worker::new(
            Arc::new(ScriptedSolver::with_shadow_prices(&[])),
            harness.transport.clone(),
            &config,
        );
        for _ in 0..3 {
            harness.dispatcher.submit(NewJob::fba(FIXTURE_NETWORK)).await.unwrap();
        }
        let started = Instant::now();
        worker
            .process_pending(&mut queues.feeds, &mut queues.control)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }
}
