//! The regulation feedback loop run on completion of a regulated job

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::configuration::Configuration;
use crate::jobs::store::{JobStore, StoreError};
use crate::jobs::{JobRecord, JobResult, Lineage, NewJob, RegulationState};
use crate::metabolic_model::model::Model;
use crate::orchestrate::dispatcher::Dispatcher;
use crate::regulation::catalog::RegulationCatalog;
use crate::regulation::ShadowPriceTable;
use crate::snapshot::{ModelSnapshot, NetworkStore};

pub struct RegulationEvaluator {
    catalog: Arc<RegulationCatalog>,
    networks: Arc<dyn NetworkStore>,
    jobs: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    compartment_suffix: String,
    max_rounds: u32,
}

impl RegulationEvaluator {
    pub fn new(
        catalog: Arc<RegulationCatalog>,
        networks: Arc<dyn NetworkStore>,
        jobs: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        config: &Configuration,
    ) -> Self {
        Self {
            catalog,
            networks,
            jobs,
            dispatcher,
            compartment_suffix: config.compartment_suffix.clone(),
            max_rounds: config.max_regulation_rounds,
        }
    }

    /// Ids of active genes whose regulation rule is false
    ///
    /// Every rule sees the model as it was at the start of the pass, so the result does not
    /// depend on gene order. Genes without a name or without a catalog rule are never knocked
    /// out.
    pub fn genes_to_knock_out(&self, model: &Model, prices: &ShadowPriceTable) -> Vec<String> {
        model
            .genes
            .values()
            .filter(|gene| gene.is_active())
            .filter_map(|gene| {
                let rule = self.catalog.rule_for(gene.name.as_deref()?)?;
                (!rule.allows_expression(model, prices, &self.compartment_suffix))
                    .then(|| gene.id.clone())
            })
            .collect()
    }

    /// Run one round of the loop for a regulated job whose result was just written
    ///
    /// Returns the terminal state recorded on the job, or `None` if the job was deleted
    /// before evaluation started.
    pub async fn on_completed(
        &self,
        record: &JobRecord,
    ) -> Result<Option<RegulationState>, StoreError> {
        if self
            .transition(record, RegulationState::Evaluating)
            .await?
            .is_none()
        {
            debug!(job_id = %record.id, "job deleted before regulation");
            return Ok(None);
        }
        let state = self.evaluate(record).await;
        self.transition(record, state.clone()).await?;
        Ok(Some(state))
    }

    async fn evaluate(&self, record: &JobRecord) -> RegulationState {
        let Some(solution) = record.outcome.result().and_then(JobResult::as_fba) else {
            return RegulationState::Failed {
                detail: "regulated job finished without an FBA result".to_string(),
            };
        };
        let prices = ShadowPriceTable::from_solution(solution);

        let model = match self.solved_model(record).await {
            Ok(model) => model,
            Err(detail) => return RegulationState::Failed { detail },
        };

        let genes = self.genes_to_knock_out(&model, &prices);
        if genes.is_empty() {
            return RegulationState::Converged;
        }
        if record.round() >= self.max_rounds {
            warn!(
                job_id = %record.id,
                origin = %record.origin(),
                rounds = record.round(),
                pending_knockouts = ?genes,
                "regulation did not converge"
            );
            return RegulationState::NonConvergent {
                rounds: record.round(),
            };
        }

        if let Err(err) = self
            .transition(
                record,
                RegulationState::KnockoutsApplied {
                    genes: genes.clone(),
                },
            )
            .await
        {
            return RegulationState::Failed {
                detail: err.to_string(),
            };
        }
        let next = NewJob::rge_fba(record.network_id.clone())
            .with_description(format!(
                "{} (regulation round {})",
                record.description,
                record.round() + 1
            ))
            .with_knockouts(record.knockouts.iter().cloned().chain(genes.iter().cloned()))
            .with_lineage(Lineage {
                origin: record.origin(),
                parent: record.id,
                round: record.round() + 1,
            });
        match self.dispatcher.submit(next).await {
            Ok(submission) => RegulationState::Resubmitted {
                next: submission.job_id,
                genes,
            },
            Err(err) => RegulationState::Failed {
                detail: err.to_string(),
            },
        }
    }

    /// The model the worker solved for `record`
    ///
    /// The snapshot is rebuilt from the stored network and must match the fingerprint taken at
    /// dispatch, a network edited in between fails the round.
    async fn solved_model(&self, record: &JobRecord) -> Result<Model, String> {
        let network = self
            .networks
            .load(&record.network_id)
            .await
            .map_err(|err| err.to_string())?;
        let (snapshot, _) =
            ModelSnapshot::build(record.network_id.clone(), &network, &record.knockouts)
                .map_err(|err| err.to_string())?;
        if let Some(expected) = &record.snapshot {
            if snapshot.fingerprint() != *expected {
                return Err(format!(
                    "network {} changed since job {} was dispatched",
                    record.network_id, record.id
                ));
            }
        }
        snapshot.load().map_err(|err| err.to_string())
    }

    async fn transition(
        &self,
        record: &JobRecord,
        state: RegulationState,
    ) -> Result<Option<JobRecord>, StoreError> {
        info!(job_id = %record.id, correlation_id = %record.correlation_id, state = ?state, "regulation state");
        self.jobs.set_regulation(record.id, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{CorrelationId, JobId, JobKind, JobOutcome};
    use crate::optimize::solvers::{SolverError, SolverErrorKind};
    use crate::optimize::{FbaSolution, NamedValue, OptimizationStatus};
    use crate::regulation::catalog::RegulationEntry;
    use crate::test_fixtures::{fixture_model, Harness, FIXTURE_NETWORK};

    fn prices(values: &[(&str, f64)]) -> ShadowPriceTable {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn completed(prices: &[(&str, f64)], knockouts: &[&str], round: u32) -> JobRecord {
        let mut job = NewJob::rge_fba(FIXTURE_NETWORK).with_knockouts(knockouts.iter().copied());
        if round > 0 {
            let origin = JobId::new();
            job = job.with_lineage(Lineage {
                origin,
                parent: origin,
                round,
            });
        }
        let mut record = JobRecord::dispatched(JobId::new(), job, CorrelationId::new());
        record.outcome = JobOutcome::Ok(JobResult::Fba(FbaSolution {
            objective_value: 1.0,
            status: OptimizationStatus::Optimal,
            fluxes: vec![],
            reduced_costs: vec![],
            shadow_prices: prices
                .iter()
                .map(|(name, value)| NamedValue::new(*name, *value))
                .collect(),
        }));
        record
    }

    fn single_rule_harness(rule: &str) -> Harness {
        Harness::with_catalog(
            RegulationCatalog::from_entries(vec![RegulationEntry {
                b_num: "b0432".to_string(),
                gene: "cyoA".to_string(),
                rule: rule.to_string(),
                reference: String::new(),
            }])
            .unwrap(),
        )
    }

    #[test]
    fn less_than_rule_follows_price_sign() {
        let harness = single_rule_harness("A_less_than");
        let model = fixture_model();
        assert!(harness
            .evaluator
            .genes_to_knock_out(&model, &prices(&[("A_c", -1.0)]))
            .is_empty());
        assert_eq!(
            harness
                .evaluator
                .genes_to_knock_out(&model, &prices(&[("A_c", 1.0)])),
            vec!["b0432"]
        );
    }

    #[test]
    fn pass_ignores_gene_order_and_is_stable_at_convergence() {
        let harness = Harness::new();
        let mut model = fixture_model();
        // Oxygen priced positively: only fnr loses its rule this pass, arcA still sees fnr
        let table = prices(&[("o2_c", 0.4)]);
        assert_eq!(harness.evaluator.genes_to_knock_out(&model, &table), vec!["b1334"]);

        model.knock_out_genes(["b1334", "b4401", "b0432", "b0721"]).unwrap();
        assert!(harness.evaluator.genes_to_knock_out(&model, &table).is_empty());
        assert!(harness.evaluator.genes_to_knock_out(&model, &table).is_empty());
    }

    #[tokio::test]
    async fn new_knockouts_resubmit_with_cumulative_set() {
        let harness = Harness::new();
        let record = completed(&[("o2_c", 0.4)], &["b3916"], 0);
        harness.jobs.insert(record.clone()).await.unwrap();

        let state = harness.evaluator.on_completed(&record).await.unwrap().unwrap();
        let RegulationState::Resubmitted { next, genes } = state else {
            panic!("unexpected state {state:?}");
        };
        assert_eq!(genes, vec!["b1334"]);
        let next = harness.jobs.get(next).await.unwrap().unwrap();
        assert_eq!(next.kind, JobKind::RgeFba);
        assert_eq!(next.knockouts.iter().collect::<Vec<_>>(), vec!["b3916", "b1334"]);
        assert_eq!(
            next.lineage,
            Some(Lineage {
                origin: record.id,
                parent: record.id,
                round: 1
            })
        );
        assert_eq!(harness.transport.published_to("feed.fba").len(), 1);
        let stored = harness.jobs.get(record.id).await.unwrap().unwrap();
        assert!(matches!(stored.regulation, Some(RegulationState::Resubmitted { .. })));
    }

    #[tokio::test]
    async fn no_new_knockouts_converges() {
        let harness = Harness::new();
        // Negative oxygen price keeps fnr and therefore the whole cascade expressed
        let record = completed(&[("o2_c", -0.4)], &[], 0);
        harness.jobs.insert(record.clone()).await.unwrap();
        let state = harness.evaluator.on_completed(&record).await.unwrap();
        assert_eq!(state, Some(RegulationState::Converged));
        assert!(harness.transport.published().is_empty());
    }

    #[tokio::test]
    async fn round_cap_is_non_convergent() {
        let harness = Harness::new();
        let record = completed(&[("o2_c", 0.4)], &[], 3);
        harness.jobs.insert(record.clone()).await.unwrap();
        let state = harness.evaluator.on_completed(&record).await.unwrap();
        assert_eq!(state, Some(RegulationState::NonConvergent { rounds: 3 }));
        assert!(harness.transport.published().is_empty());
    }

    #[tokio::test]
    async fn network_edited_mid_chain_fails_the_round() {
        let harness = Harness::new();
        let submission = harness
            .dispatcher
            .submit(NewJob::rge_fba(FIXTURE_NETWORK))
            .await
            .unwrap();
        let mut record = harness.jobs.get(submission.job_id).await.unwrap().unwrap();
        assert!(record.snapshot.is_some());
        record.outcome = completed(&[("o2_c", 0.4)], &[], 0).outcome;
        harness.jobs.remove(record.id).await.unwrap();
        harness.jobs.insert(record.clone()).await.unwrap();

        // Knocking out fnr in the stored network would hide the knockout this round needs
        let mut edited = fixture_model();
        edited.knock_out_genes(["b1334"]).unwrap();
        harness.networks.insert(FIXTURE_NETWORK.into(), edited);

        let state = harness.evaluator.on_completed(&record).await.unwrap();
        assert!(
            matches!(&state, Some(RegulationState::Failed { detail }) if detail.contains("changed")),
            "{state:?}"
        );
        assert_eq!(harness.transport.published_to("feed.fba").len(), 1);
    }

    #[tokio::test]
    async fn unchanged_network_matches_the_dispatched_snapshot() {
        let harness = Harness::new();
        let submission = harness
            .dispatcher
            .submit(NewJob::rge_fba(FIXTURE_NETWORK).with_knockouts(["b3916"]))
            .await
            .unwrap();
        let mut record = harness.jobs.get(submission.job_id).await.unwrap().unwrap();
        record.outcome = completed(&[("o2_c", -0.4)], &[], 0).outcome;

        let state = harness.evaluator.on_completed(&record).await.unwrap();
        assert_eq!(state, Some(RegulationState::Converged));
    }

    #[tokio::test]
    async fn failures_are_recorded_on_the_job() {
        let harness = Harness::new();
        let mut record = completed(&[], &[], 0);
        record.outcome = JobOutcome::Error(SolverError::of_kind(SolverErrorKind::Infeasible));
        harness.jobs.insert(record.clone()).await.unwrap();
        let state = harness.evaluator.on_completed(&record).await.unwrap();
        assert!(matches!(state, Some(RegulationState::Failed { .. })));

        let mut orphan = completed(&[("o2_c", 0.4)], &[], 0);
        orphan.network_id = "deleted".into();
        harness.jobs.insert(orphan.clone()).await.unwrap();
        let state = harness.evaluator.on_completed(&orphan).await.unwrap();
        assert!(matches!(state, Some(RegulationState::Failed { .. })));

        let missing = completed(&[("o2_c", 0.4)], &[], 0);
        assert_eq!(harness.evaluator.on_completed(&missing).await.unwrap(), None);
    }
}
