//! Networks, catalogs and solvers shared by the unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::configuration::Configuration;
use crate::jobs::store::InMemoryJobStore;
use crate::metabolic_model::model::Model;
use crate::optimize::solvers::{Solver, SolverError, VariabilityParameters};
use crate::optimize::{FbaSolution, FvaSolution, NamedValue, OptimizationStatus};
use crate::orchestrate::cancellation::CancellationGuard;
use crate::orchestrate::collector::ResultCollector;
use crate::orchestrate::dispatcher::Dispatcher;
use crate::orchestrate::service::JobService;
use crate::regulation::catalog::RegulationCatalog;
use crate::regulation::evaluator::RegulationEvaluator;
use crate::snapshot::InMemoryNetworkStore;
use crate::transport::memory::InMemoryTransport;
use crate::transport::routing::RoutingTable;

pub const FIXTURE_NETWORK: &str = "e_coli_mini";

/// Small respiratory network
///
/// Regulators `fnr`, `arcA`, `cyoA` and `sdhC` each gate one reaction (or none), and the
/// catalog in [`CASCADE_CATALOG`] chains them so every knockout triggers the next one.
pub const FIXTURE_MODEL: &str = r#"{
"id":"e_coli_mini",
"compartments":{"c":"cytosol","e":"extracellular space"},
"metabolites":[
{"id":"atp_c","name":"ATP","compartment":"c"},
{"id":"adp_c","name":"ADP","compartment":"c"},
{"id":"f6p_c","name":"D-Fructose 6-phosphate","compartment":"c"},
{"id":"fdp_c","name":"D-Fructose 1,6-bisphosphate","compartment":"c"},
{"id":"o2_c","name":"O2","compartment":"c"},
{"id":"o2_e","name":"O2","compartment":"e"},
{"id":"h2o_c","name":"H2O","compartment":"c"},
{"id":"q8_c","name":"Ubiquinone-8","compartment":"c"},
{"id":"q8h2_c","name":"Ubiquinol-8","compartment":"c"},
{"id":"succ_c","name":"Succinate","compartment":"c"},
{"id":"fum_c","name":"Fumarate","compartment":"c"}
],
"reactions":[
{"id":"PFK","metabolites":{"adp_c":1.0,"atp_c":-1.0,"f6p_c":-1.0,"fdp_c":1.0},
"lower_bound":0.0,"upper_bound":1000.0,"gene_reaction_rule":"b3916 or b1723",
"objective_coefficient":1.0},
{"id":"CYTBO3","metabolites":{"o2_c":-0.5,"q8h2_c":-1.0,"h2o_c":1.0,"q8_c":1.0},
"lower_bound":0.0,"upper_bound":1000.0,"gene_reaction_rule":"b0432"},
{"id":"SUCDi","metabolites":{"succ_c":-1.0,"q8_c":-1.0,"fum_c":1.0,"q8h2_c":1.0},
"lower_bound":0.0,"upper_bound":1000.0,"gene_reaction_rule":"b0721"},
{"id":"O2t","metabolites":{"o2_e":-1.0,"o2_c":1.0},
"lower_bound":-1000.0,"upper_bound":1000.0,"gene_reaction_rule":""},
{"id":"ATPM","metabolites":{"atp_c":-1.0,"adp_c":1.0},
"lower_bound":8.39,"upper_bound":1000.0,"gene_reaction_rule":""}
],
"genes":[
{"id":"b3916","name":"pfkA"},
{"id":"b1723","name":"pfkB"},
{"id":"b1334","name":"fnr"},
{"id":"b4401","name":"arcA"},
{"id":"b0432","name":"cyoA"},
{"id":"b0721","name":"sdhC"}
]
}"#;

/// `fnr` needs negative oxygen pricing, every other regulator needs its predecessor
pub const CASCADE_CATALOG: &str = r#"[
{"b_num":"b1334","gene":"fnr","rule":"o2_less_than","reference":"fixture"},
{"b_num":"b4401","gene":"arcA","rule":"fnr","reference":"fixture"},
{"b_num":"b0432","gene":"cyoA","rule":"arcA","reference":"fixture"},
{"b_num":"b0721","gene":"sdhC","rule":"cyoA","reference":"fixture"}
]"#;

pub fn fixture_model() -> Model {
    Model::from_json_str(FIXTURE_MODEL).unwrap()
}

/// Solver returning canned values
///
/// Every active reaction carries a flux of one, and `shadow_prices` is reported as given.
pub struct ScriptedSolver {
    pub shadow_prices: Vec<NamedValue>,
    pub failure: Mutex<Option<SolverError>>,
    pub calls: AtomicUsize,
}

impl ScriptedSolver {
    pub fn with_shadow_prices(prices: &[(&str, f64)]) -> Self {
        Self {
            shadow_prices: prices
                .iter()
                .map(|(name, value)| NamedValue::new(*name, *value))
                .collect(),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: SolverError) -> Self {
        let solver = Self::with_shadow_prices(&[]);
        *solver.failure.lock().unwrap() = Some(error);
        solver
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), SolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Solver for ScriptedSolver {
    fn optimize(&self, model: &Model) -> Result<FbaSolution, SolverError> {
        self.check_failure()?;
        let fluxes = model
            .reactions
            .values()
            .map(|r| NamedValue::new(r.id.clone(), if r.is_active() { 1.0 } else { 0.0 }))
            .collect();
        Ok(FbaSolution {
            objective_value: 1.0,
            status: OptimizationStatus::Optimal,
            fluxes,
            reduced_costs: Vec::new(),
            shadow_prices: self.shadow_prices.clone(),
        })
    }

    fn variability(
        &self,
        model: &Model,
        parameters: &VariabilityParameters,
    ) -> Result<FvaSolution, SolverError> {
        self.check_failure()?;
        let ids: Vec<String> = match &parameters.reactions {
            Some(ids) => ids.clone(),
            None => model.reactions.keys().cloned().collect(),
        };
        Ok(FvaSolution {
            minimum: ids
                .iter()
                .map(|id| NamedValue::new(id.clone(), 0.0))
                .collect(),
            maximum: ids
                .iter()
                .map(|id| NamedValue::new(id.clone(), parameters.fraction_of_optimum))
                .collect(),
        })
    }
}

/// Orchestration components wired around in-memory stores and transport
///
/// Holds the fixture network under [`FIXTURE_NETWORK`] and runs without a worker rate limit.
pub struct Harness {
    pub config: Configuration,
    pub routing: RoutingTable,
    pub transport: Arc<InMemoryTransport>,
    pub jobs: Arc<InMemoryJobStore>,
    pub networks: Arc<InMemoryNetworkStore>,
    pub service: JobService,
    pub dispatcher: Arc<Dispatcher>,
    pub evaluator: Arc<RegulationEvaluator>,
    pub collector: Arc<ResultCollector>,
    pub guard: CancellationGuard,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_catalog(RegulationCatalog::from_json_str(CASCADE_CATALOG).unwrap())
    }

    pub fn with_catalog(catalog: RegulationCatalog) -> Self {
        let config = Configuration {
            worker_rate_limit: None,
            ..Configuration::default()
        };
        Self::build(config, catalog)
    }

    pub fn with_config(config: Configuration) -> Self {
        Self::build(
            config,
            RegulationCatalog::from_json_str(CASCADE_CATALOG).unwrap(),
        )
    }

    fn build(config: Configuration, catalog: RegulationCatalog) -> Self {
        let routing = RoutingTable::from_configuration(&config);
        let transport = Arc::new(InMemoryTransport::new(routing.clone()).with_recording());
        let jobs = Arc::new(InMemoryJobStore::new());
        let networks = Arc::new(InMemoryNetworkStore::new());
        networks.insert(FIXTURE_NETWORK.into(), fixture_model());
        let service = JobService::new(
            networks.clone(),
            jobs.clone(),
            transport.clone(),
            Arc::new(catalog),
            &config,
        );
        Self {
            dispatcher: service.dispatcher(),
            evaluator: service.evaluator(),
            collector: service.collector(),
            guard: CancellationGuard::new(transport.clone(), routing.clone()),
            config,
            routing,
            transport,
            jobs,
            networks,
            service,
        }
    }
}
