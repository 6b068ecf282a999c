//! Computation jobs: identifiers, parameters, records and outcomes
//!
//! A job is created by [`crate::orchestrate::dispatcher::Dispatcher::submit`], which stores a
//! [`JobRecord`] carrying the correlation id of the published request. The record then ends in
//! exactly one of two ways: a result is written by the result collector, or the record is
//! deleted (cancelling the in-flight request when no result has arrived yet).

pub mod messages;
pub mod store;

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::optimize::solvers::{SolverError, VariabilityParameters};
use crate::optimize::{FbaSolution, FvaSolution};

// region Identifiers
/// Identifier of a job record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token assigned when a request is published, used to match the asynchronous result to its
/// job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user owned metabolic network
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NetworkId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl Display for NetworkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
// endregion Identifiers

// region Parameters
/// Request category, selects the worker task and the routing key suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fba,
    Fva,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fba => "fba",
            Category::Fva => "fva",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters of a flux variability job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FvaParams {
    /// Reactions to analyse, empty analyses every reaction
    #[serde(default)]
    pub reaction_subset: Vec<String>,
    #[serde(default)]
    pub loopless: bool,
    pub fraction_of_optimum: f64,
    #[serde(default)]
    pub pfba_factor: Option<f64>,
}

impl Default for FvaParams {
    fn default() -> Self {
        Self {
            reaction_subset: Vec::new(),
            loopless: false,
            fraction_of_optimum: 1.0,
            pfba_factor: None,
        }
    }
}

impl From<&FvaParams> for VariabilityParameters {
    fn from(params: &FvaParams) -> Self {
        VariabilityParameters {
            reactions: if params.reaction_subset.is_empty() {
                None
            } else {
                Some(params.reaction_subset.clone())
            },
            loopless: params.loopless,
            fraction_of_optimum: params.fraction_of_optimum,
            pfba_factor: params.pfba_factor,
        }
    }
}

/// What a job computes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Flux balance analysis
    Fba,
    /// Flux variability analysis
    Fva(FvaParams),
    /// Flux balance analysis followed by the gene regulation feedback loop
    RgeFba,
}

impl JobKind {
    pub fn category(&self) -> Category {
        match self {
            JobKind::Fba | JobKind::RgeFba => Category::Fba,
            JobKind::Fva(_) => Category::Fva,
        }
    }

    pub fn is_regulated(&self) -> bool {
        matches!(self, JobKind::RgeFba)
    }

    /// Whether two jobs compute the same kind of result, ignoring parameters
    pub fn same_kind(&self, other: &JobKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Position of a regenerated job in a regulation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    /// Job the user submitted
    pub origin: JobId,
    /// Job whose result produced this one
    pub parent: JobId,
    /// Number of resubmissions since the origin, starting at 1
    pub round: u32,
}

/// A job as requested by a caller, before dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub network_id: NetworkId,
    pub description: String,
    pub kind: JobKind,
    /// Gene ids knocked out before solving
    pub knockouts: IndexSet<String>,
    pub lineage: Option<Lineage>,
}

impl NewJob {
    pub fn fba(network_id: impl Into<NetworkId>) -> Self {
        Self::new(network_id, JobKind::Fba)
    }

    pub fn fva(network_id: impl Into<NetworkId>, params: FvaParams) -> Self {
        Self::new(network_id, JobKind::Fva(params))
    }

    pub fn rge_fba(network_id: impl Into<NetworkId>) -> Self {
        Self::new(network_id, JobKind::RgeFba)
    }

    fn new(network_id: impl Into<NetworkId>, kind: JobKind) -> Self {
        Self {
            network_id: network_id.into(),
            description: String::new(),
            kind,
            knockouts: IndexSet::new(),
            lineage: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_knockouts<I, S>(mut self, knockouts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.knockouts.extend(knockouts.into_iter().map(Into::into));
        self
    }

    pub fn with_lineage(mut self, lineage: Lineage) -> Self {
        self.lineage = Some(lineage);
        self
    }
}
// endregion Parameters

// region Records
/// Result of a successful job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Fba(FbaSolution),
    Fva(FvaSolution),
}

impl JobResult {
    pub fn as_fba(&self) -> Option<&FbaSolution> {
        match self {
            JobResult::Fba(solution) => Some(solution),
            JobResult::Fva(_) => None,
        }
    }
}

/// Outcome flag and payload of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "payload", rename_all = "snake_case")]
pub enum JobOutcome {
    /// No result has arrived yet
    Pending,
    Ok(JobResult),
    Error(SolverError),
}

impl JobOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, JobOutcome::Pending)
    }

    pub fn result(&self) -> Option<&JobResult> {
        match self {
            JobOutcome::Ok(result) => Some(result),
            _ => None,
        }
    }
}

/// Progress of the regulation feedback loop for one completed regulated job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegulationState {
    /// Rules are being evaluated against the job's shadow prices
    Evaluating,
    /// Rules knocked out new genes, the follow-up job is being submitted
    KnockoutsApplied { genes: Vec<String> },
    /// A follow-up job carrying the cumulative knockouts was submitted
    Resubmitted { next: JobId, genes: Vec<String> },
    /// No rule knocked out a new gene, the chain ends here
    Converged,
    /// New knockouts kept appearing after the maximum number of resubmissions
    NonConvergent { rounds: u32 },
    /// The loop could not continue
    Failed { detail: String },
}

impl RegulationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RegulationState::Evaluating | RegulationState::KnockoutsApplied { .. }
        )
    }
}

/// Stored state of one computation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub network_id: NetworkId,
    pub description: String,
    pub kind: JobKind,
    pub knockouts: IndexSet<String>,
    pub lineage: Option<Lineage>,
    pub created_at: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    pub outcome: JobOutcome,
    pub completed_at: Option<DateTime<Utc>>,
    pub regulation: Option<RegulationState>,
    /// Fingerprint of the model snapshot sent with the request
    #[serde(default)]
    pub snapshot: Option<String>,
}

impl JobRecord {
    /// Record of a job whose request was published under `correlation_id`
    pub fn dispatched(id: JobId, job: NewJob, correlation_id: CorrelationId) -> Self {
        Self {
            id,
            network_id: job.network_id,
            description: job.description,
            kind: job.kind,
            knockouts: job.knockouts,
            lineage: job.lineage,
            created_at: Utc::now(),
            correlation_id,
            outcome: JobOutcome::Pending,
            completed_at: None,
            regulation: None,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, fingerprint: impl Into<String>) -> Self {
        self.snapshot = Some(fingerprint.into());
        self
    }

    /// A job can be cancelled until its result has been written
    pub fn is_cancellable(&self) -> bool {
        self.outcome.is_pending()
    }

    /// The job the user originally submitted, itself for jobs outside a regulation chain
    pub fn origin(&self) -> JobId {
        self.lineage.map(|l| l.origin).unwrap_or(self.id)
    }

    pub fn round(&self) -> u32 {
        self.lineage.map(|l| l.round).unwrap_or(0)
    }
}
// endregion Records
