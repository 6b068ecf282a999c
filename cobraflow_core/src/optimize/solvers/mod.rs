//! Interface to the optimization engine run by workers

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metabolic_model::model::Model;
use crate::optimize::{FbaSolution, FvaSolution, OptimizationStatus};

/// Parameters of a flux variability analysis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariabilityParameters {
    /// Reactions to analyse, `None` analyses every reaction
    pub reactions: Option<Vec<String>>,
    /// Whether to remove thermodynamically infeasible loops
    pub loopless: bool,
    /// Fraction of the optimum the objective must stay above
    pub fraction_of_optimum: f64,
    /// Bound on the total flux relative to the parsimonious FBA solution
    pub pfba_factor: Option<f64>,
}

impl Default for VariabilityParameters {
    fn default() -> Self {
        Self {
            reactions: None,
            loopless: false,
            fraction_of_optimum: 1.0,
            pfba_factor: None,
        }
    }
}

/// Black box optimization engine
///
/// Implementations are called from worker threads and may block.
pub trait Solver: Send + Sync {
    /// Run a flux balance analysis
    fn optimize(&self, model: &Model) -> Result<FbaSolution, SolverError>;

    /// Run a flux variability analysis
    fn variability(
        &self,
        model: &Model,
        parameters: &VariabilityParameters,
    ) -> Result<FvaSolution, SolverError>;
}

/// Category of a failed job, carried verbatim in result messages
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverErrorKind {
    Infeasible,
    Unbounded,
    SolverUnavailable,
    NumericalError,
    /// The worker could not read the model snapshot it was given
    InvalidSnapshot,
    /// The result message could not be decoded
    MalformedPayload,
    Other,
}

impl Display for SolverErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SolverErrorKind::Infeasible => "Infeasible",
            SolverErrorKind::Unbounded => "Unbounded",
            SolverErrorKind::SolverUnavailable => "SolverUnavailable",
            SolverErrorKind::NumericalError => "NumericalError",
            SolverErrorKind::InvalidSnapshot => "InvalidSnapshot",
            SolverErrorKind::MalformedPayload => "MalformedPayload",
            SolverErrorKind::Other => "Other",
        };
        write!(f, "{name}")
    }
}

impl From<OptimizationStatus> for SolverErrorKind {
    fn from(status: OptimizationStatus) -> Self {
        match status {
            OptimizationStatus::Infeasible => SolverErrorKind::Infeasible,
            OptimizationStatus::Unbounded => SolverErrorKind::Unbounded,
            OptimizationStatus::NumericalError => SolverErrorKind::NumericalError,
            OptimizationStatus::SolverHalted
            | OptimizationStatus::Optimal
            | OptimizationStatus::AlmostOptimal => SolverErrorKind::Other,
        }
    }
}

/// Structured failure of a job, recorded on the job rather than raised
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
#[error("{kind}{}", .detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct SolverError {
    pub kind: SolverErrorKind,
    #[serde(default)]
    pub detail: Option<String>,
}

impl SolverError {
    pub fn new(kind: SolverErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    pub fn of_kind(kind: SolverErrorKind) -> Self {
        Self { kind, detail: None }
    }

    /// Error for a solution whose status carries no usable values
    pub fn from_status(status: OptimizationStatus) -> Self {
        Self::new(status.into(), format!("solver finished with status {status:?}"))
    }
}
