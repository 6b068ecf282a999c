//! Module describing optimization results and the solver interface used by workers
//!
//! Building and solving the optimization problem happens behind [`solvers::Solver`], this
//! module only defines what goes in and what comes out.

pub mod solvers;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A named numeric value, e.g. the flux through one reaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: f64,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Collect named values into a map keyed by name, later duplicates win
pub fn to_table(values: &[NamedValue]) -> IndexMap<String, f64> {
    values.iter().map(|v| (v.name.clone(), v.value)).collect()
}

/// Struct representing the solution of a flux balance analysis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FbaSolution {
    /// Optimized value of the objective
    pub objective_value: f64,
    /// The status of the optimization problem
    pub status: OptimizationStatus,
    /// Flux through each reaction at the optimum
    pub fluxes: Vec<NamedValue>,
    /// Reduced cost of each reaction at the optimum
    pub reduced_costs: Vec<NamedValue>,
    /// Shadow price of each metabolite's mass balance constraint, keyed by metabolite id
    pub shadow_prices: Vec<NamedValue>,
}

/// Struct representing the solution of a flux variability analysis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FvaSolution {
    /// Minimum flux of each analysed reaction
    pub minimum: Vec<NamedValue>,
    /// Maximum flux of each analysed reaction
    pub maximum: Vec<NamedValue>,
}

/// Status of an optimization problem
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    /// Problem has been optimized
    Optimal,
    /// An approximate solution has been found
    AlmostOptimal,
    /// Problem can't be optimized because objective value is not bounded
    Unbounded,
    /// Problem can't be solved because it is infeasible (conflicting constraints)
    Infeasible,
    /// A numerical error occurred during solving
    NumericalError,
    /// The solver hit the maximum allowed iterations, or max time, or made insufficient progress
    SolverHalted,
}

impl OptimizationStatus {
    /// Whether a solution with this status carries usable values
    pub fn is_solved(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::Optimal | OptimizationStatus::AlmostOptimal
        )
    }
}
