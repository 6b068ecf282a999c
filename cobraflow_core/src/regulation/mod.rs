//! Gene regulation feedback loop for regulated FBA jobs
//!
//! After a regulated job succeeds, every catalog rule is evaluated against the job's shadow
//! prices. Genes whose rule is false are knocked out and the job is resubmitted with the
//! cumulative knockout set, until no rule knocks out a new gene or the round cap is reached.

pub mod catalog;
pub mod evaluator;
pub mod rule;

use indexmap::IndexMap;

use crate::optimize::{to_table, FbaSolution};

/// Shadow prices of one FBA result keyed by compartment qualified metabolite id
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShadowPriceTable(IndexMap<String, f64>);

impl ShadowPriceTable {
    pub fn from_solution(solution: &FbaSolution) -> Self {
        Self(to_table(&solution.shadow_prices))
    }

    pub fn get(&self, metabolite_id: &str) -> Option<f64> {
        self.0.get(metabolite_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for ShadowPriceTable {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
