//! This module provides a struct for representing reactions
use super::model::Gpr;
use crate::configuration::Configuration;
use crate::metabolic_model::gene::GeneActivity;
use derive_builder::Builder;
use indexmap::IndexMap;

/// Represents a reaction in the metabolic model
#[derive(Builder, Debug, Clone)]
pub struct Reaction {
    /// Used to identify the reaction
    pub id: String,
    /// Metabolite stoichiometry of the reaction
    #[builder(default = "IndexMap::new()")]
    pub metabolites: IndexMap<String, f64>,
    /// Human-readable reaction name
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Gene Protein Reaction rule to determine if reaction is active
    #[builder(default = "None")]
    pub gpr: Option<Gpr>,
    /// Lower flux bound
    #[builder(default = "Configuration::current().lower_bound")]
    pub lower_bound: f64,
    /// Upper flux bound
    #[builder(default = "Configuration::current().upper_bound")]
    pub upper_bound: f64,
    /// Reaction subsystem
    #[builder(default = "None")]
    pub subsystem: Option<String>,
    /// Notes about the reaction
    #[builder(default = "None")]
    pub notes: Option<String>,
    /// Reaction Annotations
    #[builder(default = "None")]
    pub annotation: Option<String>,
    /// Reaction Activity
    #[builder(default = "ReactionActivity::Active")]
    pub activity: ReactionActivity,
}

impl Reaction {
    /// Whether the reaction can carry flux
    pub fn is_active(&self) -> bool {
        self.activity == ReactionActivity::Active
    }

    /// Flux bounds seen by a solver, an inactive reaction is fixed at zero
    pub fn effective_bounds(&self) -> (f64, f64) {
        match self.activity {
            ReactionActivity::Active => (self.lower_bound, self.upper_bound),
            ReactionActivity::Inactive => (0f64, 0f64),
        }
    }
}

/// Whether a Reaction is active or inactive
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactionActivity {
    /// The Reaction is active and can carry flux
    Active,
    /// The Reaction is inactive and can't carry flux
    Inactive,
}

impl From<GeneActivity> for ReactionActivity {
    fn from(value: GeneActivity) -> Self {
        match value {
            GeneActivity::Active => ReactionActivity::Active,
            GeneActivity::Inactive => ReactionActivity::Inactive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_reaction_has_zero_bounds() {
        let mut reaction = ReactionBuilder::default()
            .id("PFK".to_string())
            .lower_bound(0.)
            .upper_bound(1000.)
            .build()
            .unwrap();
        assert_eq!(reaction.effective_bounds(), (0., 1000.));
        reaction.activity = GeneActivity::Inactive.into();
        assert!(!reaction.is_active());
        assert_eq!(reaction.effective_bounds(), (0., 0.));
    }

    #[test]
    fn builder_uses_configured_default_bounds() {
        let reaction = ReactionBuilder::default()
            .id("EX_glc__D_e".to_string())
            .build()
            .unwrap();
        let config = Configuration::current();
        assert_eq!(reaction.lower_bound, config.lower_bound);
        assert_eq!(reaction.upper_bound, config.upper_bound);
    }
}
