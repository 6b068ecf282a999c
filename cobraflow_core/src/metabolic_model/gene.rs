//! This module provides the Gene struct, representing a gene in a metabolic network
use std::fmt::{Display, Formatter};
use std::hash::Hash;

use derive_builder::Builder;

/// Structure Representing a Gene
#[derive(Builder, Clone, Debug, Eq, PartialEq)]
pub struct Gene {
    /// Used to identify the gene, the identifier scheme is specific to the owning model
    pub id: String,
    /// Human Readable Gene Name, shared across models and used to look up regulation rules
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Whether this gene is currently active (see [`GeneActivity`])
    #[builder(default = "GeneActivity::Active")]
    pub activity: GeneActivity,
    /// Notes about the gene
    #[builder(default = "None")]
    pub notes: Option<String>,
    /// Gene Annotations
    #[builder(default = "None")]
    pub annotation: Option<String>,
}

impl Gene {
    pub fn new(
        id: String,
        name: Option<String>,
        activity: GeneActivity,
        notes: Option<String>,
        annotation: Option<String>,
    ) -> Gene {
        Gene {
            id,
            name,
            activity,
            notes,
            annotation,
        }
    }

    /// Whether the gene has not been knocked out
    pub fn is_active(&self) -> bool {
        self.activity == GeneActivity::Active
    }

    /// Mark the gene as knocked out, returns false if it already was
    pub fn knock_out(&mut self) -> bool {
        let was_active = self.is_active();
        self.activity = GeneActivity::Inactive;
        was_active
    }
}

impl Display for Gene {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Hash for Gene {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.activity.hash(state);
    }
}

/// Whether a gene is active or not
#[derive(Clone, Debug, Hash, Eq, PartialEq, Copy)]
pub enum GeneActivity {
    /// Gene is considered active
    Active,
    /// Gene is considered inactive (knocked out)
    Inactive,
}

impl From<bool> for GeneActivity {
    fn from(active: bool) -> Self {
        if active {
            GeneActivity::Active
        } else {
            GeneActivity::Inactive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_active() {
        let gene = GeneBuilder::default()
            .id("b0001".to_string())
            .name(Some("thrL".to_string()))
            .build()
            .unwrap();
        assert!(gene.is_active());
        assert_eq!(format!("{}", gene), "b0001");
    }

    #[test]
    fn knock_out_reports_first_change_only() {
        let mut gene = Gene::new("b0001".to_string(), None, GeneActivity::Active, None, None);
        assert!(gene.knock_out());
        assert!(!gene.knock_out());
        assert_eq!(gene.activity, GeneActivity::Inactive);
    }
}
