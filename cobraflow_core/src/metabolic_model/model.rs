//! This module provides the Model struct for representing an entire metabolic model
use crate::io::rule_parse::Expr;
use crate::metabolic_model::gene::{Gene, GeneActivity};
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::reaction::{Reaction, ReactionActivity};

use indexmap::IndexMap;
use thiserror::Error;

/// Represents a Genome Scale Metabolic Model
#[derive(Clone, Debug)]
pub struct Model {
    /// Map of reaction ids to Reaction Objects
    pub reactions: IndexMap<String, Reaction>,
    /// Map of gene ids to Gene Objects
    pub genes: IndexMap<String, Gene>,
    /// Map of metabolite ids to Metabolite Objects
    pub metabolites: IndexMap<String, Metabolite>,
    /// Map of reaction ids to objective function coefficients
    pub objective: IndexMap<String, f64>,
    /// Id associated with the Model
    pub id: Option<String>,
    /// Compartments in the model
    ///
    /// An IndexMap<String, String> of {short name: long name}
    pub compartments: Option<IndexMap<String, String>>,
    /// A version identifier for the Model, stored as a string
    pub version: Option<String>,
}

impl Model {
    pub fn new_empty() -> Self {
        Model {
            reactions: IndexMap::new(),
            genes: IndexMap::new(),
            metabolites: IndexMap::new(),
            objective: IndexMap::new(),
            id: None,
            compartments: None,
            version: None,
        }
    }

    /// Add a reaction to the model
    ///
    /// # Parameters
    /// - reaction: Reaction to add
    ///
    /// # Examples
    /// ```rust
    /// use cobraflow_core::metabolic_model::model::Model;
    /// use cobraflow_core::metabolic_model::reaction::{Reaction, ReactionBuilder};
    /// let mut model = Model::new_empty();
    /// let new_reaction = ReactionBuilder::default().id("new_reaction".to_string()).build().unwrap();
    /// model.add_reaction(new_reaction);
    /// ```
    pub fn add_reaction(&mut self, reaction: Reaction) {
        let id = reaction.id.clone();
        self.reactions.insert(id, reaction);
    }

    /// Add a gene to the model
    ///
    /// # Examples
    /// ```rust
    /// use cobraflow_core::metabolic_model::gene::GeneBuilder;
    /// use cobraflow_core::metabolic_model::model::Model;
    /// let mut model=Model::new_empty();
    /// let new_gene = GeneBuilder::default().id("new_gene".to_string()).build().unwrap();
    /// model.add_gene(new_gene);
    /// ```
    pub fn add_gene(&mut self, gene: Gene) {
        let id = gene.id.clone();
        self.genes.insert(id, gene);
    }

    /// Add a metabolite to the model
    pub fn add_metabolite(&mut self, metabolite: Metabolite) {
        let id = metabolite.id.clone();
        self.metabolites.insert(id, metabolite);
    }

    // region Gene lookup
    /// Identifier of the gene called `name` in this model
    ///
    /// Gene identifiers are scoped to the model, two models can use different ids for genes
    /// sharing a name.
    pub fn gene_id_by_name(&self, name: &str) -> Option<&str> {
        self.genes
            .values()
            .find(|g| g.name.as_deref() == Some(name))
            .map(|g| g.id.as_str())
    }

    /// Whether the gene called `name` exists in the model and has not been knocked out
    pub fn is_gene_expressed(&self, name: &str) -> bool {
        self.gene_id_by_name(name)
            .and_then(|id| self.genes.get(id))
            .is_some_and(Gene::is_active)
    }

    /// Ids of genes which have been knocked out
    pub fn knocked_out_genes(&self) -> Vec<String> {
        self.genes
            .values()
            .filter(|g| !g.is_active())
            .map(|g| g.id.clone())
            .collect()
    }
    // endregion Gene lookup

    // region Gene deletion
    /// Knock out genes by id, deactivating every reaction whose GPR no longer evaluates to
    /// active
    ///
    /// Knockouts accumulate, reactions deactivated earlier stay inactive. Genes already knocked
    /// out are not reported again.
    pub fn knock_out_genes<I, S>(&mut self, gene_ids: I) -> Result<KnockoutReport, GprError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let gene_ids: Vec<String> = gene_ids
            .into_iter()
            .map(|id| AsRef::<str>::as_ref(&id).to_string())
            .collect();
        // Check every id first so a bad id leaves the model untouched
        if let Some(missing) = gene_ids.iter().find(|id| !self.genes.contains_key(*id)) {
            return Err(GprError::GeneNotFound(missing.clone()));
        }
        let mut report = KnockoutReport::default();
        for id in &gene_ids {
            if let Some(gene) = self.genes.get_mut(id) {
                if gene.knock_out() {
                    report.genes.push(gene.id.clone());
                }
            }
        }
        if !report.genes.is_empty() {
            report.reactions = self.deactivate_blocked_reactions();
        }
        Ok(report)
    }

    /// Deactivate active reactions whose GPR evaluates to inactive, returning their ids
    fn deactivate_blocked_reactions(&mut self) -> Vec<String> {
        let blocked: Vec<String> = self
            .reactions
            .values()
            .filter(|r| r.is_active())
            .filter_map(|r| r.gpr.as_ref().map(|gpr| (r, gpr)))
            // A GPR naming genes the model does not know about can't be decided, keep it
            .filter(|(_, gpr)| matches!(self.eval_gpr(gpr), Ok(GeneActivity::Inactive)))
            .map(|(r, _)| r.id.clone())
            .collect();
        for id in &blocked {
            if let Some(reaction) = self.reactions.get_mut(id) {
                reaction.activity = ReactionActivity::Inactive;
            }
        }
        blocked
    }
    // endregion Gene deletion
}

/// Genes and reactions newly deactivated by a knockout
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KnockoutReport {
    pub genes: Vec<String>,
    pub reactions: Vec<String>,
}

// region GPR Functionality
/// Representation of a Gene Protein Reaction Rule as an AST, symbols are gene ids
pub type Gpr = Expr;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum GprError {
    #[error("Gene {0} is not present in the model")]
    GeneNotFound(String),
}

// Model associated functions for working with GPRs
impl Model {
    /// Evaluate whether a GPR evaluates to Active or Inactive
    pub fn eval_gpr(&self, gpr: &Gpr) -> Result<GeneActivity, GprError> {
        let active = gpr.try_eval(&mut |gene| match self.genes.get(gene) {
            Some(g) => Ok(g.is_active()),
            None => Err(GprError::GeneNotFound(gene.to_string())),
        })?;
        Ok(GeneActivity::from(active))
    }
}

// endregion GPR Functionality
