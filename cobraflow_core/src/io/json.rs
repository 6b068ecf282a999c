//! Module providing JSON IO for Models, the JSON document is the snapshot format handed to
//! solver workers
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::io::rule_parse::{parse_gpr, RuleParseError};
use crate::metabolic_model::gene::{Gene, GeneActivity};
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::{ReactionActivity, ReactionBuilder, ReactionBuilderError};

// region JSON Model
/// Represents a JSON serialized model, used for reading and writing models in json format
#[derive(Serialize, Deserialize)]
struct JsonModel {
    metabolites: Vec<JsonMetabolite>,
    reactions: Vec<JsonReaction>,
    genes: Vec<JsonGene>,
    id: Option<String>,
    compartments: Option<IndexMap<String, String>>,
    version: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonMetabolite {
    id: String,
    name: Option<String>,
    compartment: Option<String>,
    charge: Option<i32>,
    formula: Option<String>,
    notes: Option<Value>,
    annotation: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct JsonReaction {
    id: String,
    name: Option<String>,
    metabolites: IndexMap<String, f64>,
    lower_bound: f64,
    upper_bound: f64,
    #[serde(default)]
    gene_reaction_rule: String,
    objective_coefficient: Option<f64>,
    subsystem: Option<String>,
    notes: Option<Value>,
    annotation: Option<Value>,
    /// Absent in documents written by other tools, which only describe functional reactions
    #[serde(default = "functional_default", skip_serializing_if = "is_functional")]
    functional: bool,
}

#[derive(Serialize, Deserialize)]
struct JsonGene {
    id: String,
    name: Option<String>,
    notes: Option<Value>,
    annotation: Option<Value>,
    #[serde(default = "functional_default", skip_serializing_if = "is_functional")]
    functional: bool,
}

fn functional_default() -> bool {
    true
}

fn is_functional(functional: &bool) -> bool {
    *functional
}
// endregion JSON Model

// region Conversions
/// Notes and annotations are kept as JSON strings, they are not structured enough to unpack
fn value_to_string(value: Option<Value>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn string_to_value(value: &Option<String>) -> Option<Value> {
    value
        .as_ref()
        .map(|s| serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())))
}

impl From<JsonGene> for Gene {
    fn from(g: JsonGene) -> Self {
        Self {
            id: g.id,
            name: g.name,
            activity: GeneActivity::from(g.functional),
            notes: value_to_string(g.notes),
            annotation: value_to_string(g.annotation),
        }
    }
}

impl From<JsonMetabolite> for Metabolite {
    fn from(m: JsonMetabolite) -> Self {
        Self {
            id: m.id,
            name: m.name,
            compartment: m.compartment,
            charge: m.charge.unwrap_or_default(),
            formula: m.formula,
            notes: value_to_string(m.notes),
            annotation: value_to_string(m.annotation),
        }
    }
}

impl From<&Gene> for JsonGene {
    fn from(g: &Gene) -> Self {
        Self {
            id: g.id.clone(),
            name: g.name.clone(),
            notes: string_to_value(&g.notes),
            annotation: string_to_value(&g.annotation),
            functional: g.is_active(),
        }
    }
}

impl From<&Metabolite> for JsonMetabolite {
    fn from(m: &Metabolite) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            compartment: m.compartment.clone(),
            charge: Some(m.charge),
            formula: m.formula.clone(),
            notes: string_to_value(&m.notes),
            annotation: string_to_value(&m.annotation),
        }
    }
}

impl Model {
    /// Read a model from a JSON document
    pub fn from_json_str(model_str: &str) -> Result<Model, JsonError> {
        let json_model = serde_json::from_str::<JsonModel>(model_str)
            .map_err(|err| JsonError::UnableToParse(err.to_string()))?;
        Model::from_json(json_model)
    }

    /// Write the model as a JSON document
    ///
    /// Knocked out reactions are written with both bounds at zero, so a solver reading the
    /// document does not need to evaluate GPRs.
    pub fn to_json_string(&self) -> Result<String, JsonError> {
        Ok(serde_json::to_string(&self.to_json())?)
    }

    fn from_json(json_model: JsonModel) -> Result<Self, JsonError> {
        let mut reactions = IndexMap::new();
        let mut genes: IndexMap<String, Gene> = IndexMap::new();
        let mut metabolites = IndexMap::new();
        let mut objective = IndexMap::new();
        // Start by converting the genes and metabolites using the From methods
        json_model.genes.into_iter().for_each(|g| {
            genes.insert(g.id.clone(), Gene::from(g));
        });
        json_model.metabolites.into_iter().for_each(|m| {
            metabolites.insert(m.id.clone(), Metabolite::from(m));
        });
        /* Now, iterate through the reactions, parsing GPRs, and adding to
        the objective along the way
        */
        for rxn in json_model.reactions {
            let gpr = if !rxn.gene_reaction_rule.trim().is_empty() {
                Some(parse_gpr(&rxn.gene_reaction_rule, &mut genes)?)
            } else {
                None
            };
            let activity = if rxn.functional {
                ReactionActivity::Active
            } else {
                ReactionActivity::Inactive
            };
            let new_reaction = ReactionBuilder::default()
                .id(rxn.id.clone())
                .metabolites(rxn.metabolites)
                .name(rxn.name)
                .gpr(gpr)
                .lower_bound(rxn.lower_bound)
                .upper_bound(rxn.upper_bound)
                .subsystem(rxn.subsystem)
                .notes(value_to_string(rxn.notes))
                .annotation(value_to_string(rxn.annotation))
                .activity(activity)
                .build()?;
            // Add the reaction to the objective function if desired
            if let Some(coef) = rxn.objective_coefficient.filter(|c| *c != 0.) {
                objective.insert(rxn.id.clone(), coef);
            }
            reactions.insert(rxn.id, new_reaction);
        }
        Ok(Model {
            reactions,
            genes,
            metabolites,
            objective,
            id: json_model.id,
            compartments: json_model.compartments,
            version: json_model.version,
        })
    }

    fn to_json(&self) -> JsonModel {
        let json_reactions = self
            .reactions
            .values()
            .map(|r| {
                let (lower_bound, upper_bound) = r.effective_bounds();
                JsonReaction {
                    id: r.id.clone(),
                    name: r.name.clone(),
                    metabolites: r.metabolites.clone(),
                    lower_bound,
                    upper_bound,
                    gene_reaction_rule: r
                        .gpr
                        .as_ref()
                        .map(|rule| rule.to_string_id())
                        .unwrap_or_default(),
                    objective_coefficient: self.objective.get(&r.id).copied(),
                    subsystem: r.subsystem.clone(),
                    notes: string_to_value(&r.notes),
                    annotation: string_to_value(&r.annotation),
                    functional: r.is_active(),
                }
            })
            .collect();

        JsonModel {
            metabolites: self.metabolites.values().map(JsonMetabolite::from).collect(),
            reactions: json_reactions,
            genes: self.genes.values().map(JsonGene::from).collect(),
            id: self.id.clone(),
            compartments: self.compartments.clone(),
            version: self.version.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum JsonError {
    #[error("Unable to parse a GPR rule during conversion from JSON")]
    GprParserError(#[from] RuleParseError),
    #[error("Unable to parse json due to {0}")]
    UnableToParse(String),
    #[error("Unable to build reaction")]
    UnableToBuildReaction(#[from] ReactionBuilderError),
    #[error("Serde json error")]
    SerdeJsonParseError(#[from] serde_json::Error),
}

// endregion Conversions
