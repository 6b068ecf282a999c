//! Static regulatory knowledge: one expression rule per regulated gene name

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::regulation::rule::RegulationRule;

/// A catalog row as published in the literature tables the catalog is built from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegulationEntry {
    /// Locus tag, e.g. `b1334`
    pub b_num: String,
    /// Gene name the rule applies to, e.g. `fnr`
    pub gene: String,
    /// Boolean expression deciding whether the gene stays expressed
    pub rule: String,
    #[serde(default)]
    pub reference: String,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Gene {0} has more than one regulation rule")]
    DuplicateGene(String),
    #[error("Unable to read catalog: {0}")]
    UnableToParse(#[from] serde_json::Error),
}

/// Regulation rules keyed by gene name
#[derive(Clone, Debug, Default)]
pub struct RegulationCatalog {
    rules: IndexMap<String, RegulationRule>,
}

impl RegulationCatalog {
    pub fn from_entries(entries: Vec<RegulationEntry>) -> Result<Self, CatalogError> {
        let mut rules = IndexMap::new();
        for entry in entries {
            if rules.contains_key(&entry.gene) {
                return Err(CatalogError::DuplicateGene(entry.gene));
            }
            let rule = RegulationRule::new(entry);
            if let Some(err) = rule.parse_error() {
                warn!(gene = %rule.entry().gene, rule = %rule.entry().rule, error = %err, "malformed regulation rule, gene will be treated as expressed");
            }
            rules.insert(rule.entry().gene.clone(), rule);
        }
        Ok(Self { rules })
    }

    /// Read a JSON array of [`RegulationEntry`]
    pub fn from_json_str(data: &str) -> Result<Self, CatalogError> {
        Self::from_entries(serde_json::from_str(data)?)
    }

    pub fn rule_for(&self, gene_name: &str) -> Option<&RegulationRule> {
        self.rules.get(gene_name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::CASCADE_CATALOG;

    #[test]
    fn load_from_json() {
        let catalog = RegulationCatalog::from_json_str(CASCADE_CATALOG).unwrap();
        assert_eq!(catalog.len(), 4);
        let fnr = catalog.rule_for("fnr").unwrap();
        assert_eq!(fnr.entry().b_num, "b1334");
        assert_eq!(fnr.entry().rule, "o2_less_than");
        assert!(catalog.rule_for("pfkA").is_none());
    }

    #[test]
    fn duplicate_genes_are_rejected() {
        let entry = RegulationEntry {
            b_num: "b1334".to_string(),
            gene: "fnr".to_string(),
            rule: "o2_less_than".to_string(),
            reference: String::new(),
        };
        let err = RegulationCatalog::from_entries(vec![entry.clone(), entry]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateGene(gene) if gene == "fnr"));
    }

    #[test]
    fn malformed_rules_are_kept() {
        let catalog = RegulationCatalog::from_json_str(
            r#"[{"b_num":"b4401","gene":"arcA","rule":"(fnr and"}]"#,
        )
        .unwrap();
        assert!(catalog.rule_for("arcA").unwrap().parse_error().is_some());
    }
}
