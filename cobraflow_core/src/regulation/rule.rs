//! Parsed regulation rules and resolution of their tokens
//!
//! A rule token is either a gene name or a threshold predicate on the shadow price of a
//! metabolite: `<name>_less_than` holds when the price of `<name><suffix>` is negative,
//! `<name>_more_than` when it is positive.

use crate::io::rule_parse::{parse_rule, Expr, RuleParseError};
use crate::metabolic_model::model::Model;
use crate::regulation::catalog::RegulationEntry;
use crate::regulation::ShadowPriceTable;

const LESS_THAN: &str = "_less_than";
const MORE_THAN: &str = "_more_than";

/// What a rule token refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleToken<'a> {
    /// True iff the named gene is present and not knocked out
    Gene(&'a str),
    /// True iff the shadow price of the named metabolite is negative
    LessThan(&'a str),
    /// True iff the shadow price of the named metabolite is positive
    MoreThan(&'a str),
}

impl<'a> RuleToken<'a> {
    pub fn classify(symbol: &'a str) -> Self {
        if let Some(name) = symbol.strip_suffix(LESS_THAN).filter(|n| !n.is_empty()) {
            RuleToken::LessThan(name)
        } else if let Some(name) = symbol.strip_suffix(MORE_THAN).filter(|n| !n.is_empty()) {
            RuleToken::MoreThan(name)
        } else {
            RuleToken::Gene(symbol)
        }
    }

    /// Truth value of the token, a missing shadow price is false
    pub fn resolve(&self, model: &Model, prices: &ShadowPriceTable, compartment_suffix: &str) -> bool {
        match self {
            RuleToken::Gene(name) => model.is_gene_expressed(name),
            RuleToken::LessThan(name) => prices
                .get(&format!("{name}{compartment_suffix}"))
                .is_some_and(|price| price < 0.0),
            RuleToken::MoreThan(name) => prices
                .get(&format!("{name}{compartment_suffix}"))
                .is_some_and(|price| price > 0.0),
        }
    }
}

/// Catalog entry together with its parsed expression
#[derive(Clone, Debug)]
pub struct RegulationRule {
    entry: RegulationEntry,
    expr: Result<Expr, RuleParseError>,
}

impl RegulationRule {
    pub fn new(entry: RegulationEntry) -> Self {
        let expr = parse_rule(&entry.rule);
        Self { entry, expr }
    }

    pub fn entry(&self) -> &RegulationEntry {
        &self.entry
    }

    pub fn parse_error(&self) -> Option<&RuleParseError> {
        self.expr.as_ref().err()
    }

    /// Whether the regulated gene stays expressed
    ///
    /// A rule that failed to parse always allows expression.
    pub fn allows_expression(
        &self,
        model: &Model,
        prices: &ShadowPriceTable,
        compartment_suffix: &str,
    ) -> bool {
        match &self.expr {
            Ok(expr) => expr.eval(|symbol| {
                RuleToken::classify(symbol).resolve(model, prices, compartment_suffix)
            }),
            Err(_) => true,
        }
    }
}
