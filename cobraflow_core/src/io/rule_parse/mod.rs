//! Module for parsing boolean rules (Gene Protein Reaction rules and regulation rules) into
//! AST values

use std::convert::Infallible;
use std::fmt::{Display, Formatter};

use crate::io::rule_parse::lexer::LexerError;
use crate::io::rule_parse::parser::ParseError;
use crate::metabolic_model::gene::{Gene, GeneActivity};
use crate::metabolic_model::model::Gpr;
use indexmap::IndexMap;
use thiserror::Error;

mod lexer;
pub mod parser;
mod token;

/// Parse a boolean rule string into an expression tree
///
/// # Examples
/// ```rust
/// use cobraflow_core::io::rule_parse::parse_rule;
/// let rule = parse_rule("arcA and not o2_more_than").unwrap();
/// assert_eq!(rule.symbols(), vec!["arcA", "o2_more_than"]);
/// ```
pub fn parse_rule(input: &str) -> Result<Expr, RuleParseError> {
    let tokens = lexer::Lexer::new(input).lex()?;
    let expr = parser::RuleParser::new(tokens).parse()?;
    Ok(expr)
}

/// Parse a Gene Protein Reaction string into a GPR Tree
///
/// # Parameters
/// - `input`: &str representing the gene protein reaction rule
/// - `gene_map`: map of gene id strings to genes, genes referenced by the rule but missing from
///   the map are inserted as active genes
///
/// # Examples
/// ```rust
/// use indexmap::IndexMap;
/// use cobraflow_core::io::rule_parse::parse_gpr;
/// let gpr: &str = "Rv0001 and Rv0002";
/// let mut gene_map = IndexMap::new();
/// let gpr_tree = parse_gpr(gpr, &mut gene_map).unwrap();
/// assert_eq!(gene_map.len(), 2);
/// ```
pub fn parse_gpr(
    input: &str,
    gene_map: &mut IndexMap<String, Gene>,
) -> Result<Gpr, RuleParseError> {
    let gpr = parse_rule(input)?;
    for gene_id in gpr.symbols() {
        if !gene_map.contains_key(gene_id) {
            gene_map.insert(
                gene_id.to_string(),
                Gene::new(gene_id.to_string(), None, GeneActivity::Active, None, None),
            );
        }
    }
    Ok(gpr)
}

/// Enum representing possible lex and parse errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleParseError {
    /// Lexing Error
    #[error("Error occurred during lexing (conversion of rule string to tokens): {0}")]
    LexingError(#[from] LexerError),
    /// Parsing Error
    #[error("Error occurred during parsing (conversion of tokens to rule tree): {0}")]
    ParsingError(#[from] ParseError),
}

// region Expression AST
/// Boolean expression over named symbols
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Operation on one or two sub expressions (see [`Operation`])
    Operation(Operation),
    /// A terminal symbol, a gene id in a GPR, a gene name or threshold in a regulation rule
    Symbol(String),
}

/// Possible operations on sub expressions
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Or { left: Box<Expr>, right: Box<Expr> },
    And { left: Box<Expr>, right: Box<Expr> },
    Not { val: Box<Expr> },
}

/// Types of Allowed Operations
pub enum OperatorType {
    /// Or, true if either left or right is true
    Or,
    /// And, true if both left and right are true
    And,
    /// Not, true if val is false
    Not,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum OperatorError {
    #[error("Invalid Binary Operation")]
    InvalidBinaryOp,
    #[error("Invalid Unary Operation")]
    InvalidUnaryOp,
}

impl Expr {
    /// Create a new binary operation node
    pub fn new_binary_operation(
        left: Expr,
        operator: OperatorType,
        right: Expr,
    ) -> Result<Expr, OperatorError> {
        let op = match operator {
            OperatorType::Or => Operation::Or {
                left: Box::new(left),
                right: Box::new(right),
            },
            OperatorType::And => Operation::And {
                left: Box::new(left),
                right: Box::new(right),
            },
            OperatorType::Not => return Err(OperatorError::InvalidBinaryOp),
        };
        Ok(Expr::Operation(op))
    }

    /// Create a new unary operation node
    pub fn new_unary_operation(operator: OperatorType, operand: Expr) -> Result<Expr, OperatorError> {
        let op = match operator {
            OperatorType::Not => Operation::Not {
                val: Box::new(operand),
            },
            _ => return Err(OperatorError::InvalidUnaryOp),
        };
        Ok(Expr::Operation(op))
    }

    /// Create a new symbol node
    pub fn new_symbol(symbol: &str) -> Expr {
        Expr::Symbol(symbol.to_string())
    }

    /// Distinct symbols of the expression in order of first appearance
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols = Vec::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols<'a>(&'a self, symbols: &mut Vec<&'a str>) {
        match self {
            Expr::Operation(Operation::Or { left, right })
            | Expr::Operation(Operation::And { left, right }) => {
                left.collect_symbols(symbols);
                right.collect_symbols(symbols);
            }
            Expr::Operation(Operation::Not { val }) => val.collect_symbols(symbols),
            Expr::Symbol(s) => {
                if !symbols.contains(&s.as_str()) {
                    symbols.push(s);
                }
            }
        }
    }

    /// Evaluate the expression, resolving each symbol with `resolve`
    ///
    /// Both sides of a binary operation are always resolved, so `resolve` sees every symbol.
    pub fn try_eval<E, F>(&self, resolve: &mut F) -> Result<bool, E>
    where
        F: FnMut(&str) -> Result<bool, E>,
    {
        match self {
            Expr::Operation(op) => match op {
                Operation::Or { left, right } => {
                    let l = left.try_eval(resolve)?;
                    let r = right.try_eval(resolve)?;
                    Ok(l || r)
                }
                Operation::And { left, right } => {
                    let l = left.try_eval(resolve)?;
                    let r = right.try_eval(resolve)?;
                    Ok(l && r)
                }
                Operation::Not { val } => Ok(!val.try_eval(resolve)?),
            },
            Expr::Symbol(s) => resolve(s),
        }
    }

    /// Evaluate the expression with an infallible symbol resolver
    pub fn eval<F>(&self, mut resolve: F) -> bool
    where
        F: FnMut(&str) -> bool,
    {
        let result: Result<bool, Infallible> = self.try_eval(&mut |s| Ok(resolve(s)));
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Generate a rule string from the AST
    pub fn to_string_id(&self) -> String {
        match self {
            Expr::Operation(op) => match op {
                Operation::Or { left, right } => {
                    format!("({} or {})", left.to_string_id(), right.to_string_id())
                }
                Operation::And { left, right } => {
                    format!("({} and {})", left.to_string_id(), right.to_string_id())
                }
                Operation::Not { val } => {
                    format!("(not {})", val)
                }
            },
            Expr::Symbol(symbol) => symbol.to_string(),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_id())
    }
}
// endregion Expression AST
