use crate::io::rule_parse::token::Token;
use crate::io::rule_parse::{Expr, OperatorType};

use thiserror::Error;
/*
Rule Grammar:
expression -> or_expr
or_expr -> and_expr ( "OR" and_expr )* ;
and_expr -> unary ( "AND" unary )* ;
unary -> "NOT" unary | primary  ;
primary -> SYMBOL | "(" expression ")" ;

e.g. ( Gene1 AND Gene2) OR (Gene3 AND NOT Gene4)
     arcA AND NOT o2_more_than
 */

/// Recursive descent parser for GPRs and regulation rules
pub struct RuleParser {
    /// Vector of tokens from the rule string
    tokens: Vec<Token>,
    /// Current token being processed
    current: usize,
}

impl RuleParser {
    /// Create a new RuleParser, `tokens` must be terminated by [`Token::Eof`]
    pub fn new(tokens: Vec<Token>) -> RuleParser {
        RuleParser { tokens, current: 0 }
    }

    // region Parsing Functions

    /// Parse the token vector into an expression AST
    pub fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.or_expr()?;
        if !self.is_at_end() {
            // If entire expression has not been parsed, and error has occured
            return Err(ParseError::EarlyTermination);
        }
        Ok(expr)
    }

    /// Disjunction, binds loosest
    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.and_expr()?;

        while self.match_token(&[Token::Or]) {
            let right = self.and_expr()?;
            expr = Expr::new_binary_operation(expr, OperatorType::Or, right)
                .map_err(|_| ParseError::InvalidBinaryOperator)?;
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;

        while self.match_token(&[Token::And]) {
            let right = self.unary()?;
            expr = Expr::new_binary_operation(expr, OperatorType::And, right)
                .map_err(|_| ParseError::InvalidBinaryOperator)?;
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_token(&[Token::Not]) {
            let right = self.unary()?;
            return Expr::new_unary_operation(OperatorType::Not, right)
                .map_err(|_| ParseError::InvalidUnaryOperator);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        if let Some(identifier) = self.match_identifier() {
            return Ok(Expr::new_symbol(&identifier));
        }

        if self.match_token(&[Token::LeftParen]) {
            let expr = self.or_expr()?;
            self.consume(Token::RightParen, "Expect ')' after expression.")?;
            return Ok(expr);
        }

        Err(ParseError::ExpectedExpression)
    }

    // endregion Parsing Functions

    // region parsing helper functions

    /// Check whether the token at the current position matches one of the provided `tokens`,
    /// if it does advance [`self.current`] and return true, otherwise return false
    fn match_token(&mut self, tokens: &[Token]) -> bool {
        for t in tokens {
            if self.check(t) {
                self.advance();
                return true;
            }
        }
        false
    }

    /// Similar to [`match_token`], but for matching an identifier token. If the current
    /// token is an identifier return `Some(symbol)`, otherwise return None
    fn match_identifier(&mut self) -> Option<String> {
        if self.is_at_end() {
            return None;
        }
        if let Token::Identifier(id) = self.peek() {
            let id = id.clone();
            self.advance();
            return Some(id);
        }
        None
    }

    /// Check whether the current token matches the provided `token`
    fn check(&self, token: &Token) -> bool {
        if self.is_at_end() {
            return false;
        }
        self.peek() == token
    }

    /// Advance `self.current` one position unless at end of the token Vec, then return the
    /// previous token.
    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    /// Check whether the parser is at the end of the source Vec
    fn is_at_end(&self) -> bool {
        matches!(self.tokens.get(self.current), None | Some(Token::Eof))
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.current).unwrap_or(&Token::Eof)
    }

    fn previous(&self) -> &Token {
        self.tokens
            .get(self.current.saturating_sub(1))
            .unwrap_or(&Token::Eof)
    }

    /// Check whether the current token matches an input token, if it matches advance to the
    /// next token, and if it doesn't return an error. Used mainly for matching parenthesis.
    fn consume(&mut self, token: Token, msg: &str) -> Result<(), ParseError> {
        if self.check(&token) {
            self.advance();
            return Ok(());
        }

        Err(ParseError::MissingToken(msg.to_string()))
    }

    // endregion parsing helper functions
}

/// Enum representing possible parse errors
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ParseError {
    /// Token was expected to be a binary operator but was not
    #[error("Invalid binary operator encountered, expected only `and` and `or`")]
    InvalidBinaryOperator,
    /// Token was expected to be a unary operator but was not
    #[error("Invalid unary operator encountered, expected only `not`")]
    InvalidUnaryOperator,
    /// Missing expected token (e.g. a right parenthesis)
    #[error("Missing expected token: {0}")]
    MissingToken(String),
    /// No expression found when one was expected
    #[error("No expression found, check that the rule string is not empty")]
    ExpectedExpression,
    /// Expression was not completed when parsing terminated
    #[error("Parsing terminated early, check for a `not` between two identifiers/grouped expressions")]
    EarlyTermination,
}
