//! Lex a rule string into a series of tokens for later parsing

use thiserror::Error;

use crate::io::rule_parse::token::Token;

pub struct Lexer {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
        }
    }

    /// Consume the lexer, returning the tokens terminated by [`Token::Eof`]
    pub fn lex(mut self) -> Result<Vec<Token>, LexerError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }

        self.tokens.push(Token::Eof);
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let c: char = self.advance();
        match c {
            // Single Character Tokens
            '(' => self.add_token(Token::LeftParen),
            ')' => self.add_token(Token::RightParen),
            // Identifiers and Operators
            c if Lexer::is_identifier_start(c) => self.read_identifier(),
            // Whitespace
            ' ' | '\r' | '\n' | '\t' => {}
            _ => {
                return Err(LexerError::InvalidToken {
                    character: c,
                    position: self.start,
                })
            }
        };
        Ok(())
    }

    fn advance(&mut self) -> char {
        let char_at_current = self.source[self.current];
        self.current += 1;
        char_at_current
    }

    fn read_identifier(&mut self) {
        while Lexer::is_identifier_part(self.peek()) {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();

        match text.as_str() {
            "and" | "And" | "AND" => self.add_token(Token::And),
            "or" | "Or" | "OR" => self.add_token(Token::Or),
            "not" | "Not" | "NOT" => self.add_token(Token::Not),
            symbol => self.add_token(Token::Identifier(symbol.to_string())),
        }
    }

    fn is_identifier_start(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    /// Locus tags and versioned gene ids may contain `.` and `-` after the first character
    fn is_identifier_part(c: char) -> bool {
        Lexer::is_identifier_start(c) || c == '.' || c == '-'
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            return '\0';
        }
        self.source[self.current]
    }

    fn add_token(&mut self, token: Token) {
        self.tokens.push(token);
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum LexerError {
    #[error("Invalid character `{character}` at position {position}")]
    InvalidToken { character: char, position: usize },
}

#[cfg(test)]
mod tests {
    use crate::io::rule_parse::lexer::{Lexer, LexerError};
    use crate::io::rule_parse::token::Token;

    #[test]
    fn test_single_gene() {
        let tokens = Lexer::new("Rv0023").lex().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], Token::Identifier(String::from("Rv0023")));
    }

    #[test]
    fn test_grouping() {
        let tokens = Lexer::new("(Rv0023 or Rv0123)").lex().unwrap();
        let expected_tokens = vec![
            Token::LeftParen,
            Token::Identifier(String::from("Rv0023")),
            Token::Or,
            Token::Identifier(String::from("Rv0123")),
            Token::RightParen,
            Token::Eof,
        ];
        assert_eq!(tokens, expected_tokens);
    }

    #[test]
    fn test_regulation_tokens() {
        let tokens = Lexer::new("NOT o2_more_than AND arcA").lex().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Not,
                Token::Identifier("o2_more_than".to_string()),
                Token::And,
                Token::Identifier("arcA".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_invalid_character() {
        let err = Lexer::new("arcA & fnr").lex().unwrap_err();
        assert_eq!(
            err,
            LexerError::InvalidToken {
                character: '&',
                position: 5
            }
        );
    }
}
