//! Module for reading and writing Models and boolean rules
pub mod json;
pub mod rule_parse;
