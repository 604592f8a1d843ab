//! The `yuri` surface syntax: a small `end`-terminated statement language.

pub mod lexer;
pub mod parser;

pub use parser::parse_program;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub message: String,
}
