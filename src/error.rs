use thiserror::Error;

use crate::lexer::LexerError;
use crate::parser::ParseError;
use crate::runtime::RuntimeError;

/// Any failure between source text and the end of a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Lexer error: {0}")]
    Lex(#[from] LexerError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl Error {
    pub fn runtime(&self) -> Option<&RuntimeError> {
        match self {
            Error::Runtime(e) => Some(e),
            _ => None,
        }
    }
}
