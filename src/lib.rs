pub mod lexer;
pub mod ast;
pub mod parser;
pub mod runtime;
pub mod driver;
pub mod harness;
pub mod error;

pub use error::Error;
