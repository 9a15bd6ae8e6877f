//! Glue from source text to a finished run.

use crate::ast::Program;
use crate::error::Error;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::runtime::{BufferedOutput, Interpreter, OutputSink};

pub fn parse_source(source: &str, filename: &str) -> Result<Program, Error> {
    let tokens = Lexer::new(source, filename).tokenize()?;
    Ok(Parser::new(tokens, filename).parse()?)
}

/// Parses `source` and runs it on `interpreter`. State left by earlier runs
/// is kept; call `reset` first for a clean slate.
pub fn run_source<S: OutputSink>(
    interpreter: &mut Interpreter<S>,
    source: &str,
    filename: &str,
) -> Result<(), Error> {
    let program = parse_source(source, filename)?;
    interpreter.run(&program)?;
    Ok(())
}

/// Runs `source` on a fresh interpreter and returns everything it echoed.
pub fn interpret(source: &str) -> Result<String, Error> {
    let mut interpreter = Interpreter::new();
    run_source(&mut interpreter, source, "<input>")?;
    Ok(interpreter.into_sink().take())
}

/// Like [`interpret`], but hands back the output produced before a failure
/// along with the error.
pub fn interpret_partial(source: &str) -> (String, Option<Error>) {
    let mut interpreter: Interpreter<BufferedOutput> = Interpreter::new();
    let result = run_source(&mut interpreter, source, "<input>");
    (interpreter.into_sink().take(), result.err())
}
