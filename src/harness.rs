//! Script test harness.
//!
//! A test script declares what it expects in a line comment:
//!
//! ```text
//! <? echo 'hi'; // assertEcho 'hi'
//! <? undefined(); // assertFail
//! ```
//!
//! Each script runs on a reset interpreter; its output (or failure) is
//! compared against the assertion.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::driver::run_source;
use crate::runtime::{BufferedOutput, Interpreter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// The script must print exactly this.
    Echo(String),
    /// The script must fail to lex, parse or run.
    Fail,
}

fn assertion_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r#"//\s*(?:assertEcho\s+(?:'(?P<single>[^']*)'|"(?P<double>[^"]*)")|(?P<fail>assertFail)\b)"#,
            )
            .ok()
        })
        .as_ref()
}

impl Assertion {
    /// The last assertion comment in `source`, if any.
    pub fn from_source(source: &str) -> Option<Self> {
        assertion_pattern()?
            .captures_iter(source)
            .last()
            .map(|caps| {
                if caps.name("fail").is_some() {
                    return Assertion::Fail;
                }
                let text = caps
                    .name("single")
                    .or_else(|| caps.name("double"))
                    .map_or("", |m| m.as_str());
                Assertion::Echo(text.to_string())
            })
    }
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub source: String,
}

impl TestCase {
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
        }
    }

    /// Named after the file stem.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let source = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self { name, source })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// The script carries no assertion; it ran without being checked.
    Unchecked,
    Mismatch { expected: String, actual: String },
    /// Expected to fail but ran to completion.
    DidNotFail,
    /// Expected output, but the script failed.
    Errored { error: String },
}

#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub output: String,
    pub error: Option<String>,
    pub verdict: Verdict,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        matches!(self.verdict, Verdict::Passed | Verdict::Unchecked)
    }
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.verdict {
            Verdict::Passed => write!(f, "\"{}\" passed.", self.name),
            Verdict::Unchecked => write!(f, "\"{}\" has no assertion.", self.name),
            Verdict::Mismatch { expected, actual } => write!(
                f,
                "\"{}\" failed assertion. Expected output: \"{}\". Actual output: \"{}\".",
                self.name, expected, actual
            ),
            Verdict::DidNotFail => write!(
                f,
                "\"{}\" failed assertion. Expected script to fail, but no exceptions were raised.",
                self.name
            ),
            Verdict::Errored { error } => {
                write!(f, "\"{}\" raised an error: {}", self.name, error)
            }
        }
    }
}

/// Runs test scripts one after another on a single interpreter that is reset
/// before each script.
#[derive(Default)]
pub struct Harness {
    interpreter: Interpreter<BufferedOutput>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_case(&mut self, case: &TestCase) -> CaseReport {
        self.interpreter.reset();
        let assertion = Assertion::from_source(&case.source);
        let result = run_source(&mut self.interpreter, &case.source, &case.name);
        let output = self.interpreter.sink_mut().take();
        let error = result.err().map(|e| e.to_string());

        let verdict = match (assertion, &error) {
            (None, _) => Verdict::Unchecked,
            (Some(Assertion::Fail), Some(_)) => Verdict::Passed,
            (Some(Assertion::Fail), None) => Verdict::DidNotFail,
            (Some(Assertion::Echo(expected)), _) if expected != output => Verdict::Mismatch {
                expected,
                actual: output.clone(),
            },
            (Some(Assertion::Echo(_)), Some(error)) => Verdict::Errored {
                error: error.clone(),
            },
            (Some(Assertion::Echo(_)), None) => Verdict::Passed,
        };
        debug!(case = %case.name, ?verdict, "test case finished");

        CaseReport {
            name: case.name.clone(),
            output,
            error,
            verdict,
        }
    }

    pub fn run_all(&mut self, cases: &[TestCase]) -> Vec<CaseReport> {
        let reports: Vec<CaseReport> = cases.iter().map(|case| self.run_case(case)).collect();
        let failed = reports.iter().filter(|r| !r.passed()).count();
        info!(cases = reports.len(), failed, "testing done");
        reports
    }
}
