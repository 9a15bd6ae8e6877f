use std::io::{self, Write};

/// Destination of `echo` output.
pub trait OutputSink {
    fn emit(&mut self, text: &str);

    /// Called when the interpreter is reset between runs.
    fn reset(&mut self) {}
}

/// Collects output in memory. Used by the test harness and by tests.
#[derive(Debug, Default, Clone)]
pub struct BufferedOutput {
    buffer: String,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Returns the collected output and clears the buffer.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

impl OutputSink for BufferedOutput {
    fn emit(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Writes straight to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutOutput;

impl OutputSink for StdoutOutput {
    fn emit(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        // A closed stdout (e.g. `| head`) is not a program error.
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}
