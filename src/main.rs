use std::path::PathBuf;
use std::process;
use std::sync::Once;

use clap::{Parser as ClapParser, Subcommand};

use phype::ast::Program;
use phype::driver::parse_source;
use phype::harness::{Harness, TestCase};
use phype::lexer::Lexer;
use phype::runtime::{Interpreter, StdoutOutput};

#[derive(ClapParser)]
#[command(name = "phype", version, about = "Interpreter for a small PHP-like scripting language")]
struct Cli {
    /// Log interpreter events to stderr (same as PHYPE_LOG=phype=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the token stream (debug)
    Tokenize {
        /// Path to script
        file: PathBuf,
    },
    /// Parse and print the program as JSON
    Parse {
        /// Path to script
        file: PathBuf,
    },
    /// Run a script, echoing to stdout
    Run {
        /// Path to script
        file: PathBuf,
        /// The file holds a JSON program (as printed by `parse`) instead of source
        #[arg(long)]
        ast: bool,
    },
    /// Run test scripts and check their assertEcho / assertFail comments
    Test {
        /// Script files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let exit_code = match cli.command {
        Commands::Tokenize { file } => cmd_tokenize(&file),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Run { file, ast } => cmd_run(&file, ast),
        Commands::Test { files } => cmd_test(&files),
    };
    process::exit(exit_code);
}

static TRACING_INIT: Once = Once::new();

/// Installs a stderr subscriber when PHYPE_LOG or RUST_LOG is set, or when
/// `--verbose` is given.
fn init_tracing(verbose: bool) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let directives = std::env::var("PHYPE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
            .or_else(|| verbose.then(|| "phype=debug".to_string()));
        if let Some(directives) = directives {
            let filter = EnvFilter::new(directives);
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(filter)
                .init();
        }
    });
}

const MAX_SOURCE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

fn read_source(path: &PathBuf) -> Result<(String, String), i32> {
    let filename = path.to_string_lossy().to_string();

    // Check file size before reading
    match std::fs::metadata(path) {
        Ok(meta) => {
            if meta.len() > MAX_SOURCE_SIZE {
                eprintln!(
                    "Error: file {} is too large ({} bytes, max {} bytes)",
                    filename,
                    meta.len(),
                    MAX_SOURCE_SIZE
                );
                return Err(1);
            }
        }
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            return Err(1);
        }
    }

    match std::fs::read_to_string(path) {
        Ok(source) => Ok((source, filename)),
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            Err(1)
        }
    }
}

fn load_program(path: &PathBuf, from_json: bool) -> Result<Program, i32> {
    let (source, filename) = read_source(path)?;

    if from_json {
        return Program::from_json(&source).map_err(|e| {
            eprintln!("Error: invalid program JSON in {}: {}", filename, e);
            1
        });
    }

    parse_source(&source, &filename).map_err(|e| {
        eprintln!("{}", e);
        1
    })
}

fn cmd_tokenize(path: &PathBuf) -> i32 {
    let (source, filename) = match read_source(path) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let tokens = match Lexer::new(&source, &filename).tokenize() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            return 1;
        }
    };

    for tok in &tokens {
        println!("{}", tok);
    }
    0
}

fn cmd_parse(path: &PathBuf) -> i32 {
    let program = match load_program(path, false) {
        Ok(p) => p,
        Err(code) => return code,
    };

    match program.to_json() {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: cannot serialize program: {}", e);
            1
        }
    }
}

fn cmd_run(path: &PathBuf, from_json: bool) -> i32 {
    let program = match load_program(path, from_json) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let mut interpreter = Interpreter::with_sink(StdoutOutput);
    match interpreter.run(&program) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Runtime error: {}", e);
            1
        }
    }
}

fn cmd_test(paths: &[PathBuf]) -> i32 {
    let mut cases = Vec::new();
    for path in paths {
        match TestCase::from_file(path) {
            Ok(case) => cases.push(case),
            Err(e) => {
                eprintln!("Error: cannot read file {}: {}", path.display(), e);
                return 1;
            }
        }
    }

    let mut harness = Harness::new();
    let reports = harness.run_all(&cases);
    let mut failures = 0;
    for report in &reports {
        if !report.passed() {
            failures += 1;
            println!("{}", report);
        }
    }
    println!("Testing done!");
    println!("{} passed, {} failed", reports.len() - failures, failures);

    if failures > 0 {
        1
    } else {
        0
    }
}
