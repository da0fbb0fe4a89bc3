//! The command-line compiler.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use regex::Regex;

use sequent::{compile_files, CompileError, Options};

/// Compile a correlation engine/production system to a schema.
#[derive(Debug, Parser)]
#[command(
    name = "sequent",
    version,
    about = "Compile a correlation engine/production system to a schema",
    after_help = "Available backends: sqlite"
)]
struct Cli {
    /// Rule file(s) to compile, merged left to right.
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Generate a schema using this backend.
    #[arg(
        short,
        long,
        value_name = "BACKEND",
        default_value = "sqlite",
        value_parser = ["sqlite"]
    )]
    backend: String,

    /// Allow cycles in the rule set.
    #[arg(short = 'c', long = "allow-cycles")]
    allow_cycles: bool,

    /// Allow the regexp operators in expressions.
    #[arg(short = 'r', long = "allow-regexp")]
    allow_regexp: bool,

    /// Prefix all generated database objects with this string.
    #[arg(short, long, default_value = "sequent")]
    prefix: String,

    /// Destination schema file; `-` writes to standard output.
    #[arg(short = 'o', long = "output-file", value_name = "OUTPUT", default_value = "-")]
    output: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    log::debug!("using backend '{}'", cli.backend);

    let prefix_pattern =
        Regex::new("(?i)^[A-Z][A-Za-z0-9]*$").expect("the prefix pattern is valid");
    if !prefix_pattern.is_match(&cli.prefix) {
        log::error!("Invalid prefix: {}", cli.prefix);
        return ExitCode::FAILURE;
    }

    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let options = Options {
        prefix: cli.prefix,
        allow_regexp: cli.allow_regexp,
        check_cycles: !cli.allow_cycles,
        timestamp: format!("{seconds} (unix)"),
    };

    let schema = match compile_files(&cli.files, &options) {
        Ok(schema) => schema,
        Err(failure @ CompileError::Load(_)) => {
            eprintln!("{failure}");
            return ExitCode::FAILURE;
        }
        // Every analysis error was already reported as it happened.
        Err(CompileError::Analysis(_)) => return ExitCode::FAILURE,
    };

    let written = if cli.output == "-" {
        std::io::stdout().write_all(schema.as_bytes())
    } else {
        std::fs::write(&cli.output, &schema)
    };

    if let Err(failure) = written {
        eprintln!("Compilation failed: {failure}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
