use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tern_core::ir::metadata::MetadataSet;
use tern_core::{Compiler, PassKind, PipelineOptions};
use thiserror::Error;

/// Lowering pass selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pass {
    /// Split aggregate copies into leaf copies
    SplitVarCopies,
    /// Replace indirect subroutine calls with if-ladders
    LowerSubroutines,
}

impl From<Pass> for PassKind {
    fn from(pass: Pass) -> Self {
        match pass {
            Pass::SplitVarCopies => PassKind::SplitVarCopies,
            Pass::LowerSubroutines => PassKind::LowerSubroutines,
        }
    }
}

/// Times the execution of a closure and prints the elapsed time if verbose.
fn time<T, F: FnOnce() -> T>(name: &str, verbose: bool, f: F) -> T {
    let start = Instant::now();
    let result = f();
    if verbose {
        let elapsed = start.elapsed().as_millis();
        eprintln!("{}: {}ms", name, elapsed);
    }
    result
}

#[derive(Parser)]
#[command(name = "tern")]
#[command(about = "Lowering passes for a structured shader IR", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the lowering pipeline over a textual IR file
    Lower {
        /// Input IR file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Passes to run, in order (repeatable; defaults to all passes)
        #[arg(short, long = "pass", value_name = "PASS")]
        passes: Vec<Pass>,

        /// Re-run the passes until none makes progress
        #[arg(long)]
        fixed_point: bool,

        /// Skip the IR verifier between passes
        #[arg(long)]
        no_verify: bool,

        /// Keep block index and dominance computed after every pass
        #[arg(long)]
        require_metadata: bool,

        /// Write the pipeline report as JSON
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Print verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Parse, resolve and verify an IR file without lowering it
    Check {
        /// Input IR file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Compilation error: {0}")]
    CompilationError(#[from] tern_core::error::CompilerError),

    #[error("Report serialization error: {0}")]
    ReportError(#[from] serde_json::Error),
}

fn main() -> Result<(), DriverError> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Lower {
            input,
            output,
            passes,
            fixed_point,
            no_verify,
            require_metadata,
            report,
            verbose,
        } => {
            let mut options = PipelineOptions {
                fixed_point,
                verify: !no_verify,
                ..PipelineOptions::default()
            };
            if !passes.is_empty() {
                options.passes = passes.into_iter().map(PassKind::from).collect();
            }
            if require_metadata {
                options.require_metadata = MetadataSet::ALL;
            }
            lower_file(input, output, &options, report, verbose)?;
        }
        Commands::Check { input, verbose } => {
            check_file(input, verbose)?;
        }
    }

    Ok(())
}

fn lower_file(
    input: PathBuf,
    output: Option<PathBuf>,
    options: &PipelineOptions,
    report_path: Option<PathBuf>,
    verbose: bool,
) -> Result<(), DriverError> {
    if verbose {
        info!("Lowering {}...", input.display());
    }

    let source = fs::read_to_string(&input)?;

    let parsed = time("parse", verbose, || Compiler::parse(&source))?;
    let resolved = time("resolve", verbose, || parsed.resolve())?;
    let resolved = time("verify", verbose, || resolved.verify())?;
    let lowered = time("lower", verbose, || resolved.lower(options))?;

    let text = lowered.to_text();
    match output {
        Some(ref path) => {
            fs::write(path, &text)?;
            if verbose {
                info!("Wrote lowered IR to {}", path.display());
            }
        }
        None => std::io::stdout().write_all(text.as_bytes())?,
    }

    if let Some(ref path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&lowered.report)?)?;
        if verbose {
            info!("Wrote pipeline report to {}", path.display());
        }
    }

    if verbose {
        info!(
            "{} pass runs over {} iteration(s), progress: {}",
            lowered.report.runs.len(),
            lowered.report.iterations,
            lowered.report.progress
        );
    }

    Ok(())
}

fn check_file(input: PathBuf, verbose: bool) -> Result<(), DriverError> {
    if verbose {
        info!("Checking {}...", input.display());
    }

    let source = fs::read_to_string(&input)?;
    let program = Compiler::parse(&source)?.resolve()?.verify()?.program;

    if verbose {
        info!(
            "{} is valid ({} functions, {} variables)",
            input.display(),
            program.functions.len(),
            program.variables.len()
        );
    }

    Ok(())
}
