//! kllc - Keyboard Layout Language compiler
//!
//! Reads `.kll` source files grouped by semantic role, merges them
//! under the KLL precedence rules, and emits firmware-ready artifacts.

use anyhow::Result;
use clap::Parser;
use kllc::constants::{COMPILER_VERSION, DEFAULT_EMITTER, DEFAULT_TARGET_DIR, KLL_VERSION};
use kllc::pipeline::{compile, CancelFlag, CompileRequest};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Keyboard Layout Language compiler
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Generic .kll files (lowest precedence)
    #[arg(value_name = "FILE")]
    generic: Vec<PathBuf>,

    /// Configuration .kll files
    #[arg(long = "config", value_name = "FILE", num_args = 1..)]
    config: Vec<PathBuf>,

    /// Base map .kll files, applied after configuration
    #[arg(long = "base", value_name = "FILE", num_args = 1..)]
    base: Vec<PathBuf>,

    /// Default layer .kll files, layered on top of the base map
    #[arg(long = "default", value_name = "FILE", num_args = 1..)]
    default: Vec<PathBuf>,

    /// Partial layer files; repeat the flag once per layer
    #[arg(long = "partial", value_name = "FILE", num_args = 1.., action = clap::ArgAction::Append, value_parser = clap::value_parser!(PathBuf))]
    partial: Vec<Vec<PathBuf>>,

    /// Final merge .kll files (highest precedence)
    #[arg(long = "merge", value_name = "FILE", num_args = 1..)]
    merge: Vec<PathBuf>,

    /// Emitter to run (kll, json, none)
    #[arg(long, value_name = "NAME", default_value = DEFAULT_EMITTER)]
    emitter: String,

    /// Output directory for emitted files
    #[arg(long = "target-dir", value_name = "DIR", default_value = DEFAULT_TARGET_DIR)]
    target_dir: PathBuf,

    /// Also write the JSON data dump to this path
    #[arg(long = "json-output", value_name = "FILE")]
    json_output: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: Cli) -> Result<i32> {
    let request = CompileRequest {
        generic_files: cli.generic,
        config_files: cli.config,
        base_files: cli.base,
        default_files: cli.default,
        partial_groups: cli.partial,
        merge_files: cli.merge,
        emitter: cli.emitter,
        target_dir: cli.target_dir,
        json_output: cli.json_output,
    };

    let cancel = CancelFlag::new();
    let output = compile(&request, &cancel)?;

    // Diagnostics print in file:line:col: kind: text form
    for diagnostic in output.diagnostics.iter() {
        eprintln!("{diagnostic}");
    }

    if output.diagnostics.has_errors() {
        eprintln!(
            "compilation failed: {} error(s), {} warning(s)",
            output.diagnostics.error_count(),
            output.diagnostics.warning_count()
        );
        return Ok(output.diagnostics.exit_code());
    }

    let (Some(merge), Some(final_data)) = (&output.merge, &output.final_data) else {
        eprintln!("internal error: pipeline produced no data without reporting an error");
        return Ok(2);
    };

    let written = kllc::pipeline::write_outputs(&request, merge, final_data)?;
    for path in &written {
        println!("{}", path.display());
    }

    Ok(0)
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "kllc=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        version = COMPILER_VERSION,
        kll = KLL_VERSION,
        "starting kllc"
    );

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    }
}
