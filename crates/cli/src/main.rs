use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use taint_query::commands::{init_tracing, instrument_command, InstrumentArgs};
use taint_query::normalize_legacy_args;

/// Taint-query instrumentation CLI.
///
/// This CLI is a thin wrapper around `taint-query-core` (exposed in code as
/// `taint_query_core`). It rewrites one C source file so that it reports
/// tainted buffers and dangerous calls to the taint oracle at run time.
#[derive(Parser, Debug)]
#[command(
    name = "taint-query",
    version,
    about = "Instrument C sources with taint queries and attack-point markers",
    long_about = None
)]
struct Cli {
    /// C source file to instrument (relative paths resolve against --project-root).
    source: PathBuf,

    /// Symbol database file; created if missing. `-db` is accepted too.
    #[arg(long)]
    db: PathBuf,

    /// Directory the front end runs in and the base for a relative source path.
    ///
    /// Not a compilation-database build path: pass include paths and defines
    /// after `--` instead.
    #[arg(short = 'p', long, default_value = ".")]
    project_root: String,

    /// Replace the source file instead of writing to stdout.
    #[arg(long, default_value_t = false)]
    in_place: bool,

    /// YAML or JSON instrumentation config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for temporary variable names (reproducible output).
    #[arg(long)]
    seed: Option<u64>,

    /// Extra compiler arguments, after `--`.
    #[arg(last = true)]
    compiler_args: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(normalize_legacy_args(std::env::args_os()));
    init_tracing();

    instrument_command(&InstrumentArgs {
        source: cli.source,
        db: cli.db,
        project_root: cli.project_root,
        in_place: cli.in_place,
        config: cli.config,
        seed: cli.seed,
        compiler_args: cli.compiler_args,
    })
}
