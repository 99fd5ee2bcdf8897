use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use taint_query_core::config::{load_config, InstrumentConfig};
use taint_query_core::context::RunContext;
use taint_query_core::db::SymbolTable;
use taint_query_core::services::frontends::ClangJsonFrontend;
use taint_query_core::services::{flush_outputs, Driver, Frontend, FrontendRequest, OutputTarget};

use crate::{canonicalize_or_current, resolve_source};

/// Everything one instrumentation run needs from the command line.
#[derive(Debug, Clone)]
pub struct InstrumentArgs {
    pub source: PathBuf,
    pub db: PathBuf,
    pub project_root: String,
    pub in_place: bool,
    pub config: Option<PathBuf>,
    pub seed: Option<u64>,
    /// Forwarded to the front end verbatim.
    pub compiler_args: Vec<String>,
}

/// Instrument one source file and persist the updated symbol database.
pub fn instrument_command(args: &InstrumentArgs) -> Result<()> {
    let root = canonicalize_or_current(&args.project_root)?;
    let source = resolve_source(&root, &args.source);
    if !source.is_file() {
        return Err(anyhow!("Source file not found: {}", source.display()));
    }

    let config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => InstrumentConfig::default(),
    };
    let symbols = SymbolTable::load(&args.db)
        .with_context(|| format!("Failed to load symbol database {}", args.db.display()))?;
    tracing::debug!(db = %args.db.display(), symbols = symbols.len(), "loaded symbol database");

    let mut ctx = RunContext::new(config, symbols);
    if let Some(seed) = args.seed {
        ctx = ctx.with_seed(seed);
    }

    let text = fs::read(&source)
        .with_context(|| format!("Failed to read source {}", source.display()))?;

    let frontend = ClangJsonFrontend::from_env();
    let mut driver = Driver::new(ctx, &source);
    let request = FrontendRequest {
        source: &source,
        text: &text,
        project_root: &root,
        args: &args.compiler_args,
    };
    frontend.traverse(&request, &mut driver).with_context(|| {
        format!("{} front end failed on {}", frontend.name(), source.display())
    })?;

    let finished = driver
        .on_file_end(&text)
        .with_context(|| format!("Failed to patch {}", source.display()))?;

    let target =
        if args.in_place { OutputTarget::Path(source.clone()) } else { OutputTarget::Stdout };
    flush_outputs(&finished.output, &target, &finished.context.symbols, &args.db)
        .with_context(|| format!("Failed to write results for {}", source.display()))?;

    Ok(())
}
