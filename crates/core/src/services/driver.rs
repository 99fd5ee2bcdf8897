use std::borrow::Cow;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::RunContext;
use crate::db::{write_atomically, DbError, SymbolTable};
use crate::instrument::{build_call_edit, build_entry_text};
use crate::model::{CallExpr, FunctionBody, FunctionDecl, RecordDecl, StorageClass, VarDecl};
use crate::patch::{header_directive, PatchEngine, PatchError, Placement};

/// Capability interface a front end drives while walking one translation unit.
///
/// Events arrive in visitation order (pre-order: an outer call before the calls
/// nested in its arguments). Each callback runs to completion before the next.
pub trait TraversalEvents {
    /// A struct/union definition from any file; needed to judge completeness
    /// and to expand members.
    fn on_record_decl(&mut self, _record: &RecordDecl) {}

    /// A file-scope variable declared in the primary file.
    fn on_global_var(&mut self, _var: &VarDecl) {}

    /// A function definition.
    fn on_function_decl(&mut self, function: &FunctionDecl);

    /// A call expression inside a function body.
    fn on_call_expr(&mut self, call: &CallExpr);
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Patched bytes for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutput {
    pub source: PathBuf,
    pub patched: Vec<u8>,
    /// Number of queued edits, excluding the header.
    pub edits: usize,
}

impl FileOutput {
    /// The patched buffer as text; bytes that are not UTF-8 are replaced.
    pub fn patched_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.patched)
    }
}

/// Result of closing a file: its output and the run state to persist.
#[derive(Debug)]
pub struct FinishedFile {
    pub output: FileOutput,
    pub context: RunContext,
}

/// Dispatches traversal events to the analyzer and synthesizer and queues the
/// resulting edits for one source file.
#[derive(Debug)]
pub struct Driver {
    ctx: RunContext,
    file: PathBuf,
    /// Symbol-table key of the file: its absolute path as text.
    file_key: String,
    patches: PatchEngine,
}

impl Driver {
    /// `file` should be absolute; its display form is the file's symbol key.
    pub fn new(ctx: RunContext, file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let file_key = file.display().to_string();
        Self { ctx, file, file_key, patches: PatchEngine::new() }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn pending_edits(&self) -> usize {
        self.patches.edit_count(&self.file)
    }

    /// End of traversal: apply every queued edit plus the header to `original`.
    ///
    /// Consumes the driver; on error nothing has been written anywhere.
    pub fn on_file_end(self, original: &[u8]) -> Result<FinishedFile, DriverError> {
        let header = header_directive(&self.ctx.config.header);
        let patched = self.patches.apply(&self.file, original, &header)?;
        let edits = self.patches.edit_count(&self.file);
        tracing::info!(
            file = %self.file.display(),
            edits,
            symbols = self.ctx.symbols.len(),
            "instrumented file"
        );
        Ok(FinishedFile {
            output: FileOutput { source: self.file, patched, edits },
            context: self.ctx,
        })
    }
}

impl TraversalEvents for Driver {
    fn on_record_decl(&mut self, record: &RecordDecl) {
        self.ctx.records.define(record.clone());
    }

    fn on_global_var(&mut self, var: &VarDecl) {
        if var.storage == StorageClass::Register || !var.range.is_rewritable() {
            return;
        }
        self.ctx.globals.push(var.clone());
    }

    fn on_function_decl(&mut self, function: &FunctionDecl) {
        if !function.range.is_rewritable() {
            return;
        }
        let first = match &function.body {
            FunctionBody::Compound { first_statement: Some(first) } => *first,
            FunctionBody::Compound { first_statement: None } | FunctionBody::Other => {
                tracing::debug!(
                    function = %function.name,
                    "no first statement; entry probes skipped"
                );
                return;
            }
        };
        if !first.is_rewritable() {
            tracing::debug!(
                function = %function.name,
                "first statement is not rewritable; entry probes skipped"
            );
            return;
        }
        let text = build_entry_text(&mut self.ctx, function, &self.file_key);
        self.patches.enqueue_indented(&self.file, first.begin, text, Placement::AfterExisting);
    }

    fn on_call_expr(&mut self, call: &CallExpr) {
        if !call.range.is_rewritable() {
            return;
        }
        let Some(edit) = build_call_edit(&mut self.ctx, call, &self.file_key) else {
            return;
        };
        tracing::debug!(
            callee = call.direct_callee().unwrap_or_default(),
            line = call.range.line,
            "wrapped call"
        );
        self.patches.enqueue_indented(
            &self.file,
            call.range.begin,
            edit.before,
            Placement::AfterExisting,
        );
        self.patches.enqueue(&self.file, call.range.end, edit.after, Placement::AfterExisting);
    }
}

/// Where patched source goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    /// Replace this file atomically (the source itself for in-place runs).
    Path(PathBuf),
}

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("Failed to write patched source to {target}: {source}")]
    Output {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("Patched source was written but saving the symbol database failed: {0}")]
    Database(#[source] DbError),
    #[error("Failed to write patched source to {target} ({output}) and to save the symbol database ({database})")]
    Both { target: String, output: io::Error, database: DbError },
}

/// Write the patched text, then persist the symbol table.
///
/// Both writes are always attempted; neither rolls back the other.
pub fn flush_outputs(
    output: &FileOutput,
    target: &OutputTarget,
    symbols: &SymbolTable,
    db_path: &Path,
) -> Result<(), FlushError> {
    let (target_name, written) = match target {
        OutputTarget::Stdout => {
            let mut stdout = io::stdout().lock();
            let written =
                stdout.write_all(&output.patched).and_then(|()| stdout.flush());
            ("<stdout>".to_string(), written)
        }
        OutputTarget::Path(path) => {
            (path.display().to_string(), write_atomically(path, &output.patched))
        }
    };
    let saved = symbols.save(db_path);

    match (written, saved) {
        (Ok(()), Ok(())) => {
            tracing::debug!(target = %target_name, db = %db_path.display(), "flushed outputs");
            Ok(())
        }
        (Err(source), Ok(())) => Err(FlushError::Output { target: target_name, source }),
        (Ok(()), Err(err)) => Err(FlushError::Database(err)),
        (Err(output), Err(database)) => {
            Err(FlushError::Both { target: target_name, output, database })
        }
    }
}
