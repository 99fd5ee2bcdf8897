use crate::analysis::is_incomplete;
use crate::context::RunContext;
use crate::instrument::probe::render_stmts;
use crate::model::{CType, FunctionDecl, Probe, ProbeStmt, StorageClass, TypeKind};

/// Probes run on entry to one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntryPlan {
    pub function: String,
    pub params: Vec<ProbeStmt>,
    /// Only populated when `probe_globals` is enabled.
    pub globals: Vec<ProbeStmt>,
}

impl FunctionEntryPlan {
    pub fn render(&self, probe_fn: &str) -> String {
        let mut out = format!("// Check if arguments of {} are tainted\n", self.function);
        out.push_str(&render_stmts(probe_fn, &self.params));
        if !self.globals.is_empty() {
            out.push_str("// Check if global variables are tainted\n");
            out.push_str(&render_stmts(probe_fn, &self.globals));
        }
        out
    }
}

/// Plan the entry probes for `function`.
///
/// `register` parameters have no address and unnamed parameters cannot be
/// referenced, so both are skipped.
pub fn plan_entry(
    ctx: &mut RunContext,
    function: &FunctionDecl,
    file_key: &str,
) -> FunctionEntryPlan {
    let mut params = Vec::new();
    for param in &function.params {
        if param.storage == StorageClass::Register || param.name.is_empty() {
            continue;
        }
        params.extend(declaration_probes(ctx, &param.name, &param.ty, param.line, file_key));
    }

    let mut globals = Vec::new();
    if ctx.config.probe_globals {
        let vars = ctx.globals.clone();
        for var in &vars {
            if is_incomplete(&var.ty, &ctx.records) {
                continue;
            }
            globals.extend(declaration_probes(ctx, &var.name, &var.ty, var.line, file_key));
        }
    }

    FunctionEntryPlan { function: function.name.clone(), params, globals }
}

/// Entry text for `function`, ready to insert before its first statement.
pub fn build_entry_text(ctx: &mut RunContext, function: &FunctionDecl, file_key: &str) -> String {
    let plan = plan_entry(ctx, function, file_key);
    plan.render(&ctx.config.probe_function)
}

/// Base probe over `&(name)` plus, for pointers to complete object types, a
/// null-guarded probe over the pointee.
fn declaration_probes(
    ctx: &mut RunContext,
    name: &str,
    ty: &CType,
    line: u32,
    file_key: &str,
) -> Vec<ProbeStmt> {
    let file_id = ctx.symbol_id(file_key);
    let symbol_id = ctx.symbol_id(name);
    let mut out = vec![ProbeStmt::Probe(Probe {
        buffer: format!("&({name})"),
        size: format!("sizeof({name})"),
        file_id,
        symbol_id,
        line,
    })];

    if let Some(pointee) = ty.pointee() {
        let object_pointee = !matches!(pointee.kind, TypeKind::Function);
        if object_pointee && !is_incomplete(pointee, &ctx.records) {
            out.push(ProbeStmt::Guarded {
                condition: name.to_string(),
                probes: vec![Probe {
                    buffer: name.to_string(),
                    size: format!("sizeof({})", pointee.spelling),
                    file_id,
                    symbol_id,
                    line,
                }],
            });
        }
    }
    out
}
