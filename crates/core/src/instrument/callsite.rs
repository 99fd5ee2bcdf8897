//! Call-site wraps.
//!
//! A dangerous call `memcpy(d, s, n)` returning `void *` becomes
//!
//! ```text
//! ({void * T2 = ({vm_lava_attack_point(F, L, C);
//! void * T1 = memcpy(d, s, n); T1;});
//! vm_lava_query_buffer(&((d)), sizeof((d)), F, I, L);
//! ...
//! vm_lava_query_buffer(&(T2), sizeof(T2), F, J, L);
//! T2; })
//! ```
//!
//! The argument-taint wrap is always outermost, so the attack-point probe runs
//! immediately before the call and argument probes immediately after it. The
//! call text itself is never copied; wraps are pure insertions around it.

use crate::analysis::{
    can_measure_size, collect_lvalues, expand_struct_fields, Accessor, ProbeSite,
};
use crate::context::RunContext;
use crate::instrument::probe::{render_probe, render_stmts};
use crate::model::{CallExpr, Expr, Probe, ProbeStmt};

/// Text to insert before and after one call expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSiteEdit {
    pub before: String,
    pub after: String,
}

#[derive(Debug, Default)]
struct Wrap {
    before: String,
    after: String,
}

/// Build the edit for `call`, or `None` if it gets no instrumentation.
///
/// Indirect calls are never instrumented.
pub fn build_call_edit(
    ctx: &mut RunContext,
    call: &CallExpr,
    file_key: &str,
) -> Option<CallSiteEdit> {
    let callee = call.direct_callee()?;

    let attack = if ctx.config.policy.is_attack_point(callee) {
        tracing::info!(callee, line = call.range.line, "attack point");
        Some(attack_point_wrap(ctx, call, callee, file_key))
    } else {
        None
    };
    let taint = if ctx.config.wants_argument_taint(callee) {
        Some(argument_taint_wrap(ctx, call, file_key))
    } else {
        None
    };

    if attack.is_none() && taint.is_none() {
        return None;
    }
    let attack = attack.unwrap_or_default();
    let taint = taint.unwrap_or_default();
    Some(CallSiteEdit {
        before: taint.before + &attack.before,
        after: attack.after + &taint.after,
    })
}

fn attack_point_wrap(ctx: &mut RunContext, call: &CallExpr, callee: &str, file_key: &str) -> Wrap {
    let file_id = ctx.symbol_id(file_key);
    let callee_id = ctx.symbol_id(callee);
    let mut before = format!(
        "({{{}({}, {}, {});\n",
        ctx.config.attack_function, file_id, call.range.line, callee_id
    );
    let mut after = String::new();
    if call.has_return_value() {
        let tmp = ctx.fresh_temp_name();
        before.push_str(&format!("{} = ", call.return_type.declare(&tmp)));
        after.push_str(&format!("; {tmp}"));
    }
    after.push_str(";})");
    Wrap { before, after }
}

fn argument_taint_wrap(ctx: &mut RunContext, call: &CallExpr, file_key: &str) -> Wrap {
    let file_id = ctx.symbol_id(file_key);
    let site = ProbeSite { file_id, line: call.range.line };

    let mut before = "({".to_string();
    let tmp = call.has_return_value().then(|| ctx.fresh_temp_name());
    if let Some(tmp) = &tmp {
        before.push_str(&format!("{} = ", call.return_type.declare(tmp)));
    }

    let mut stmts = Vec::new();
    for arg in &call.args {
        stmts.extend(probes_for_expr(ctx, arg, site));
    }

    let mut after = "; \n".to_string();
    after.push_str(&render_stmts(&ctx.config.probe_function, &stmts));
    if let Some(tmp) = &tmp {
        let probe = Probe {
            buffer: format!("&({tmp})"),
            size: format!("sizeof({tmp})"),
            file_id,
            symbol_id: ctx.symbol_id(tmp),
            line: site.line,
        };
        after.push_str(&render_probe(&ctx.config.probe_function, &probe));
        after.push_str(&format!("{tmp}; "));
    }
    after.push_str("})");
    Wrap { before, after }
}

/// Probes for every measurable lvalue buried in `expr`.
pub fn probes_for_expr(ctx: &mut RunContext, expr: &Expr, site: ProbeSite) -> Vec<ProbeStmt> {
    let mut out = Vec::new();
    for lvalue in collect_lvalues(expr) {
        out.extend(probes_for_lvalue(ctx, lvalue, site));
    }
    out
}

/// Base probe for one lvalue, plus first-level member probes when it is a
/// struct (`.`) or a pointer to a struct (`->`, behind a null check).
pub fn probes_for_lvalue(ctx: &mut RunContext, lvalue: &Expr, site: ProbeSite) -> Vec<ProbeStmt> {
    if lvalue.text.is_empty() || !can_measure_size(lvalue, &ctx.records) {
        return Vec::new();
    }

    let name = format!("({})", lvalue.text);
    let mut out = vec![ProbeStmt::Probe(Probe {
        buffer: format!("&({name})"),
        size: format!("sizeof({name})"),
        file_id: site.file_id,
        symbol_id: ctx.symbol_id(&name),
        line: site.line,
    })];

    let reserved = &ctx.config.reserved_fields;
    if let Some(pointee) = lvalue.ty.pointee() {
        let record = pointee.struct_tag().and_then(|tag| ctx.records.get(tag));
        if let Some(record) = record {
            let probes = expand_struct_fields(
                &mut ctx.symbols,
                reserved,
                &name,
                record,
                Accessor::Arrow,
                site,
            );
            if !probes.is_empty() {
                out.push(ProbeStmt::Guarded { condition: name.clone(), probes });
            }
        }
    } else if let Some(record) = lvalue.ty.struct_tag().and_then(|tag| ctx.records.get(tag)) {
        let probes =
            expand_struct_fields(&mut ctx.symbols, reserved, &name, record, Accessor::Dot, site);
        out.extend(probes.into_iter().map(ProbeStmt::Probe));
    }
    out
}
