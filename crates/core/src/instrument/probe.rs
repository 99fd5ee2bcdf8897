use crate::model::{Probe, ProbeStmt};

/// `probe_fn(buffer, size, file_id, symbol_id, line);\n`
pub fn render_probe(probe_fn: &str, probe: &Probe) -> String {
    format!(
        "{}({}, {}, {}, {}, {});\n",
        probe_fn, probe.buffer, probe.size, probe.file_id, probe.symbol_id, probe.line
    )
}

/// Render statements in order; guarded probes are indented four spaces.
pub fn render_stmts(probe_fn: &str, stmts: &[ProbeStmt]) -> String {
    let mut out = String::new();
    for stmt in stmts {
        match stmt {
            ProbeStmt::Probe(probe) => out.push_str(&render_probe(probe_fn, probe)),
            ProbeStmt::Guarded { condition, probes } => {
                out.push_str(&format!("if ({condition}) {{\n"));
                for probe in probes {
                    out.push_str("    ");
                    out.push_str(&render_probe(probe_fn, probe));
                }
                out.push_str("}\n");
            }
        }
    }
    out
}
