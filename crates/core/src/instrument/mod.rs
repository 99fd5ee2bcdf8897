//! Instrumentation synthesis: the literal C text spliced into the source.
//!
//! - `probe`: rendering of oracle calls
//! - `entry`: per-function parameter probes
//! - `callsite`: attack-point and argument-taint wraps around calls

pub mod callsite;
pub mod entry;
pub mod probe;

pub use callsite::{build_call_edit, probes_for_expr, probes_for_lvalue, CallSiteEdit};
pub use entry::{build_entry_text, plan_entry, FunctionEntryPlan};
pub use probe::{render_probe, render_stmts};
