//! taint-query-core
//!
//! Core library for source-level instrumentation of C programs with taint
//! queries and attack-point markers.
//!
//! This crate defines the syntax-tree model, expression analysis, probe
//! synthesis, the symbol database, the patch engine, and the front-end
//! adapter that feeds them.
//!
//! The goal is to keep all substantive logic here so it is fully testable and
//! reusable from multiple frontends (CLI, build-system wrappers, etc.).

pub mod analysis;
pub mod config;
pub mod context;
pub mod db;
pub mod instrument;
pub mod model;
pub mod patch;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
