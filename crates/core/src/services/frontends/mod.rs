//! Front ends parse one translation unit and drive `TraversalEvents`.

#[cfg(feature = "clang-frontend")]
pub mod clang;

#[cfg(feature = "clang-frontend")]
pub use clang::{parse_qual_type, traverse_json, ClangJsonFrontend};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::services::driver::TraversalEvents;

/// One file to parse plus the compilation arguments for it.
#[derive(Debug, Clone, Copy)]
pub struct FrontendRequest<'a> {
    pub source: &'a Path,
    /// Contents of `source`; ranges handed to events index into this buffer.
    pub text: &'a [u8],
    /// Directory the compiler runs in (relative include paths resolve here).
    pub project_root: &'a Path,
    /// Extra compiler arguments (`-I`, `-D`, ...).
    pub args: &'a [String],
}

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Exit { program: String, status: String, stderr: String },
    #[error("Failed to parse syntax tree JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Trait implemented by parsers that can walk a C translation unit.
pub trait Frontend {
    fn name(&self) -> &'static str;

    /// Parse `request.source` and emit events in visitation order.
    fn traverse(
        &self,
        request: &FrontendRequest<'_>,
        events: &mut dyn TraversalEvents,
    ) -> Result<(), FrontendError>;
}
