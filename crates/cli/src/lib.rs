use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod commands;

/// Canonicalize the root path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // Try to canonicalize; if it fails (e.g., path does not yet exist),
        // join it with the current dir to get an absolute path.
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Resolve `source` against `root` unless it is already absolute.
pub fn resolve_source(root: &Path, source: &Path) -> PathBuf {
    let joined = if source.is_absolute() { source.to_path_buf() } else { root.join(source) };
    joined.canonicalize().unwrap_or(joined)
}

/// Rewrite the legacy single-dash `-db <path>` / `-db=<path>` spelling to
/// `--db` so clap accepts it. Arguments after `--` are left untouched.
pub fn normalize_legacy_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    let mut out = Vec::new();
    let mut passthrough = false;
    for arg in args {
        let arg: OsString = arg.into();
        if passthrough {
            out.push(arg);
            continue;
        }
        match arg.to_str() {
            Some("--") => {
                passthrough = true;
                out.push(arg);
            }
            Some("-db") => out.push(OsString::from("--db")),
            Some(flag) if flag.starts_with("-db=") => {
                out.push(OsString::from(format!("-{flag}")));
            }
            _ => out.push(arg),
        }
    }
    out
}
