//! Persistent symbol database.
//!
//! Maps source-level strings (file paths, identifiers, lvalue texts) to small
//! integer IDs that stay stable across runs. The on-disk form is a plain text
//! listing, one `<id>\t<key>` record per line, with `\\`, `\t`, `\n` and `\r`
//! escaped inside keys.
//!
//! Concurrent runs against the same file race: the last `save` wins. Callers
//! must serialize runs or give each run its own database.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error type for symbol database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Writing (or atomically replacing) the database file failed.
    #[error("I/O error on symbol database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The database file exists but does not follow the listing format.
    #[error("Malformed symbol database {path} at line {line}: {reason}")]
    Malformed { path: PathBuf, line: usize, reason: String },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// String → ID table. IDs are assigned densely from zero in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    ids: HashMap<String, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from `path`.
    ///
    /// A missing, empty, or unreadable file yields an empty table; a file that
    /// reads fine but is malformed (including invalid UTF-8) is an error.
    pub fn load(path: &Path) -> DbResult<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "symbol database missing; starting empty");
                return Ok(Self::new());
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "symbol database unreadable; starting empty"
                );
                return Ok(Self::new());
            }
        };
        let body = String::from_utf8(bytes).map_err(|err| {
            let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
            DbError::Malformed {
                path: path.to_path_buf(),
                line: valid.iter().filter(|&&b| b == b'\n').count() + 1,
                reason: "invalid UTF-8".to_string(),
            }
        })?;
        Self::parse(&body).map_err(|(line, reason)| DbError::Malformed {
            path: path.to_path_buf(),
            line,
            reason,
        })
    }

    /// Parse the listing format. Errors carry the 1-based line number.
    fn parse(body: &str) -> Result<Self, (usize, String)> {
        let mut ids = HashMap::new();
        let mut seen_ids = HashMap::new();
        let mut records = 0usize;
        for (idx, raw) in body.lines().enumerate() {
            let lineno = idx + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let (id_text, key_text) =
                raw.split_once('\t').ok_or_else(|| (lineno, "missing tab separator".to_string()))?;
            let id: u32 = id_text
                .trim()
                .parse()
                .map_err(|_| (lineno, format!("invalid id `{}`", id_text.trim())))?;
            let key = unescape_key(key_text).map_err(|reason| (lineno, reason))?;
            if let Some(prev) = seen_ids.insert(id, lineno) {
                return Err((lineno, format!("id {id} already used on line {prev}")));
            }
            if ids.insert(key.clone(), id).is_some() {
                return Err((lineno, format!("duplicate key `{key}`")));
            }
            records += 1;
        }
        // Dense ids keep `len()` a safe next id.
        if let Some((id, lineno)) = seen_ids.iter().find(|(id, _)| **id as usize >= records) {
            return Err((*lineno, format!("id {id} out of range for {records} records")));
        }
        Ok(Self { ids })
    }

    /// Return the id for `key`, assigning the next free one on first sight.
    pub fn get_or_insert(&mut self, key: &str) -> u32 {
        if let Some(&id) = self.ids.get(key) {
            return id;
        }
        let id = self.ids.len() as u32;
        self.ids.insert(key.to_string(), id);
        id
    }

    pub fn get(&self, key: &str) -> Option<u32> {
        self.ids.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All `(id, key)` pairs ordered by id.
    pub fn entries(&self) -> Vec<(u32, &str)> {
        let mut entries: Vec<(u32, &str)> =
            self.ids.iter().map(|(key, &id)| (id, key.as_str())).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Render the listing format.
    pub fn to_listing(&self) -> String {
        let mut out = String::new();
        for (id, key) in self.entries() {
            out.push_str(&id.to_string());
            out.push('\t');
            out.push_str(&escape_key(key));
            out.push('\n');
        }
        out
    }

    /// Persist the table to `path`, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        write_atomically(path, self.to_listing().as_bytes())
            .map_err(|source| DbError::Io { path: path.to_path_buf(), source })
    }
}

/// Write `contents` to a temp file next to `path`, then rename it over `path`.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    // Temp files are created 0600; keep the mode of the file being replaced.
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_key(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(format!("unknown escape `\\{other}`")),
            None => return Err("dangling escape at end of key".to_string()),
        }
    }
    Ok(out)
}
