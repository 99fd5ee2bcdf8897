//! Patch engine: queued insertions applied to the original buffer in one pass.
//!
//! Edits are pure insertions keyed by byte offset. The original buffer is
//! never touched until `apply`, which builds a fresh buffer. Sources are
//! handled as raw bytes, so files in legacy encodings pass through unchanged.
//! Edits that share
//! an offset keep their enqueue order, which is what keeps nested call wraps
//! well formed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("Edit offset {offset} is past the end of {path} ({len} bytes)")]
    OutOfBounds { path: PathBuf, offset: usize, len: usize },
}

/// How an edit combines with text already queued at the same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// After previously queued text (clang `InsertText(..., InsertAfter=true)`).
    AfterExisting,
    /// Ahead of previously queued text.
    BeforeExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEdit {
    pub offset: usize,
    pub text: String,
    pub placement: Placement,
    /// Re-indent new lines to match the line the offset sits on.
    pub indent_new_lines: bool,
}

/// Ordered edits for one file.
#[derive(Debug, Clone, Default)]
pub struct PatchSet {
    edits: Vec<PatchEdit>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, offset: usize, text: impl Into<String>, placement: Placement) {
        self.edits.push(PatchEdit {
            offset,
            text: text.into(),
            placement,
            indent_new_lines: false,
        });
    }

    /// Like `enqueue`, but every newline in `text` is followed by the
    /// indentation of the line containing `offset`.
    pub fn enqueue_indented(
        &mut self,
        offset: usize,
        text: impl Into<String>,
        placement: Placement,
    ) {
        self.edits.push(PatchEdit { offset, text: text.into(), placement, indent_new_lines: true });
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn edits(&self) -> &[PatchEdit] {
        &self.edits
    }

    /// Apply every edit to `original`, then put `header` at the very top.
    ///
    /// Fails without producing output if any offset is invalid.
    pub fn apply(&self, path: &Path, original: &[u8], header: &str) -> Result<Vec<u8>, PatchError> {
        let mut slots: BTreeMap<usize, String> = BTreeMap::new();
        for edit in &self.edits {
            if edit.offset > original.len() {
                return Err(PatchError::OutOfBounds {
                    path: path.to_path_buf(),
                    offset: edit.offset,
                    len: original.len(),
                });
            }
            let text = if edit.indent_new_lines {
                indent_new_lines(&edit.text, line_indent(original, edit.offset))
            } else {
                edit.text.clone()
            };
            let slot = slots.entry(edit.offset).or_default();
            match edit.placement {
                Placement::AfterExisting => slot.push_str(&text),
                Placement::BeforeExisting => slot.insert_str(0, &text),
            }
        }
        slots.entry(0).or_default().insert_str(0, header);

        let inserted: usize = slots.values().map(String::len).sum();
        let mut out = Vec::with_capacity(original.len() + inserted);
        let mut cursor = 0;
        for (offset, text) in &slots {
            out.extend_from_slice(&original[cursor..*offset]);
            out.extend_from_slice(text.as_bytes());
            cursor = *offset;
        }
        out.extend_from_slice(&original[cursor..]);
        Ok(out)
    }
}

/// Per-file patch sets for one run.
#[derive(Debug, Clone, Default)]
pub struct PatchEngine {
    files: BTreeMap<PathBuf, PatchSet>,
}

impl PatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(
        &mut self,
        file: &Path,
        offset: usize,
        text: impl Into<String>,
        placement: Placement,
    ) {
        self.files.entry(file.to_path_buf()).or_default().enqueue(offset, text, placement);
    }

    pub fn enqueue_indented(
        &mut self,
        file: &Path,
        offset: usize,
        text: impl Into<String>,
        placement: Placement,
    ) {
        self.files.entry(file.to_path_buf()).or_default().enqueue_indented(offset, text, placement);
    }

    pub fn patch_set(&self, file: &Path) -> Option<&PatchSet> {
        self.files.get(file)
    }

    pub fn edit_count(&self, file: &Path) -> usize {
        self.files.get(file).map_or(0, PatchSet::len)
    }

    /// Apply the edits queued for `file`; a file with no edits still gets the header.
    pub fn apply(
        &self,
        file: &Path,
        original: &[u8],
        header: &str,
    ) -> Result<Vec<u8>, PatchError> {
        match self.files.get(file) {
            Some(set) => set.apply(file, original, header),
            None => PatchSet::new().apply(file, original, header),
        }
    }
}

/// `#include "<header>"` line inserted at the top of every output.
pub fn header_directive(header: &str) -> String {
    format!("#include \"{header}\"\n")
}

/// Leading blanks of the line containing `offset`.
fn line_indent(buffer: &[u8], offset: usize) -> &str {
    let line_start = buffer[..offset].iter().rposition(|&b| b == b'\n').map_or(0, |idx| idx + 1);
    let width = buffer[line_start..].iter().take_while(|&&b| b == b' ' || b == b'\t').count();
    // Blanks are ASCII, so this slice is always valid UTF-8.
    std::str::from_utf8(&buffer[line_start..line_start + width]).unwrap_or_default()
}

fn indent_new_lines(text: &str, indent: &str) -> String {
    if indent.is_empty() || !text.contains('\n') {
        return text.to_string();
    }
    text.replace('\n', &format!("\n{indent}"))
}
