//! Front end backed by clang's JSON AST dump.
//!
//! Shells out to `clang -Xclang -ast-dump=json -fsyntax-only` and walks the
//! resulting tree. A few quirks of the dump shape the code below:
//! - `file` and `line` are omitted from a location when they match the
//!   previously printed one, so they are restored in dump order before walking
//! - macro locations carry nested `spellingLoc`/`expansionLoc` objects
//! - the first location in an included file carries `includedFrom`
//!
//! Tests can bypass clang entirely by pointing `TAINT_QUERY_FAKE_AST` at a
//! saved dump.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::model::{
    ArraySize, CType, CallExpr, CastKind, DeclTarget, Expr, ExprKind, FieldDecl, FunctionBody,
    FunctionDecl, Origin, ParamDecl, RecordDecl, RecordKind, SourceRange, StorageClass, TypeKind,
    VarDecl,
};
use crate::services::driver::TraversalEvents;
use crate::services::frontends::{Frontend, FrontendError, FrontendRequest};

const QUALIFIERS: &[&str] =
    &["const", "volatile", "restrict", "__restrict", "__restrict__", "_Atomic"];

/// Clang JSON front end.
#[derive(Debug, Clone)]
pub struct ClangJsonFrontend {
    clang: PathBuf,
    fake_ast: Option<PathBuf>,
}

impl ClangJsonFrontend {
    pub fn new(clang: impl Into<PathBuf>) -> Self {
        Self { clang: clang.into(), fake_ast: None }
    }

    /// Honors `TAINT_QUERY_CLANG` (compiler binary, default `clang`) and
    /// `TAINT_QUERY_FAKE_AST` (read this dump instead of running clang).
    pub fn from_env() -> Self {
        let clang = std::env::var_os("TAINT_QUERY_CLANG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("clang"));
        let fake_ast = std::env::var_os("TAINT_QUERY_FAKE_AST").map(PathBuf::from);
        Self { clang, fake_ast }
    }

    pub fn with_fake_ast(mut self, path: impl Into<PathBuf>) -> Self {
        self.fake_ast = Some(path.into());
        self
    }

    fn dump_ast(&self, request: &FrontendRequest<'_>) -> Result<String, FrontendError> {
        let program = self.clang.display().to_string();
        tracing::debug!(
            clang = %program,
            source = %request.source.display(),
            args = ?request.args,
            "dumping AST"
        );
        let output = Command::new(&self.clang)
            .current_dir(request.project_root)
            .args(["-Xclang", "-ast-dump=json", "-fsyntax-only"])
            .args(request.args)
            .arg(request.source)
            .output()
            .map_err(|source| FrontendError::Spawn { program: program.clone(), source })?;
        if !output.status.success() {
            return Err(FrontendError::Exit {
                program,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for ClangJsonFrontend {
    fn default() -> Self {
        Self::new("clang")
    }
}

impl Frontend for ClangJsonFrontend {
    fn name(&self) -> &'static str {
        "clang"
    }

    fn traverse(
        &self,
        request: &FrontendRequest<'_>,
        events: &mut dyn TraversalEvents,
    ) -> Result<(), FrontendError> {
        let json = match &self.fake_ast {
            Some(path) => fs::read_to_string(path)
                .map_err(|source| FrontendError::Read { path: path.clone(), source })?,
            None => self.dump_ast(request)?,
        };
        traverse_json(&json, request.text, events)
    }
}

/// Walk a clang JSON dump of the translation unit whose primary file is `text`.
pub fn traverse_json(
    json: &str,
    text: &[u8],
    events: &mut dyn TraversalEvents,
) -> Result<(), FrontendError> {
    let mut de = serde_json::Deserializer::from_str(json);
    de.disable_recursion_limit();
    let mut root = ClangNode::deserialize(&mut de)?;
    de.end()?;

    LocTracker::default().resolve(&mut root);

    let mut walker = Walker { text, events, storage: HashMap::new(), functions: 0, calls: 0 };
    for decl in &root.inner {
        walker.top_level(decl);
    }
    tracing::debug!(functions = walker.functions, calls = walker.calls, "walked translation unit");
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ClangNode {
    id: String,
    kind: String,
    loc: Option<ClangLoc>,
    range: Option<ClangRange>,
    name: Option<String>,
    #[serde(rename = "type")]
    ty: Option<ClangType>,
    value_category: Option<String>,
    storage_class: Option<String>,
    is_implicit: bool,
    complete_definition: bool,
    tag_used: Option<String>,
    is_bitfield: bool,
    referenced_decl: Option<Box<ClangNode>>,
    inner: Vec<ClangNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ClangLoc {
    offset: Option<usize>,
    file: Option<String>,
    line: Option<u32>,
    col: Option<u32>,
    tok_len: Option<usize>,
    included_from: Option<IgnoredAny>,
    spelling_loc: Option<Box<ClangLoc>>,
    expansion_loc: Option<Box<ClangLoc>>,
    /// Whether `file` is an included file; restored by `LocTracker`.
    #[serde(skip)]
    included: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClangRange {
    begin: ClangLoc,
    end: ClangLoc,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ClangType {
    qual_type: String,
    desugared_qual_type: Option<String>,
}

impl ClangLoc {
    fn is_macro(&self) -> bool {
        self.spelling_loc.is_some() || self.expansion_loc.is_some()
    }

    /// Location the user sees: the expansion point for macro locations.
    fn presumed(&self) -> &ClangLoc {
        match &self.expansion_loc {
            Some(expansion) => expansion.presumed(),
            None => self,
        }
    }

    fn origin(&self) -> Origin {
        if self.is_macro() {
            return Origin::Macro;
        }
        match (&self.offset, &self.file) {
            (Some(_), Some(file)) if !self.included && !file.starts_with('<') => Origin::MainFile,
            _ => Origin::OtherFile,
        }
    }

    fn line(&self) -> u32 {
        self.presumed().line.unwrap_or(0)
    }
}

/// Restores the `file`/`line` fields clang elides, in dump order.
#[derive(Debug, Default)]
struct LocTracker {
    file: Option<String>,
    line: u32,
    included: bool,
}

impl LocTracker {
    fn resolve(&mut self, node: &mut ClangNode) {
        if let Some(loc) = node.loc.as_mut() {
            self.fill(loc);
        }
        if let Some(range) = node.range.as_mut() {
            self.fill(&mut range.begin);
            self.fill(&mut range.end);
        }
        for child in &mut node.inner {
            self.resolve(child);
        }
    }

    fn fill(&mut self, loc: &mut ClangLoc) {
        if loc.is_macro() {
            if let Some(spelling) = loc.spelling_loc.as_deref_mut() {
                self.fill(spelling);
            }
            if let Some(expansion) = loc.expansion_loc.as_deref_mut() {
                self.fill(expansion);
            }
            return;
        }
        // `{}`: invalid location, never printed anything.
        if loc.offset.is_none() {
            return;
        }
        match &loc.file {
            Some(file) => {
                self.file = Some(file.clone());
                self.included = loc.included_from.is_some();
            }
            None => loc.file = self.file.clone(),
        }
        loc.included = self.included;
        match loc.line {
            Some(line) => self.line = line,
            None => loc.line = Some(self.line),
        }
    }
}

struct Walker<'t, 'e> {
    text: &'t [u8],
    events: &'e mut dyn TraversalEvents,
    /// Storage class of every variable/parameter seen so far, by node id.
    storage: HashMap<String, StorageClass>,
    functions: usize,
    calls: usize,
}

impl Walker<'_, '_> {
    fn top_level(&mut self, node: &ClangNode) {
        match node.kind.as_str() {
            "RecordDecl" => self.record(node),
            "VarDecl" => {
                self.remember_storage(node);
                let range = loc_range(node.loc.as_ref());
                if range.is_rewritable() {
                    let var = VarDecl {
                        name: node.name.clone().unwrap_or_default(),
                        ty: node_type(node),
                        storage: storage_of(node),
                        line: range.line,
                        range,
                    };
                    self.events.on_global_var(&var);
                }
            }
            "FunctionDecl" => self.function(node),
            "LinkageSpecDecl" => {
                for child in &node.inner {
                    self.top_level(child);
                }
            }
            _ => {}
        }
    }

    fn remember_storage(&mut self, node: &ClangNode) {
        if !node.id.is_empty() {
            self.storage.insert(node.id.clone(), storage_of(node));
        }
    }

    fn record(&mut self, node: &ClangNode) {
        for nested in node.inner.iter().filter(|child| child.kind == "RecordDecl") {
            self.record(nested);
        }
        if !node.complete_definition {
            return;
        }
        let tag = match node.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match node.loc.as_ref().and_then(anonymous_record_key) {
                Some(key) => key,
                None => return,
            },
        };
        let kind = match node.tag_used.as_deref() {
            Some("union") => RecordKind::Union,
            _ => RecordKind::Struct,
        };
        let fields = node
            .inner
            .iter()
            .filter(|child| child.kind == "FieldDecl")
            .map(|field| FieldDecl {
                name: field.name.clone().unwrap_or_default(),
                ty: node_type(field),
                is_bit_field: field.is_bitfield,
            })
            .collect();
        self.events.on_record_decl(&RecordDecl { tag, kind, fields });
    }

    fn function(&mut self, node: &ClangNode) {
        let params: Vec<&ClangNode> =
            node.inner.iter().filter(|child| child.kind == "ParmVarDecl").collect();
        for param in &params {
            self.remember_storage(param);
        }
        if node.is_implicit {
            return;
        }
        // Prototypes have no body.
        let Some(body) = node.inner.iter().rev().find(|child| child.kind == "CompoundStmt") else {
            return;
        };
        let range = loc_range(node.loc.as_ref());
        if !range.is_rewritable() {
            return;
        }

        let function = FunctionDecl {
            name: node.name.clone().unwrap_or_default(),
            params: params
                .iter()
                .map(|param| ParamDecl {
                    name: param.name.clone().unwrap_or_default(),
                    ty: node_type(param),
                    storage: storage_of(param),
                    line: param.loc.as_ref().map_or(range.line, ClangLoc::line),
                })
                .collect(),
            body: FunctionBody::Compound {
                first_statement: body.inner.first().map(node_range),
            },
            range,
        };
        self.events.on_function_decl(&function);
        self.functions += 1;
        self.statement(body);
    }

    /// Pre-order walk of a statement subtree.
    fn statement(&mut self, node: &ClangNode) {
        match node.kind.as_str() {
            "RecordDecl" => {
                self.record(node);
                return;
            }
            "VarDecl" => self.remember_storage(node),
            "CallExpr" => {
                if let Some(call) = self.call(node) {
                    self.events.on_call_expr(&call);
                    self.calls += 1;
                }
            }
            _ => {}
        }
        for child in &node.inner {
            self.statement(child);
        }
    }

    fn call(&self, node: &ClangNode) -> Option<CallExpr> {
        let (callee, args) = node.inner.split_first()?;
        Some(CallExpr::new(
            self.expr(callee),
            args.iter().map(|arg| self.expr(arg)).collect(),
            node_type(node),
            node_range(node),
        ))
    }

    fn expr(&self, node: &ClangNode) -> Expr {
        let range = node_range(node);
        let mut text = self.source_text(&range);

        let kind = match node.kind.as_str() {
            "DeclRefExpr" => {
                let decl = node.referenced_decl.as_deref();
                let name = decl.and_then(|d| d.name.clone()).unwrap_or_default();
                let target = match decl.map(|d| d.kind.as_str()) {
                    Some("VarDecl" | "ParmVarDecl") => DeclTarget::Variable {
                        storage: decl
                            .and_then(|d| self.storage.get(&d.id))
                            .copied()
                            .unwrap_or_default(),
                    },
                    Some("FunctionDecl") => DeclTarget::Function,
                    _ => DeclTarget::Other,
                };
                if text.is_empty() {
                    text = name.clone();
                }
                ExprKind::DeclRef { name, target }
            }
            "StringLiteral" => ExprKind::StringLiteral,
            // Declarations inside a statement expression are out of scope after it.
            "StmtExpr" => ExprKind::Leaf,
            "ImplicitCastExpr" | "CStyleCastExpr" if !node.inner.is_empty() => {
                let kind = if node.kind == "ImplicitCastExpr" {
                    CastKind::Implicit
                } else {
                    CastKind::Explicit
                };
                ExprKind::Cast { kind, operand: Box::new(self.expr(&node.inner[0])) }
            }
            "CallExpr" => match self.call(node) {
                Some(call) => ExprKind::Call(call),
                None => ExprKind::Leaf,
            },
            _ if node.inner.is_empty() => ExprKind::Leaf,
            _ => ExprKind::Compound {
                node: node.kind.clone(),
                children: node
                    .inner
                    .iter()
                    .filter(|child| is_expression_kind(&child.kind))
                    .map(|child| self.expr(child))
                    .collect(),
            },
        };

        let is_lvalue =
            node.kind != "StmtExpr" && node.value_category.as_deref() == Some("lvalue");
        Expr {
            kind,
            ty: node_type(node),
            is_lvalue,
            text,
            range,
        }
    }

    /// Whitespace-normalized source text; empty outside the primary file.
    fn source_text(&self, range: &SourceRange) -> String {
        if !range.is_rewritable() {
            return String::new();
        }
        self.text
            .get(range.begin..range.end)
            .map(|slice| {
                String::from_utf8_lossy(slice).split_whitespace().collect::<Vec<_>>().join(" ")
            })
            .unwrap_or_default()
    }
}

/// Clang node kinds that denote expressions (`*Expr`, `*Operator`, `*Literal`).
fn is_expression_kind(kind: &str) -> bool {
    kind.ends_with("Expr") || kind.ends_with("Operator") || kind.ends_with("Literal")
}

fn storage_of(node: &ClangNode) -> StorageClass {
    node.storage_class.as_deref().map(StorageClass::from_spelling).unwrap_or_default()
}

fn node_type(node: &ClangNode) -> CType {
    match &node.ty {
        Some(ty) => parse_qual_type(&ty.qual_type, ty.desugared_qual_type.as_deref()),
        None => CType::void(),
    }
}

/// Range of a single token (a declaration's name).
fn loc_range(loc: Option<&ClangLoc>) -> SourceRange {
    let Some(loc) = loc else {
        return SourceRange::foreign(Origin::OtherFile, 0);
    };
    match (loc.origin(), loc.offset) {
        (Origin::MainFile, Some(offset)) => SourceRange::main_file(
            offset,
            offset + loc.tok_len.unwrap_or(0),
            loc.line.unwrap_or(0),
        ),
        (origin, _) => SourceRange::foreign(origin, loc.line()),
    }
}

fn node_range(node: &ClangNode) -> SourceRange {
    let Some(range) = &node.range else {
        return SourceRange::foreign(Origin::OtherFile, 0);
    };
    let (begin, end) = (&range.begin, &range.end);
    let origin = match (begin.origin(), end.origin()) {
        (Origin::MainFile, Origin::MainFile) => match (begin.offset, end.offset) {
            (Some(start), Some(last)) => {
                return SourceRange::main_file(
                    start,
                    last + end.tok_len.unwrap_or(0),
                    begin.line.unwrap_or(0),
                );
            }
            _ => Origin::OtherFile,
        },
        (Origin::MainFile, other) | (other, _) => other,
    };
    SourceRange::foreign(origin, begin.line())
}

/// Key clang uses when printing an anonymous record type: `file:line:col`.
fn anonymous_record_key(loc: &ClangLoc) -> Option<String> {
    let loc = loc.presumed();
    Some(format!("{}:{}:{}", loc.file.as_deref()?, loc.line?, loc.col?))
}

/// Parse a clang `qualType` (and its `desugaredQualType`, if any) into a `CType`.
///
/// The structural kind comes from the desugared spelling; the returned
/// spelling, and pointee spellings where derivable, keep the sugar.
pub fn parse_qual_type(qual_type: &str, desugared: Option<&str>) -> CType {
    let canonical = strip_qualifiers(desugared.unwrap_or(qual_type));
    parse_shape(&canonical, qual_type.trim())
}

fn parse_shape(canonical: &str, spelling: &str) -> CType {
    let canonical = canonical.trim();

    if let Some((pointee_canonical, pointee_spelling)) = split_declarator_group(canonical, spelling)
    {
        let pointee = parse_shape(&pointee_canonical, &pointee_spelling);
        return CType::new(spelling, TypeKind::Pointer(Box::new(pointee)));
    }

    if let Some(pointee_canonical) = canonical.strip_suffix('*') {
        let pointee_canonical = pointee_canonical.trim_end();
        let pointee_spelling = pointer_pointee_spelling(spelling).unwrap_or(pointee_canonical);
        let pointee = parse_shape(pointee_canonical, pointee_spelling);
        return CType::new(spelling, TypeKind::Pointer(Box::new(pointee)));
    }

    if canonical.ends_with(']') {
        if let Some(open) = canonical.rfind('[') {
            let element_canonical = canonical[..open].trim_end();
            let size = match canonical[open + 1..canonical.len() - 1].trim() {
                "" => ArraySize::Unspecified,
                n => n.parse().map(ArraySize::Fixed).unwrap_or(ArraySize::Variable),
            };
            let element_spelling = spelling
                .strip_suffix(']')
                .and_then(|s| s.rfind('[').map(|idx| s[..idx].trim_end()))
                .unwrap_or(element_canonical);
            let element = parse_shape(element_canonical, element_spelling);
            return CType::new(spelling, TypeKind::Array { element: Box::new(element), size });
        }
    }

    for (keyword, kind) in [("struct ", RecordKind::Struct), ("union ", RecordKind::Union)] {
        if let Some(tag) = canonical.strip_prefix(keyword) {
            let tag = record_tag(tag.trim());
            return CType::new(spelling, TypeKind::Record { kind, tag });
        }
    }

    let kind = match canonical {
        "void" => TypeKind::Void,
        "nullptr_t" | "std::nullptr_t" => TypeKind::NullPtr,
        _ if canonical.ends_with(')') => TypeKind::Function,
        _ => TypeKind::Scalar,
    };
    CType::new(spelling, kind)
}

/// `R (*)(A)` / `T (*)[N]`: split off one pointer level from a parenthesized
/// declarator. Returns the pointee's canonical and sugared spellings.
fn split_declarator_group(canonical: &str, spelling: &str) -> Option<(String, String)> {
    let pointee_canonical = drop_pointer_level(canonical)?;
    let pointee_spelling =
        drop_pointer_level(spelling).unwrap_or_else(|| pointee_canonical.clone());
    Some((pointee_canonical, pointee_spelling))
}

fn drop_pointer_level(spelling: &str) -> Option<String> {
    let start = spelling.find("(*")?;
    // Only the outermost declarator; `int (int (*)(void))` is a function type.
    if spelling.find('(') != Some(start) {
        return None;
    }
    let stars = spelling[start + 1..].chars().take_while(|c| *c == '*').count();
    let close = start + 1 + stars;
    if !spelling[close..].starts_with(')') {
        return None;
    }
    let head = spelling[..start].trim_end();
    let tail = &spelling[close + 1..];
    Some(if stars == 1 {
        format!("{head} {tail}")
    } else {
        format!("{head} ({}){tail}", "*".repeat(stars - 1))
    })
}

/// `T *const` -> `T`; `None` if the spelling is not a plain pointer.
fn pointer_pointee_spelling(spelling: &str) -> Option<&str> {
    let mut rest = spelling.trim_end();
    'strip: loop {
        for qualifier in QUALIFIERS {
            if let Some(head) = rest.strip_suffix(*qualifier) {
                if !head.ends_with(is_ident_char) {
                    rest = head.trim_end();
                    continue 'strip;
                }
            }
        }
        break;
    }
    rest.strip_suffix('*').map(str::trim_end)
}

/// `(unnamed struct at x.c:3:1)` -> `x.c:3:1`; named tags pass through.
fn record_tag(tag: &str) -> String {
    if tag.starts_with('(') && tag.ends_with(')') {
        if let Some(at) = tag.rfind(" at ") {
            return tag[at + 4..tag.len() - 1].to_string();
        }
    }
    tag.to_string()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Drop cv/restrict/atomic qualifiers and collapse whitespace. The text of an
/// anonymous record's `(... at path)` marker is copied verbatim.
fn strip_qualifiers(spelling: &str) -> String {
    let mut out = String::with_capacity(spelling.len());
    let mut rest = spelling;
    while let Some(ch) = rest.chars().next() {
        if ch == '(' && (rest.starts_with("(unnamed") || rest.starts_with("(anonymous")) {
            let end = rest.find(')').map_or(rest.len(), |idx| idx + 1);
            out.push_str(&rest[..end]);
            rest = &rest[end..];
        } else if is_ident_char(ch) {
            let len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
            let (word, tail) = rest.split_at(len);
            if !QUALIFIERS.contains(&word) {
                out.push_str(word);
            }
            rest = tail;
        } else {
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
