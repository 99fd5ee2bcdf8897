//! Syntax-tree model handed to the instrumentation core by a front end.
//!
//! The front end (see `services::frontends`) owns parsing; this module only
//! describes the closed set of node kinds the analyzer and synthesizer match
//! on:
//! - Expressions (`Expr` / `ExprKind`) with their C type and source range
//! - Declarations the driver reacts to (functions, parameters, globals, records)
//! - Probe descriptions produced by the analyzer and rendered by the synthesizer

use serde::{Deserialize, Serialize};

/// Where a range of source text came from.
///
/// Only `MainFile` ranges are ever rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    MainFile,
    Macro,
    OtherFile,
}

/// Byte range in the primary source buffer plus the line of its first token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    /// Offset of the first byte of the first token.
    pub begin: usize,
    /// Offset one past the last byte of the last token.
    pub end: usize,
    /// 1-based expansion line of `begin`.
    pub line: u32,
    pub origin: Origin,
}

impl SourceRange {
    /// Range located in the primary file.
    pub fn main_file(begin: usize, end: usize, line: u32) -> Self {
        Self { begin, end, line, origin: Origin::MainFile }
    }

    /// Range the driver must leave alone (macro expansion or included file).
    pub fn foreign(origin: Origin, line: u32) -> Self {
        Self { begin: 0, end: 0, line, origin }
    }

    pub fn is_rewritable(&self) -> bool {
        self.origin == Origin::MainFile
    }
}

/// Storage class of a variable or parameter declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    #[default]
    None,
    Auto,
    Register,
    Static,
    Extern,
}

impl StorageClass {
    /// Parse clang's storage class specifier spelling.
    pub fn from_spelling(spelling: &str) -> Self {
        match spelling {
            "auto" => StorageClass::Auto,
            "register" => StorageClass::Register,
            "static" => StorageClass::Static,
            "extern" => StorageClass::Extern,
            _ => StorageClass::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Struct,
    Union,
}

/// Size information for an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArraySize {
    Fixed(u64),
    /// Variable-length array; complete at run time.
    Variable,
    /// `T []`; an incomplete type.
    Unspecified,
}

/// A C type as spelled in source plus its structural shape.
///
/// `spelling` is what gets pasted into synthesized declarations and
/// `sizeof` operands, so it should be the (sugared) spelling the user wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CType {
    pub spelling: String,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Void,
    /// Arithmetic, enum, and any other opaque complete object type.
    Scalar,
    NullPtr,
    Pointer(Box<CType>),
    Array {
        element: Box<CType>,
        size: ArraySize,
    },
    /// A struct or union; completeness is resolved against the run's record table.
    Record {
        kind: RecordKind,
        tag: String,
    },
    Function,
}

impl CType {
    pub fn new(spelling: impl Into<String>, kind: TypeKind) -> Self {
        Self { spelling: spelling.into(), kind }
    }

    pub fn void() -> Self {
        Self::new("void", TypeKind::Void)
    }

    pub fn scalar(spelling: impl Into<String>) -> Self {
        Self::new(spelling, TypeKind::Scalar)
    }

    pub fn pointer_to(pointee: CType) -> Self {
        let spelling = format!("{} *", pointee.spelling);
        Self::new(spelling, TypeKind::Pointer(Box::new(pointee)))
    }

    pub fn array_of(element: CType, size: ArraySize) -> Self {
        let spelling = match size {
            ArraySize::Fixed(n) => format!("{} [{}]", element.spelling, n),
            ArraySize::Variable => format!("{} [*]", element.spelling),
            ArraySize::Unspecified => format!("{} []", element.spelling),
        };
        Self::new(spelling, TypeKind::Array { element: Box::new(element), size })
    }

    pub fn record(kind: RecordKind, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let keyword = match kind {
            RecordKind::Struct => "struct",
            RecordKind::Union => "union",
        };
        Self::new(format!("{keyword} {tag}"), TypeKind::Record { kind, tag })
    }

    /// Replace the spelling while keeping the structural kind (typedef sugar).
    pub fn with_spelling(mut self, spelling: impl Into<String>) -> Self {
        self.spelling = spelling.into();
        self
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    pub fn pointee(&self) -> Option<&CType> {
        match &self.kind {
            TypeKind::Pointer(pointee) => Some(pointee),
            _ => None,
        }
    }

    /// Struct tag if this is a struct (not union) type.
    pub fn struct_tag(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Record { kind: RecordKind::Struct, tag } => Some(tag),
            _ => None,
        }
    }

    /// Render a declaration of `name` with this type.
    ///
    /// Function-pointer spellings such as `int (*)(int)` need the name inside
    /// the declarator: `int (*name)(int)`.
    pub fn declare(&self, name: &str) -> String {
        if let Some(start) = self.spelling.find("(*") {
            let stars = self.spelling[start + 1..].chars().take_while(|c| *c == '*').count();
            let close = start + 1 + stars;
            if self.spelling[close..].starts_with(')') {
                return format!("{}{}{}", &self.spelling[..close], name, &self.spelling[close..]);
            }
        }
        format!("{} {}", self.spelling, name)
    }
}

/// What a declaration reference resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclTarget {
    Variable { storage: StorageClass },
    Function,
    /// Enumerators and anything else that is not an object.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    Implicit,
    Explicit,
}

/// Closed set of expression node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExprKind {
    DeclRef {
        name: String,
        target: DeclTarget,
    },
    StringLiteral,
    /// Any other node without sub-expressions (literals, `sizeof(type)`, ...).
    Leaf,
    Cast {
        kind: CastKind,
        operand: Box<Expr>,
    },
    Call(CallExpr),
    /// Any other node with sub-expressions; `node` is the front end's kind name.
    Compound {
        node: String,
        children: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: CType,
    pub is_lvalue: bool,
    /// Source text of the expression with whitespace runs collapsed.
    pub text: String,
    pub range: SourceRange,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: CType, is_lvalue: bool, text: impl Into<String>) -> Self {
        Self { kind, ty, is_lvalue, text: text.into(), range: SourceRange::main_file(0, 0, 0) }
    }

    /// Reference to a variable; always an lvalue.
    pub fn variable(name: &str, ty: CType, storage: StorageClass) -> Self {
        let target = DeclTarget::Variable { storage };
        Self::new(ExprKind::DeclRef { name: name.to_string(), target }, ty, true, name)
    }

    /// Reference to a function by name.
    pub fn function_ref(name: &str, ty: CType) -> Self {
        let target = DeclTarget::Function;
        Self::new(ExprKind::DeclRef { name: name.to_string(), target }, ty, true, name)
    }

    pub fn string_literal(text: &str) -> Self {
        let ty = CType::array_of(CType::scalar("char"), ArraySize::Fixed(text.len() as u64));
        Self::new(ExprKind::StringLiteral, ty, true, text)
    }

    pub fn literal(text: &str, ty: CType) -> Self {
        Self::new(ExprKind::Leaf, ty, false, text)
    }

    pub fn implicit_cast(operand: Expr, ty: CType) -> Self {
        let text = operand.text.clone();
        let kind = ExprKind::Cast { kind: CastKind::Implicit, operand: Box::new(operand) };
        Self::new(kind, ty, false, text)
    }

    pub fn compound(
        node: &str,
        children: Vec<Expr>,
        ty: CType,
        is_lvalue: bool,
        text: &str,
    ) -> Self {
        let kind = ExprKind::Compound { node: node.to_string(), children };
        Self::new(kind, ty, is_lvalue, text)
    }

    pub fn with_range(mut self, range: SourceRange) -> Self {
        self.range = range;
        self
    }

    /// Immediate sub-expressions in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::DeclRef { .. } | ExprKind::StringLiteral | ExprKind::Leaf => Vec::new(),
            ExprKind::Cast { operand, .. } => vec![operand.as_ref()],
            ExprKind::Call(call) => {
                let mut out = Vec::with_capacity(call.args.len() + 1);
                out.push(call.callee.as_ref());
                out.extend(call.args.iter());
                out
            }
            ExprKind::Compound { children, .. } => children.iter().collect(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        match &self.kind {
            ExprKind::DeclRef { .. } | ExprKind::StringLiteral | ExprKind::Leaf => true,
            ExprKind::Compound { children, .. } => children.is_empty(),
            ExprKind::Cast { .. } | ExprKind::Call(_) => false,
        }
    }

    /// Strip implicit and explicit casts.
    pub fn strip_casts(&self) -> &Expr {
        let mut current = self;
        while let ExprKind::Cast { operand, .. } = &current.kind {
            current = operand;
        }
        current
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub args: Vec<Expr>,
    pub return_type: CType,
    pub range: SourceRange,
}

impl CallExpr {
    pub fn new(callee: Expr, args: Vec<Expr>, return_type: CType, range: SourceRange) -> Self {
        Self { callee: Box::new(callee), args, return_type, range }
    }

    /// Name of the statically known callee, if any.
    ///
    /// Calls through function pointers (`fp(x)`, `(*fp)(x)`, `s->cb(x)`) yield `None`.
    pub fn direct_callee(&self) -> Option<&str> {
        let mut current = self.callee.strip_casts();
        loop {
            match &current.kind {
                ExprKind::DeclRef { name, target: DeclTarget::Function } => return Some(name),
                ExprKind::Compound { node, children }
                    if node == "ParenExpr" && children.len() == 1 =>
                {
                    current = children[0].strip_casts();
                }
                _ => return None,
            }
        }
    }

    pub fn has_return_value(&self) -> bool {
        !self.return_type.is_void()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: CType,
    pub storage: StorageClass,
    pub line: u32,
}

impl ParamDecl {
    pub fn new(name: &str, ty: CType, line: u32) -> Self {
        Self { name: name.to_string(), ty, storage: StorageClass::None, line }
    }

    pub fn with_storage(mut self, storage: StorageClass) -> Self {
        self.storage = storage;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionBody {
    /// `{ ... }`; carries the range of its first statement, if any.
    Compound { first_statement: Option<SourceRange> },
    /// Anything else (e.g. a try-block body in C++ dialects).
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub body: FunctionBody,
    pub range: SourceRange,
}

/// A variable declaration; the driver collects file-scope ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: CType,
    pub storage: StorageClass,
    pub line: u32,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: CType,
    pub is_bit_field: bool,
}

impl FieldDecl {
    pub fn new(name: &str, ty: CType) -> Self {
        Self { name: name.to_string(), ty, is_bit_field: false }
    }

    pub fn bit_field(name: &str, ty: CType) -> Self {
        Self { name: name.to_string(), ty, is_bit_field: true }
    }
}

/// A struct or union definition (forward declarations are never reported).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub tag: String,
    pub kind: RecordKind,
    pub fields: Vec<FieldDecl>,
}

/// One call to the taint oracle's buffer query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub buffer: String,
    pub size: String,
    pub file_id: u32,
    pub symbol_id: u32,
    pub line: u32,
}

/// A probe statement as emitted into the instrumented source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeStmt {
    Probe(Probe),
    /// `if (condition) { probes }`
    Guarded { condition: String, probes: Vec<Probe> },
}
