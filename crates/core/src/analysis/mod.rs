//! Expression analysis: which sub-expressions can be probed, and how.
//!
//! The rules are structural only; there is no points-to reasoning:
//! - a variable reference is measurable unless it is `register`, of
//!   incomplete type, or a pointer to an incomplete type
//! - a compound expression is measurable only if every operand is
//! - lvalues are collected at the leaves of an expression tree
//! - struct lvalues expand into one probe per first-level member

use std::collections::HashMap;

use crate::db::SymbolTable;
use crate::model::{
    ArraySize, CType, DeclTarget, Expr, ExprKind, Probe, RecordDecl, StorageClass, TypeKind,
};

/// Struct/union definitions known at the current traversal point.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    defs: HashMap<String, RecordDecl>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition; a later definition with the same tag replaces it.
    pub fn define(&mut self, record: RecordDecl) {
        self.defs.insert(record.tag.clone(), record);
    }

    pub fn get(&self, tag: &str) -> Option<&RecordDecl> {
        self.defs.get(tag)
    }

    pub fn is_complete(&self, tag: &str) -> bool {
        self.defs.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// `void`, `T []`, and undefined structs/unions are incomplete.
pub fn is_incomplete(ty: &CType, records: &RecordTable) -> bool {
    match &ty.kind {
        TypeKind::Void => true,
        TypeKind::Array { size: ArraySize::Unspecified, .. } => true,
        TypeKind::Record { tag, .. } => !records.is_complete(tag),
        _ => false,
    }
}

/// Pointer (not `nullptr_t`) whose pointee is incomplete, e.g. `void *`.
pub fn is_pointer_to_incomplete(ty: &CType, records: &RecordTable) -> bool {
    ty.pointee().is_some_and(|pointee| is_incomplete(pointee, records))
}

/// Whether `&(e)` and `sizeof(e)` are safe to emit for `expr`.
pub fn can_measure_size(expr: &Expr, records: &RecordTable) -> bool {
    match &expr.kind {
        ExprKind::DeclRef { target: DeclTarget::Variable { storage }, .. } => {
            *storage != StorageClass::Register
                && !is_pointer_to_incomplete(&expr.ty, records)
                && !is_incomplete(&expr.ty, records)
        }
        // No named variable behind this leaf.
        ExprKind::DeclRef { .. } | ExprKind::StringLiteral | ExprKind::Leaf => false,
        _ => {
            let children = expr.children();
            if children.is_empty() {
                return false;
            }
            children.into_iter().all(|child| can_measure_size(child.strip_casts(), records))
        }
    }
}

/// Lazily walk the lvalue leaves of `expr` in source order.
pub fn collect_lvalues(expr: &Expr) -> Lvalues<'_> {
    Lvalues { stack: vec![expr] }
}

/// Depth-first iterator over the non-string-literal lvalue leaves of an
/// expression. Clone it to restart from the same point.
#[derive(Debug, Clone)]
pub struct Lvalues<'a> {
    stack: Vec<&'a Expr>,
}

impl<'a> Iterator for Lvalues<'a> {
    type Item = &'a Expr;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(expr) = self.stack.pop() {
            if expr.is_leaf() {
                if expr.is_lvalue && !matches!(expr.kind, ExprKind::StringLiteral) {
                    return Some(expr);
                }
                continue;
            }
            // Reverse push keeps left-to-right order on pop.
            for child in expr.children().into_iter().rev() {
                self.stack.push(child.strip_casts());
            }
        }
        None
    }
}

/// Member access operator used when expanding a struct lvalue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// `lv.field`
    Dot,
    /// `lv->field`
    Arrow,
}

impl Accessor {
    pub fn as_str(self) -> &'static str {
        match self {
            Accessor::Dot => ".",
            Accessor::Arrow => "->",
        }
    }
}

/// File and line every probe of one site reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSite {
    pub file_id: u32,
    pub line: u32,
}

/// One probe per addressable first-level member of `record`.
///
/// Bit-fields (no address), unnamed members, and `reserved` names are
/// skipped. Nested struct members get a probe of their own but are not
/// expanded further.
pub fn expand_struct_fields(
    symbols: &mut SymbolTable,
    reserved: &[String],
    lvalue_text: &str,
    record: &RecordDecl,
    accessor: Accessor,
    site: ProbeSite,
) -> Vec<Probe> {
    record
        .fields
        .iter()
        .filter(|field| !field.is_bit_field && !field.name.is_empty())
        .filter(|field| !reserved.iter().any(|r| r == &field.name))
        .map(|field| {
            let member = format!("{}{}{}", lvalue_text, accessor.as_str(), field.name);
            Probe {
                buffer: format!("&({member})"),
                size: format!("sizeof({member})"),
                file_id: site.file_id,
                symbol_id: symbols.get_or_insert(&member),
                line: site.line,
            }
        })
        .collect()
}
