//! Source-language AST, produced upstream by the (out of scope) parser.
//!
//! Every node is a tagged `enum`/`struct`, matched exhaustively by the
//! lowering passes — no visitor trait, no `dyn` dispatch.

mod expr;
mod item;
mod pattern;
mod stmt;
mod types;

pub use expr::{AssignTarget, BinOp, Expr, MatchArm, UnOp};
pub use item::{
    EnumDecl, EnumVariant, ExternFn, FunctionDecl, Impl, Item, Param, StructDecl, TypeAliasDecl,
};
pub use pattern::Pattern;
pub use stmt::{LoopForm, Stmt};
pub use types::{PrimitiveKind, SpannedType, Type};

/// A byte-offset span into the originating source file, carried purely for
/// diagnostics (never consulted by lowering logic itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }
}

/// One whole source module: an ordered sequence of top-level items, plus the
/// list of imports extracted by the loader (kept here so the Module Compiler
/// doesn't need to re-walk the item list to rediscover them).
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn new(items: Vec<Item>) -> Self {
        Program { items }
    }

    /// Top-level `import` statements, in source order. The loader only
    /// walks the top level per spec.md §4.1 — nested imports don't exist in
    /// the language, but we never need to recurse into bodies either way.
    pub fn imports(&self) -> impl Iterator<Item = &ImportPath> {
        self.items.iter().filter_map(|item| match item {
            Item::Import(path) => Some(path),
            _ => None,
        })
    }
}

/// An import path such as `a::b::c`, stored as its ordered segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportPath {
    pub segments: Vec<String>,
}

impl ImportPath {
    pub fn new(segments: Vec<String>) -> Self {
        ImportPath { segments }
    }

    /// The module's canonical short name: its final segment.
    pub fn short_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Resolve this import path to a relative file path under some root:
    /// `a::b::c` → `a/b/c.<ext>`.
    pub fn to_relative_path(&self, extension: &str) -> std::path::PathBuf {
        let mut path = std::path::PathBuf::new();
        for segment in &self.segments {
            path.push(segment);
        }
        path.set_extension(extension);
        path
    }
}
