use super::expr::Expr;

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Wildcard,
    Identifier(String),
    Literal(Expr),
    /// `VariantName(binding1, binding2, ...)` — spec.md only ever lowers the
    /// first associated binding (the `Optional<T>` payload is a single
    /// scalar), but the AST keeps the full list for fidelity to the source
    /// grammar.
    EnumVariant {
        variant: String,
        bindings: Vec<String>,
    },
    /// Reserved: emits `PatternNotSupported` at lowering time (spec.md §4.6).
    Struct { name: String, fields: Vec<String> },
}
