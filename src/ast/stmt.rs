use super::item::Item;
use super::{Expr, Span, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        annotation: Option<Type>,
        initializer: Option<Expr>,
        mutable: bool,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    If {
        condition: Box<Expr>,
        then_block: Vec<Stmt>,
        else_block: Vec<Stmt>,
        span: Span,
    },
    Loop {
        form: LoopForm,
        body: Vec<Stmt>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Block {
        body: Vec<Stmt>,
        span: Span,
    },
    Expr {
        expr: Expr,
        span: Span,
    },
    Item(Item),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopForm {
    Infinite,
    While(Expr),
    /// `i in a..b`, half-open ascending.
    Range {
        binding: String,
        start: Expr,
        end: Expr,
    },
    /// `item in arr`
    Iterator { binding: String, array: Expr },
}
