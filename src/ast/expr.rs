use super::{Pattern, Span, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer {
        value: i64,
        span: Span,
    },
    Float {
        value: f64,
        span: Span,
    },
    Bool {
        value: bool,
        span: Span,
    },
    Str {
        value: String,
        span: Span,
    },
    Char {
        value: u8,
        span: Span,
    },
    Identifier {
        name: String,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    /// `[module::]name[::<TArgs>](args)`
    Call {
        module: Option<String>,
        name: String,
        type_args: Vec<Type>,
        args: Vec<Expr>,
        span: Span,
    },
    /// `receiver.method(args)` — or `Type::method<TArgs>(args)` when
    /// `receiver` is a bare `Identifier` naming a type and `is_static` is set.
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        type_args: Vec<Type>,
        args: Vec<Expr>,
        is_static: bool,
        span: Span,
    },
    Assign {
        target: AssignTarget,
        value: Box<Expr>,
        span: Span,
    },
    StructLiteral {
        name: String,
        type_args: Vec<Type>,
        fields: Vec<(String, Expr)>,
        span: Span,
    },
    EnumVariant {
        enum_name: String,
        variant: String,
        args: Vec<Expr>,
        span: Span,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Member {
        base: Box<Expr>,
        field: String,
        span: Span,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
        span: Span,
    },
    /// `scrutinee is VariantName(binding)`
    Is {
        scrutinee: Box<Expr>,
        variant: String,
        binding: Option<String>,
        span: Span,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        span: Span,
    },
    As {
        expr: Box<Expr>,
        target: Type,
        span: Span,
    },
    /// `expr?`
    Try {
        expr: Box<Expr>,
        span: Span,
    },
    Ok {
        value: Box<Expr>,
        span: Span,
    },
    Err {
        message: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Integer { span, .. }
            | Expr::Float { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Str { span, .. }
            | Expr::Char { span, .. }
            | Expr::Identifier { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::MethodCall { span, .. }
            | Expr::Assign { span, .. }
            | Expr::StructLiteral { span, .. }
            | Expr::EnumVariant { span, .. }
            | Expr::ArrayLiteral { span, .. }
            | Expr::Index { span, .. }
            | Expr::Member { span, .. }
            | Expr::Match { span, .. }
            | Expr::Is { span, .. }
            | Expr::If { span, .. }
            | Expr::As { span, .. }
            | Expr::Try { span, .. }
            | Expr::Ok { span, .. }
            | Expr::Err { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Identifier(String),
    Index { base: Box<Expr>, index: Box<Expr> },
    Member { base: Box<Expr>, field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
}
