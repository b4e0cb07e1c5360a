use super::stmt::Stmt;
use super::{ImportPath, Span, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Impl(Impl),
    TypeAlias(TypeAliasDecl),
    Extern(ExternFn),
    Import(ImportPath),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Vec<Stmt>,
    pub public: bool,
    pub span: Span,
}

impl FunctionDecl {
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    /// Declaration order is the field layout, per spec.md §3 invariants.
    pub fields: Vec<Param>,
    /// Methods declared inline inside the struct body.
    pub methods: Vec<FunctionDecl>,
    pub public: bool,
    pub span: Span,
}

impl StructDecl {
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: String,
    /// Ordered list of associated types; only the first is ever stored (the
    /// IR payload is a single 64-bit scalar, spec.md §4.4).
    pub associated_types: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    pub variants: Vec<EnumVariant>,
    pub public: bool,
    pub span: Span,
}

impl EnumDecl {
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn variant_index(&self, name: &str) -> Option<u32> {
        self.variants
            .iter()
            .position(|v| v.name == name)
            .map(|i| i as u32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Impl {
    pub target: String,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAliasDecl {
    pub name: String,
    pub target: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternFn {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub span: Span,
}
