//! The Symbol Table (spec.md §4.2): a process-lifetime registry keyed by
//! `(module, name)`. Built in the teacher's idiom — a plain struct wrapping
//! `rustc_hash::FxHashMap`, owned by [`crate::module_compiler::PawCompiler`]
//! and passed around by `&mut` reference, per the REDESIGN FLAGS guidance
//! against global mutable-state singletons.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{EnumDecl, FunctionDecl, StructDecl};
use crate::ir::IrType;

/// An AST template backing a `Symbol::Type` entry: which kind of type
/// declaration it is, concrete or generic.
#[derive(Debug, Clone)]
pub enum TypeAst {
    Struct(Rc<StructDecl>),
    Enum(Rc<EnumDecl>),
}

impl TypeAst {
    pub fn is_generic(&self) -> bool {
        match self {
            TypeAst::Struct(s) => s.is_generic(),
            TypeAst::Enum(e) => e.is_generic(),
        }
    }
}

/// A function's concrete return type, narrowed beyond its bare [`IrType`]
/// when the return is a struct/enum/`Optional` pointer — once a name has
/// passed through monomorphization, the `IrType` alone (`Pointer`, or the
/// enum's own `Named`) can no longer say which struct or enum it points
/// to. Recorded once at the call site that first registers the function
/// so every *later* call site can recover the precise type without
/// re-deriving it from the AST (spec.md §4.6's "a struct-literal or
/// static-method call returning a struct is recorded with its precise
/// struct type").
#[derive(Debug, Clone)]
pub enum NamedReturnShape {
    Struct(String),
    Enum(String),
    Optional { name: String, inner: IrType },
}

/// One entry's payload, per the kinds enumerated in spec.md §4.2.
#[derive(Debug, Clone)]
pub enum Symbol {
    Function {
        ir_name: String,
        param_types: Vec<IrType>,
        return_type: IrType,
        return_shape: Option<NamedReturnShape>,
    },
    /// A generic-function template: the AST is registered once and
    /// referenced by every later instantiation.
    GenericFunction {
        ast: Rc<FunctionDecl>,
    },
    /// A concrete struct/enum (`ir_type` present) or a generic
    /// struct/enum template registration (`ir_type: None`), per spec.md
    /// §4.2: "Type with null ir-type for generic-template registrations".
    Type {
        ir_type: Option<IrType>,
        ast: TypeAst,
    },
    /// A monomorphized struct instantiation, keyed in the table by its
    /// mangled name.
    GenericStructInstance {
        ir_type: IrType,
        ast: Rc<StructDecl>,
    },
    Variable {
        ir_type: IrType,
    },
}

#[derive(Debug)]
struct SymbolEntry {
    symbol: Symbol,
    public: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolTableError {
    DuplicateDeclaration { module: String, name: String },
}

impl std::fmt::Display for SymbolTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolTableError::DuplicateDeclaration { module, name } => {
                write!(f, "'{name}' is already declared in module '{module}'")
            }
        }
    }
}

/// A concrete (non-generic) struct method, registered under its bare method
/// name in a single global table — spec.md §4.6/§9 Open Question: "method
/// names are globally unique per build", so a call `x.foo()` resolves by
/// searching this table for `foo` rather than by `(struct, method)` pair.
/// Generic-struct methods don't go through here; they're mangled
/// (`method_<suffix>`) and looked up by that exact name instead.
#[derive(Debug, Clone)]
pub struct MethodSymbol {
    pub owner_module: String,
    pub struct_name: String,
    pub ir_name: String,
    pub param_types: Vec<IrType>,
    pub return_type: IrType,
    pub return_shape: Option<NamedReturnShape>,
    pub is_instance: bool,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    modules: FxHashMap<String, FxHashMap<String, SymbolEntry>>,
    /// Load order, so `lookup` has a deterministic cross-module iteration
    /// order (spec.md §4.2: "Returns the first match across modules
    /// deterministically (iteration order follows load order)").
    module_order: Vec<String>,
    /// Global method-name registry for concrete struct methods.
    methods: FxHashMap<String, MethodSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Registers a module so it participates in cross-module lookup order,
    /// even before any symbol is declared in it. Idempotent.
    pub fn register_module(&mut self, module: &str) {
        if !self.modules.contains_key(module) {
            self.modules.insert(module.to_owned(), FxHashMap::default());
            self.module_order.push(module.to_owned());
        }
    }

    /// Declares `name` in `module`. `(module, name)` is a primary key —
    /// redeclaration is a fatal error (spec.md §4.2).
    pub fn declare(
        &mut self,
        module: &str,
        name: &str,
        symbol: Symbol,
        public: bool,
    ) -> Result<(), SymbolTableError> {
        self.register_module(module);
        let table = self.modules.get_mut(module).expect("just registered");
        if table.contains_key(name) {
            return Err(SymbolTableError::DuplicateDeclaration {
                module: module.to_owned(),
                name: name.to_owned(),
            });
        }
        table.insert(name.to_owned(), SymbolEntry { symbol, public });
        Ok(())
    }

    /// Overwrites (or inserts) an entry regardless of prior occupancy — used
    /// only by the Generic Instantiator, which re-checks `mangled name
    /// already present` itself before ever calling this (spec.md §4.4 step
    /// 1), so this never silently clobbers an unrelated declaration.
    pub fn declare_or_replace(&mut self, module: &str, name: &str, symbol: Symbol, public: bool) {
        self.register_module(module);
        let table = self.modules.get_mut(module).expect("just registered");
        table.insert(name.to_owned(), SymbolEntry { symbol, public });
    }

    /// `lookup(name, current)`: same-module symbols are always visible;
    /// symbols in other modules are visible only if public. Returns the
    /// module the symbol was found in, for diagnostics.
    pub fn lookup(&self, name: &str, current_module: &str) -> Option<(&str, &Symbol)> {
        if let Some(table) = self.modules.get(current_module) {
            if let Some(entry) = table.get(name) {
                return Some((current_module, &entry.symbol));
            }
        }
        for module in &self.module_order {
            if module == current_module {
                continue;
            }
            if let Some(table) = self.modules.get(module) {
                if let Some(entry) = table.get(name) {
                    if entry.public {
                        return Some((module.as_str(), &entry.symbol));
                    }
                }
            }
        }
        None
    }

    /// Bypasses visibility — used once the caller has already validated a
    /// qualified `module::name` reference against [`Self::is_accessible`].
    pub fn lookup_in_module(&self, module: &str, name: &str) -> Option<&Symbol> {
        self.modules.get(module)?.get(name).map(|e| &e.symbol)
    }

    pub fn lookup_in_module_mut(&mut self, module: &str, name: &str) -> Option<&mut Symbol> {
        self.modules.get_mut(module)?.get_mut(name).map(|e| &mut e.symbol)
    }

    pub fn is_accessible(&self, module: &str, name: &str, from_module: &str) -> bool {
        match self.modules.get(module).and_then(|t| t.get(name)) {
            Some(entry) => module == from_module || entry.public,
            None => false,
        }
    }

    /// Registers a concrete struct method under its bare name in the global
    /// method table. Redeclaration is a fatal error, mirroring
    /// [`Self::declare`] — two structs in a build can't both define a
    /// method with the same name under this resolution model.
    pub fn declare_method(&mut self, name: &str, symbol: MethodSymbol) -> Result<(), SymbolTableError> {
        if self.methods.contains_key(name) {
            return Err(SymbolTableError::DuplicateDeclaration {
                module: symbol.owner_module,
                name: name.to_owned(),
            });
        }
        self.methods.insert(name.to_owned(), symbol);
        Ok(())
    }

    pub fn lookup_method(&self, name: &str) -> Option<&MethodSymbol> {
        self.methods.get(name)
    }

    pub fn contains(&self, module: &str, name: &str) -> bool {
        self.modules
            .get(module)
            .map(|t| t.contains_key(name))
            .unwrap_or(false)
    }

    /// Diagnostic dump: every `module::name` pair currently registered, in
    /// load order.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for module in &self.module_order {
            let Some(table) = self.modules.get(module) else {
                continue;
            };
            let mut names: Vec<&String> = table.keys().collect();
            names.sort();
            for name in names {
                let entry = &table[name];
                let vis = if entry.public { "pub" } else { "priv" };
                out.push_str(&format!("{module}::{name} [{vis}]\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(ty: IrType) -> Symbol {
        Symbol::Variable { ir_type: ty }
    }

    #[test]
    fn same_module_lookup_ignores_visibility() {
        let mut st = SymbolTable::new();
        st.declare("a", "x", var(IrType::I32), false).unwrap();
        assert!(st.lookup("x", "a").is_some());
    }

    #[test]
    fn cross_module_private_is_hidden() {
        let mut st = SymbolTable::new();
        st.register_module("a");
        st.register_module("b");
        st.declare("a", "x", var(IrType::I32), false).unwrap();
        assert!(st.lookup("x", "b").is_none());
    }

    #[test]
    fn cross_module_public_is_visible() {
        let mut st = SymbolTable::new();
        st.register_module("a");
        st.register_module("b");
        st.declare("a", "x", var(IrType::I32), true).unwrap();
        let (module, _) = st.lookup("x", "b").unwrap();
        assert_eq!(module, "a");
    }

    #[test]
    fn duplicate_declaration_is_an_error() {
        let mut st = SymbolTable::new();
        st.declare("a", "x", var(IrType::I32), false).unwrap();
        let err = st.declare("a", "x", var(IrType::I32), false).unwrap_err();
        assert_eq!(
            err,
            SymbolTableError::DuplicateDeclaration {
                module: "a".into(),
                name: "x".into()
            }
        );
    }

    #[test]
    fn lookup_is_deterministic_across_modules() {
        let mut st = SymbolTable::new();
        st.declare("a", "x", var(IrType::I32), true).unwrap();
        st.declare("b", "x", var(IrType::I64), true).unwrap();
        let (module, _) = st.lookup("x", "c").unwrap();
        assert_eq!(module, "a");
    }
}
