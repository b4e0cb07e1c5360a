//! Expression Lowering (EL) and Statement Lowering (SL) — spec.md §4.6/4.7.
//!
//! A single [`Lowerer`] is bound to one module's [`IrModule`] and the
//! program-wide [`SymbolTable`]; its methods are spread across this
//! directory's files the way the teacher spreads `HirBuilder`'s methods
//! across `hir_builder.rs`/`hir_expression.rs`/`hir_statement.rs` — one
//! `impl` block per concern, all on the same struct.

mod expr;
mod stmt;

use rustc_hash::FxHashMap;

use crate::ast::Type;
use crate::diagnostics::{CompileError, ErrorLocation};
use crate::ir::{BlockId, Builder, IrModule, IrType, IrValue};
use crate::symbol_table::SymbolTable;

/// How an identifier's local slot yields its value — see module docs in
/// `lower/stmt.rs` for the full rationale (struct-by-reference vs.
/// array-by-value vs. plain scalars).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStorage {
    /// The slot's address *is* the array's own backing storage; identifier
    /// lookup returns that address unchanged.
    DirectArray,
    /// The slot holds a pointer value that must be loaded to obtain the
    /// real address (structs, `Optional<T>`, and array parameters, which
    /// degrade to pointers at the boundary).
    PointerBacked,
    /// A plain scalar: identifier lookup loads the value by its IR type.
    Scalar,
}

#[derive(Debug, Clone)]
pub struct LocalSlot {
    /// Address of the alloca'd storage.
    pub ptr: IrValue,
    pub source_type: Type,
    /// IR type of the *value itself* (not of `ptr`, which is always a
    /// pointer): `Pointer` for struct/optional slots, `Array{..}` for
    /// direct-array slots, `Pointer` again for array-parameter slots
    /// (see `storage`), or the scalar IR type otherwise.
    pub value_ir_type: IrType,
    pub storage: SlotStorage,
    /// Element type, populated only when `source_type` is an array —
    /// needed by `Index` lowering regardless of whether the array decayed
    /// to a parameter pointer (spec.md §4.6 "Index").
    pub array_elem_ty: Option<IrType>,
    pub mutable: bool,
}

/// Which struct a method body is being lowered for, and whether it's an
/// instance method (`self` available, `Self` is a pointer) or a static one
/// (`Self` is the value type) — spec.md §4.3 "Self".
#[derive(Debug, Clone)]
pub struct StructContext {
    pub struct_name: String,
    pub is_instance: bool,
}

/// The "precise type" expression lowering carries alongside every
/// [`IrValue`] it produces. `resolve_type`/`IrType` alone can't tell a GEP
/// apart from an enum discriminant once generic names have been mangled
/// away, so `Shape` is computed once (by [`crate::type_resolver`]) and
/// threaded through `lower_expr`'s return value instead of being
/// re-derived from the bare `IrType` at every call site.
#[derive(Debug, Clone)]
pub enum Shape {
    Void,
    Scalar(IrType),
    /// A pointer to a named struct's backing storage.
    StructPtr(String),
    /// An enum's own tagged-union value (never pointer-wrapped locally).
    Enum(String),
    /// A pointer to an `Optional<T>`'s backing storage; `inner` is the
    /// resolved, possibly-degraded IR type of `T`'s `value` field.
    OptionalPtr { name: String, inner: IrType },
    Array { elem: IrType, len: u32 },
}

impl Shape {
    /// The [`IrType`] of the value this shape describes *as held locally*
    /// (pointer for struct/optional, the array type itself for arrays —
    /// boundary degradation is applied separately, not here).
    pub fn local_ir_type(&self) -> IrType {
        match self {
            Shape::Void => IrType::Void,
            Shape::Scalar(ty) => ty.clone(),
            Shape::StructPtr(_) | Shape::OptionalPtr { .. } => IrType::Pointer,
            // Enums are value types (spec.md §3): the local IR type is the
            // tagged union itself, never a pointer wrapper.
            Shape::Enum(name) => IrType::Named(name.clone()),
            Shape::Array { elem, len } => IrType::Array {
                elem: Box::new(elem.clone()),
                len: *len,
            },
        }
    }

    /// Narrows this shape to the bit of it worth remembering alongside a
    /// function's bare [`IrType`] return — `None` for anything a plain
    /// `IrType` already fully describes (scalars, void).
    pub fn as_return_hint(&self) -> Option<crate::symbol_table::NamedReturnShape> {
        use crate::symbol_table::NamedReturnShape;
        match self {
            Shape::StructPtr(name) => Some(NamedReturnShape::Struct(name.clone())),
            Shape::Enum(name) => Some(NamedReturnShape::Enum(name.clone())),
            Shape::OptionalPtr { name, inner } => Some(NamedReturnShape::Optional {
                name: name.clone(),
                inner: inner.clone(),
            }),
            Shape::Scalar(_) | Shape::Void | Shape::Array { .. } => None,
        }
    }

    /// The inverse of [`Self::as_return_hint`]: rebuilds a `Shape` from a
    /// function's declared [`IrType`] plus its optional stored hint.
    pub fn from_return_hint(ir_type: &IrType, hint: &Option<crate::symbol_table::NamedReturnShape>) -> Shape {
        use crate::symbol_table::NamedReturnShape;
        match hint {
            Some(NamedReturnShape::Struct(name)) => Shape::StructPtr(name.clone()),
            Some(NamedReturnShape::Enum(name)) => Shape::Enum(name.clone()),
            Some(NamedReturnShape::Optional { name, inner }) => Shape::OptionalPtr {
                name: name.clone(),
                inner: inner.clone(),
            },
            None if ir_type.is_void() => Shape::Void,
            None => Shape::Scalar(ir_type.clone()),
        }
    }
}

/// Per-function lowering state bound to one [`Lowerer`] at a time. Reset by
/// `lower_function_body` for every function/method it lowers.
pub struct FunctionContext {
    pub builder: Builder,
    pub locals: Vec<FxHashMap<String, LocalSlot>>,
    /// `(continue_target, break_target)`, innermost last (spec.md §4.7).
    pub loop_stack: Vec<(BlockId, BlockId)>,
    /// The function's declared source return type, consulted by `return`,
    /// `ok`, `err`, and struct-return coercion.
    pub return_type: Type,
    pub ir_return_type: IrType,
    pub current_struct: Option<StructContext>,
}

impl FunctionContext {
    pub fn new(param_types: &[IrType], return_type: Type, ir_return_type: IrType) -> (Self, Vec<IrValue>) {
        let (builder, params) = Builder::new_function(param_types);
        (
            FunctionContext {
                builder,
                locals: vec![FxHashMap::default()],
                loop_stack: Vec::new(),
                return_type,
                ir_return_type,
                current_struct: None,
            },
            params,
        )
    }

    pub fn push_scope(&mut self) {
        self.locals.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        self.locals.pop();
        debug_assert!(!self.locals.is_empty(), "function scope popped past its root");
    }

    pub fn declare_local(&mut self, name: impl Into<String>, slot: LocalSlot) {
        self.locals
            .last_mut()
            .expect("at least one scope always open")
            .insert(name.into(), slot);
    }

    pub fn find_local(&self, name: &str) -> Option<&LocalSlot> {
        self.locals.iter().rev().find_map(|scope| scope.get(name))
    }
}

/// Drives EL+SL+TR+GI for one module, bound to the program-wide Symbol
/// Table. One `Lowerer` is constructed per module by
/// [`crate::module_compiler::PawCompiler`] and discarded once the module's
/// [`IrModule`] is finished.
pub struct Lowerer<'st> {
    pub st: &'st mut SymbolTable,
    pub module: IrModule,
    pub module_name: String,
    /// Generic-parameter substitution scopes, innermost last (spec.md
    /// §4.4 step 2/8: pushed on instantiation entry, popped on exit).
    pub substitutions: Vec<FxHashMap<String, Type>>,
    /// The function currently being lowered; `None` between functions
    /// while only types are being registered (pass 1 of §4.8).
    pub func: Option<FunctionContext>,
    /// Cross-module type translations already rebuilt in this module's IR
    /// context, keyed by `(source_module, type_name)` (spec.md §4.5 step
    /// 2: "cache the result in the current module").
    pub import_type_cache: FxHashMap<(String, String), IrType>,
    /// Cross-module function declarations already created locally (spec.md
    /// §4.5 step 3).
    pub import_fn_cache: std::collections::HashSet<String>,
    /// `Item::TypeAlias` definitions registered so far in this module,
    /// keyed by alias name — consulted by the Type Resolver before falling
    /// back to a struct/enum lookup (spec.md §4.7 "Type alias").
    pub type_aliases: FxHashMap<String, Type>,
    /// Per-field [`Shape`], keyed by a struct's concrete/mangled name, in
    /// declaration order — recorded once at registration/instantiation time
    /// so member access can recover a field's precise nested struct/enum
    /// identity after it has degraded to a bare IR pointer (spec.md §4.6
    /// "Member access ... If the receiver's precise struct type is known").
    pub field_shapes: FxHashMap<String, Vec<Shape>>,
    pub errors: Vec<CompileError>,
}

impl<'st> Lowerer<'st> {
    pub fn new(st: &'st mut SymbolTable, module_name: impl Into<String>) -> Self {
        let module_name = module_name.into();
        st.register_module(&module_name);
        Lowerer {
            st,
            module: IrModule::new(module_name.clone()),
            module_name,
            substitutions: Vec::new(),
            func: None,
            import_type_cache: FxHashMap::default(),
            import_fn_cache: std::collections::HashSet::new(),
            type_aliases: FxHashMap::default(),
            field_shapes: FxHashMap::default(),
            errors: Vec::new(),
        }
    }

    pub fn error_location(&self) -> ErrorLocation {
        ErrorLocation::in_module(&self.module_name)
    }

    pub fn push_error(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    pub fn func(&mut self) -> &mut FunctionContext {
        self.func.as_mut().expect("statement/expression lowering requires an active function context")
    }

    /// Looks up `name` in the current (innermost-first) substitution
    /// scope — spec.md §4.3 "Generic(T)": "look up in the current
    /// substitution map".
    pub fn substitute(&self, name: &str) -> Option<&Type> {
        self.substitutions.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn push_substitution(&mut self, scope: FxHashMap<String, Type>) {
        self.substitutions.push(scope);
    }

    pub fn pop_substitution(&mut self) {
        self.substitutions.pop();
    }

    /// Ensures `name` (a [`crate::runtime_abi`] entry) has a local external
    /// declaration, creating one on first use.
    pub fn ensure_runtime_decl(&mut self, name: &str) -> String {
        if self.module.find_function(name).is_none() {
            if let Some(runtime_fn) = crate::runtime_abi::lookup(name) {
                self.module.add_function(runtime_fn.as_declaration());
            }
        }
        name.to_owned()
    }

    /// Applies the active substitution to every `Generic(T)` leaf in `ty`,
    /// leaving everything else untouched — used to pre-instantiate generic
    /// types mentioned in a return type before lowering the body (spec.md
    /// §4.4 step 5), so callers never observe a residual `Generic(T)`.
    pub fn apply_substitution(&self, ty: &Type) -> Type {
        match ty {
            Type::Generic(name) => self.substitute(name).cloned().unwrap_or_else(|| ty.clone()),
            Type::Named { name, args } => Type::Named {
                name: name.clone(),
                args: args.iter().map(|a| self.apply_substitution(a)).collect(),
            },
            Type::Array { elem, size } => Type::Array {
                elem: Box::new(self.apply_substitution(elem)),
                size: *size,
            },
            Type::Optional(inner) => Type::Optional(Box::new(self.apply_substitution(inner))),
            Type::Primitive(_) | Type::SelfType => ty.clone(),
        }
    }
}
