//! The Type Resolver (spec.md §4.3): converts a source [`Type`] to an
//! [`IrType`] against the current module's IR context and the active
//! generic substitution map. Also computes [`Shape`], the richer
//! "precise type" expression/statement lowering needs to pick the right
//! load/GEP/dispatch rule after generic names have been mangled away.
//!
//! Implemented as `impl Lowerer` methods (this crate's `HirBuilder`-style
//! split — see `lower/mod.rs`) because resolving a generic `Named` type
//! requires triggering the Generic Instantiator, which in turn lowers
//! method bodies through the very same `Lowerer`.

use crate::ast::{PrimitiveKind, Type};
use crate::diagnostics::CompileError;
use crate::ir::{optional_layout, IrType};
use crate::lower::{Lowerer, Shape};
use crate::symbol_table::{Symbol, TypeAst};

/// `size == -1` (spec.md §3) becomes this sentinel array length, fixed up
/// later by `let`-initializer lowering once the element count is known
/// (spec.md §4.7).
pub const DEFERRED_ARRAY_LEN: u32 = u32::MAX;

/// Whether a source type degrades to an opaque pointer at a function
/// boundary (spec.md Glossary: "Degradation ... struct, optional, or array
/// types at function boundaries are represented in IR as opaque
/// pointers"). Applies to parameters and return types alike.
pub fn degrades_at_boundary(ty: &Type) -> bool {
    matches!(ty, Type::Named { .. } | Type::Optional(_) | Type::Array { .. })
}

/// Whether a source type is stored as a pointer in a local `let` slot
/// (struct/optional only — local arrays stay values, spec.md §3).
pub fn degrades_in_local_slot(ty: &Type) -> bool {
    matches!(ty, Type::Named { .. } | Type::Optional(_))
}

pub(crate) fn primitive_ir_type(kind: PrimitiveKind) -> IrType {
    use crate::ir::{FloatWidth, IntWidth};
    match kind {
        PrimitiveKind::I8 | PrimitiveKind::U8 => IrType::Int(IntWidth::W8),
        PrimitiveKind::I16 | PrimitiveKind::U16 => IrType::Int(IntWidth::W16),
        PrimitiveKind::I32 | PrimitiveKind::U32 => IrType::Int(IntWidth::W32),
        PrimitiveKind::I64 | PrimitiveKind::U64 => IrType::Int(IntWidth::W64),
        PrimitiveKind::I128 | PrimitiveKind::U128 => IrType::Int(IntWidth::W128),
        PrimitiveKind::F32 => IrType::Float(FloatWidth::W32),
        PrimitiveKind::F64 => IrType::Float(FloatWidth::W64),
        PrimitiveKind::Bool => IrType::BOOL,
        PrimitiveKind::Char => IrType::CHAR,
        PrimitiveKind::String => IrType::Pointer,
        PrimitiveKind::Void => IrType::Void,
    }
}

/// A canonical, collision-resistant name for an `Optional<T>` instance's
/// backing struct type, derived structurally so `Optional<i32>` always
/// gets the same name within and across modules.
pub fn optional_type_name(inner_name: &str) -> String {
    format!("Optional_{inner_name}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedKind {
    Struct,
    Enum,
}

impl<'st> Lowerer<'st> {
    /// Resolves `ty` to an [`IrType`], pushing a diagnostic and returning a
    /// recoverable default (32-bit integer) on failure rather than
    /// aborting the whole module, per spec.md §4.3's documented fallback
    /// ("recoverable to allow incremental development").
    pub fn resolve_type(&mut self, ty: &Type) -> IrType {
        match ty {
            Type::Primitive(kind) => primitive_ir_type(*kind),
            Type::Named { name, args } if args.is_empty() && self.type_aliases.contains_key(name) => {
                let target = self.type_aliases.get(name).cloned().expect("checked above");
                self.resolve_type(&target)
            }
            Type::Named { name, args } => self.resolve_named(name, args).0,
            Type::Array { elem, size } => {
                let elem_ty = self.resolve_type(elem);
                let len = if *size >= 0 { *size as u32 } else { DEFERRED_ARRAY_LEN };
                IrType::Array {
                    elem: Box::new(elem_ty),
                    len,
                }
            }
            Type::Optional(inner) => self.resolve_optional(inner),
            Type::Generic(param) => match self.substitute(param).cloned() {
                Some(concrete) => self.resolve_type(&concrete),
                None => {
                    self.push_error(CompileError::UnresolvedGeneric {
                        param_name: param.clone(),
                        location: self.error_location(),
                    });
                    IrType::I32
                }
            },
            Type::SelfType => self.resolve_self_type(),
        }
    }

    /// The full "precise type" used by expression lowering to choose load,
    /// GEP, and dispatch rules once generic names have been monomorphized.
    pub fn shape_of(&mut self, ty: &Type) -> Shape {
        match ty {
            Type::Primitive(PrimitiveKind::Void) => Shape::Void,
            Type::Primitive(kind) => Shape::Scalar(primitive_ir_type(*kind)),
            Type::Named { name, args } if args.is_empty() && self.type_aliases.contains_key(name) => {
                let target = self.type_aliases.get(name).cloned().expect("checked above");
                self.shape_of(&target)
            }
            Type::Named { name, args } => {
                let (ir, kind) = self.resolve_named(name, args);
                let concrete_name = match ir {
                    IrType::Named(n) => n,
                    _ => name.clone(),
                };
                match kind {
                    NamedKind::Struct => Shape::StructPtr(concrete_name),
                    NamedKind::Enum => Shape::Enum(concrete_name),
                }
            }
            Type::Optional(inner) => {
                let name = self.optional_name_for(inner);
                let inner_ir = self.resolve_boundary_type(inner);
                Shape::OptionalPtr {
                    name,
                    inner: inner_ir,
                }
            }
            Type::Array { elem, size } => {
                let elem_ir = self.resolve_type(elem);
                let len = if *size >= 0 { *size as u32 } else { DEFERRED_ARRAY_LEN };
                Shape::Array { elem: elem_ir, len }
            }
            Type::Generic(param) => match self.substitute(param).cloned() {
                Some(concrete) => self.shape_of(&concrete),
                None => {
                    self.resolve_type(ty);
                    Shape::Scalar(IrType::I32)
                }
            },
            Type::SelfType => {
                let name = self
                    .func
                    .as_ref()
                    .and_then(|f| f.current_struct.as_ref())
                    .map(|ctx| ctx.struct_name.clone());
                match name {
                    Some(name) => Shape::StructPtr(name),
                    None => {
                        self.push_error(CompileError::TypeNotFound {
                            name: "Self".to_owned(),
                            location: self.error_location(),
                        });
                        Shape::Scalar(IrType::I32)
                    }
                }
            }
        }
    }

    pub(crate) fn optional_name_for(&mut self, inner: &Type) -> String {
        let leaf = self.mangled_type_leaf(inner);
        let name = optional_type_name(&leaf);
        // The `value` field degrades the same way a function boundary
        // would: primitives stay inline, structs/optionals/arrays become
        // an opaque pointer. Keeps every field of the fixed 3-field
        // layout a plain scalar or pointer, never another aggregate.
        let inner_ir = self.resolve_boundary_type(inner);
        if !self.module.has_type(&name) {
            self.module.declare_opaque_type(&name);
            self.module.set_type_body(&name, optional_layout(inner_ir));
        }
        name
    }

    fn resolve_optional(&mut self, inner: &Type) -> IrType {
        let name = self.optional_name_for(inner);
        IrType::Named(name)
    }

    /// `Self`-aware boundary type for a method's own parameter/return type,
    /// resolved directly from the struct context already known at
    /// registration time — the general `Self` path (`resolve_self_type`)
    /// needs an active `FunctionContext`, which doesn't exist yet while a
    /// method's signature is still being computed.
    pub fn resolve_method_boundary_type(&mut self, ty: &Type, is_instance: bool, struct_name: &str) -> IrType {
        match ty {
            Type::SelfType if is_instance => IrType::Pointer,
            Type::SelfType => IrType::Named(struct_name.to_owned()),
            other => self.resolve_boundary_type(other),
        }
    }

    /// The `Self`-aware counterpart to `shape_of`, for the same reason as
    /// [`Self::resolve_method_boundary_type`].
    pub fn method_return_shape(&mut self, ty: &Type, struct_name: &str) -> Option<crate::symbol_table::NamedReturnShape> {
        match ty {
            Type::SelfType => Some(crate::symbol_table::NamedReturnShape::Struct(struct_name.to_owned())),
            other => self.shape_of(other).as_return_hint(),
        }
    }

    fn resolve_self_type(&mut self) -> IrType {
        let Some(func) = self.func.as_ref() else {
            self.push_error(CompileError::TypeNotFound {
                name: "Self".to_owned(),
                location: self.error_location(),
            });
            return IrType::I32;
        };
        match &func.current_struct {
            Some(ctx) if ctx.is_instance => IrType::Pointer,
            Some(ctx) => IrType::Named(ctx.struct_name.clone()),
            None => {
                self.push_error(CompileError::TypeNotFound {
                    name: "Self".to_owned(),
                    location: self.error_location(),
                });
                IrType::I32
            }
        }
    }

    /// Resolves a `Named(name, args)` type, instantiating generics on
    /// demand, importing cross-module types by name, and returning both
    /// the IR type (`Named(concrete_name)` uniformly — pointer wrapping
    /// happens at function/local boundaries, not here) and whether the
    /// underlying declaration is a struct or an enum.
    fn resolve_named(&mut self, name: &str, args: &[Type]) -> (IrType, NamedKind) {
        if let Some((owner, symbol)) = self.st.lookup(name, &self.module_name) {
            let owner = owner.to_owned();
            match symbol.clone() {
                Symbol::Type {
                    ast: TypeAst::Struct(decl),
                    ..
                } if decl.is_generic() => {
                    let ir = self.instantiate_struct(&owner, &decl, args);
                    return (ir, NamedKind::Struct);
                }
                Symbol::Type {
                    ast: TypeAst::Enum(decl),
                    ..
                } if decl.is_generic() => {
                    let ir = self.instantiate_enum(&owner, &decl, args);
                    return (ir, NamedKind::Enum);
                }
                Symbol::GenericStructInstance { ir_type, .. } => {
                    return (ir_type, NamedKind::Struct);
                }
                Symbol::Type {
                    ast: TypeAst::Struct(_),
                    ..
                } => {
                    if owner != self.module_name && !self.module.has_type(name) {
                        self.import_type(&owner, name);
                    }
                    return (IrType::Named(name.to_owned()), NamedKind::Struct);
                }
                Symbol::Type {
                    ast: TypeAst::Enum(_),
                    ..
                } => {
                    if owner != self.module_name && !self.module.has_type(name) {
                        self.import_type(&owner, name);
                    }
                    return (IrType::Named(name.to_owned()), NamedKind::Enum);
                }
                _ => {}
            }
        }

        self.push_error(CompileError::TypeNotFound {
            name: name.to_owned(),
            location: self.error_location(),
        });
        (IrType::I32, NamedKind::Struct)
    }

    /// A short, stable leaf name for a resolved type, used to build
    /// composite names like `Optional_i32` (spec.md's mangler, generalized
    /// to non-generic-instantiation contexts too).
    pub fn mangled_type_leaf(&self, ty: &Type) -> String {
        crate::generics::mangle_type_name(ty)
    }

    /// Registers a non-generic struct's IR body, pass 1 of the module
    /// compiler's two-pass lowering (spec.md §4.8): opaque declaration
    /// first (self-referential fields), field types resolved with the
    /// same boundary-degradation rule used everywhere else a struct's
    /// contents are laid out. A no-op if already registered.
    pub fn register_struct_type(&mut self, decl: &crate::ast::StructDecl) {
        if self.module.has_type(&decl.name) {
            return;
        }
        self.module.declare_opaque_type(&decl.name);
        let mut fields = Vec::with_capacity(decl.fields.len());
        let mut shapes = Vec::with_capacity(decl.fields.len());
        for f in &decl.fields {
            fields.push(self.resolve_boundary_type(&f.ty));
            shapes.push(self.shape_of(&f.ty));
        }
        self.module.set_type_body(&decl.name, crate::ir::StructBody { fields });
        self.field_shapes.insert(decl.name.clone(), shapes);
    }

    /// Registers a non-generic enum's uniform tagged-union body.
    pub fn register_enum_type(&mut self, decl: &crate::ast::EnumDecl) {
        if self.module.has_type(&decl.name) {
            return;
        }
        self.module.declare_opaque_type(&decl.name);
        self.module.set_type_body(&decl.name, crate::ir::enum_layout());
    }

    /// Whether `ty` names an enum (as opposed to a struct) — enums are
    /// value types and are exempt from the struct/optional/array
    /// boundary-degradation rule (spec.md §3/§4.6: "enums are value
    /// types"), even though [`degrades_at_boundary`]'s purely syntactic
    /// check can't tell the two apart from the AST alone.
    pub fn is_enum_named(&mut self, ty: &Type) -> bool {
        matches!(self.shape_of(ty), Shape::Enum(_))
    }

    /// Field names paired with their resolved IR types, in declaration
    /// order, for a struct already registered under `concrete_name` —
    /// needed by `Member`/`StructLiteral` lowering once a struct's
    /// original name has possibly been mangled away by monomorphization.
    pub fn struct_field_layout(&self, concrete_name: &str) -> Option<Vec<(String, IrType)>> {
        let body = self.module.types.get(concrete_name)?.clone();
        let names: Vec<String> = if let Some(Symbol::GenericStructInstance { ast, .. }) =
            self.st.lookup_in_module(&self.module_name, concrete_name)
        {
            ast.fields.iter().map(|f| f.name.clone()).collect()
        } else if let Some((_, Symbol::Type {
            ast: TypeAst::Struct(decl),
            ..
        })) = self.st.lookup(concrete_name, &self.module_name)
        {
            decl.fields.iter().map(|f| f.name.clone()).collect()
        } else {
            return None;
        };
        if names.len() != body.fields.len() {
            return None;
        }
        Some(names.into_iter().zip(body.fields).collect())
    }

    /// The declared variant list for an enum registered under
    /// `concrete_name`, generic template or not.
    pub fn enum_decl_for(&self, concrete_name: &str) -> Option<std::rc::Rc<crate::ast::EnumDecl>> {
        if let Some(Symbol::Type {
            ast: TypeAst::Enum(decl),
            ..
        }) = self.st.lookup_in_module(&self.module_name, concrete_name)
        {
            return Some(decl.clone());
        }
        if let Some((_, Symbol::Type {
            ast: TypeAst::Enum(decl),
            ..
        })) = self.st.lookup(concrete_name, &self.module_name)
        {
            return Some(decl.clone());
        }
        None
    }
}
