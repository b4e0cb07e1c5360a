//! The Generic Instantiator (spec.md §4.4): deterministic name mangling
//! plus on-demand monomorphization of generic functions, structs (with
//! their methods), and enums.
//!
//! `mangle`/`mangle_type_name` are pure functions — tested with `proptest`
//! for the injectivity property spec.md §8 requires ("for all `(V1, V2)`,
//! `mangle(g, V1) == mangle(g, V2)` implies `V1 == V2`"). Instantiation
//! itself needs the shared `SymbolTable` and the current module's IR
//! context, so it lives on `Lowerer` (see `lower/mod.rs`).

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{EnumDecl, FunctionDecl, Param, StructDecl, Type};
use crate::diagnostics::CompileError;
use crate::ir::{enum_layout, IrType, StructBody};
use crate::lower::{FunctionContext, Lowerer, LocalSlot, SlotStorage, StructContext};
use crate::symbol_table::{Symbol, TypeAst};
use crate::type_resolver::degrades_at_boundary;

/// The mangler's canonical leaf name for one type argument — primitives
/// lowercase, named types by their source name (recursively mangled for
/// nested generics), per spec.md §6.
pub fn mangle_type_name(ty: &Type) -> String {
    match ty {
        Type::Primitive(kind) => kind.canonical_name().to_owned(),
        Type::Named { name, args } if args.is_empty() => name.clone(),
        Type::Named { name, args } => mangle(name, args),
        Type::Optional(inner) => format!("opt_{}", mangle_type_name(inner)),
        Type::Array { elem, size } => format!("arr{}_{}", size.max(0), mangle_type_name(elem)),
        Type::Generic(param) => param.clone(),
        Type::SelfType => "Self".to_owned(),
    }
}

/// `mangle(base, args)` = `base` then, for each arg, `"_"` followed by its
/// canonical form — a pure function of its inputs (spec.md §4.4).
pub fn mangle(base: &str, args: &[Type]) -> String {
    let mut name = base.to_owned();
    for arg in args {
        name.push('_');
        name.push_str(&mangle_type_name(arg));
    }
    name
}

/// `method_<suffix>` where `suffix` is whatever follows the struct's base
/// name in its mangled name (spec.md §6).
pub fn mangle_method(method: &str, struct_mangled_suffix: &str) -> String {
    format!("{method}_{struct_mangled_suffix}")
}

impl<'st> Lowerer<'st> {
    fn substitution_scope(params: &[String], args: &[Type]) -> FxHashMap<String, Type> {
        params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect()
    }

    fn check_arity(&mut self, name: &str, expected: usize, got: usize) -> bool {
        if expected != got {
            self.push_error(CompileError::GenericArityMismatch {
                name: name.to_owned(),
                expected,
                got,
                location: self.error_location(),
            });
            false
        } else {
            true
        }
    }

    /// Computes a parameter's function-boundary IR type: struct/optional/
    /// array source types degrade to an opaque pointer (spec.md Glossary).
    pub fn resolve_boundary_type(&mut self, ty: &Type) -> IrType {
        if degrades_at_boundary(ty) {
            // Still resolve it, so the generic struct/enum it names gets
            // instantiated and its field layout registered even though the
            // caller only keeps the pointer.
            let resolved = self.resolve_type(ty);
            if matches!(ty, Type::Named { .. }) && self.is_enum_named(ty) {
                resolved
            } else {
                IrType::Pointer
            }
        } else {
            self.resolve_type(ty)
        }
    }

    /// Monomorphizes a generic function for `type_args`, returning its
    /// mangled IR name. A no-op if that mangled name is already
    /// registered (spec.md §4.4 step 1 / §8 idempotence).
    pub fn instantiate_function(
        &mut self,
        owner_module: &str,
        template: &Rc<FunctionDecl>,
        type_args: &[Type],
    ) -> String {
        let mangled = mangle(&template.name, type_args);
        if self.module.find_function(&mangled).is_some() {
            return mangled;
        }
        if !self.check_arity(&template.name, template.generic_params.len(), type_args.len()) {
            return mangled;
        }

        self.push_substitution(Self::substitution_scope(&template.generic_params, type_args));

        let param_types: Vec<IrType> = template
            .params
            .iter()
            .map(|p| self.resolve_boundary_type(&p.ty))
            .collect();
        let resolved_return = self.apply_substitution(&template.return_type);
        let ir_return_type = self.resolve_boundary_type(&resolved_return);

        self.module.add_function(crate::ir::IrFunction {
            name: mangled.clone(),
            param_types: param_types.clone(),
            return_type: ir_return_type.clone(),
            public: template.public,
            blocks: None,
            next_value_id: 0,
        });
        let return_shape = self.shape_of(&resolved_return).as_return_hint();
        self.st.declare_or_replace(
            &self.module_name.clone(),
            &mangled,
            Symbol::Function {
                ir_name: mangled.clone(),
                param_types: param_types.clone(),
                return_type: ir_return_type.clone(),
                return_shape,
            },
            template.public,
        );

        self.lower_function_body(
            &mangled,
            &template.params,
            &resolved_return,
            ir_return_type,
            param_types,
            &template.body,
            template.public,
            None,
        );

        self.pop_substitution();
        let _ = owner_module;
        mangled
    }

    /// Instantiates a generic struct: an opaque named type first (so a
    /// recursive field can reference it), then the field body, then every
    /// declared method under `method_<suffix>` (spec.md §4.4).
    pub fn instantiate_struct(&mut self, owner_module: &str, template: &Rc<StructDecl>, type_args: &[Type]) -> IrType {
        let mangled = mangle(&template.name, type_args);
        if self.module.has_type(&mangled) {
            return IrType::Named(mangled);
        }
        if !self.check_arity(&template.name, template.generic_params.len(), type_args.len()) {
            return IrType::Named(mangled);
        }

        self.module.declare_opaque_type(&mangled);

        self.push_substitution(Self::substitution_scope(&template.generic_params, type_args));
        let mut field_types = Vec::with_capacity(template.fields.len());
        let mut field_shapes = Vec::with_capacity(template.fields.len());
        for f in &template.fields {
            let resolved = self.apply_substitution(&f.ty);
            field_types.push(self.resolve_boundary_type(&resolved));
            field_shapes.push(self.shape_of(&resolved));
        }
        self.module.set_type_body(&mangled, StructBody { fields: field_types });
        self.field_shapes.insert(mangled.clone(), field_shapes);

        self.st.declare_or_replace(
            &self.module_name.clone(),
            &mangled,
            Symbol::GenericStructInstance {
                ir_type: IrType::Named(mangled.clone()),
                ast: template.clone(),
            },
            template.public,
        );

        let suffix = mangled.strip_prefix(&template.name).unwrap_or("").trim_start_matches('_').to_owned();
        for method in &template.methods {
            let method_mangled = mangle_method(&method.name, &suffix);
            if self.module.find_function(&method_mangled).is_some() {
                continue;
            }
            let is_instance = method
                .params
                .first()
                .map(|p| p.name == "self")
                .unwrap_or(false);
            let param_types: Vec<IrType> = method
                .params
                .iter()
                .map(|p| self.resolve_method_boundary_type(&p.ty, is_instance, &mangled))
                .collect();
            let ir_return_type = self.resolve_method_boundary_type(&method.return_type, is_instance, &mangled);

            self.module.add_function(crate::ir::IrFunction {
                name: method_mangled.clone(),
                param_types: param_types.clone(),
                return_type: ir_return_type.clone(),
                public: method.public,
                blocks: None,
                next_value_id: 0,
            });
            self.lower_function_body(
                &method_mangled,
                &method.params,
                &method.return_type,
                ir_return_type,
                param_types,
                &method.body,
                method.public,
                Some(StructContext {
                    struct_name: mangled.clone(),
                    is_instance,
                }),
            );
        }
        self.pop_substitution();

        let _ = owner_module;
        IrType::Named(mangled)
    }

    /// Enum instantiation only needs to register the mangled name and its
    /// (uniform) tagged-union definition — payload layout never varies
    /// with type arguments at this iteration (spec.md §4.4).
    pub fn instantiate_enum(&mut self, owner_module: &str, template: &Rc<EnumDecl>, type_args: &[Type]) -> IrType {
        let mangled = mangle(&template.name, type_args);
        if !self.module.has_type(&mangled) {
            if !self.check_arity(&template.name, template.generic_params.len(), type_args.len()) {
                return IrType::Named(mangled);
            }
            self.module.declare_opaque_type(&mangled);
            self.module.set_type_body(&mangled, enum_layout());
            self.st.declare_or_replace(
                &self.module_name.clone(),
                &mangled,
                Symbol::Type {
                    ir_type: Some(IrType::Named(mangled.clone())),
                    ast: TypeAst::Enum(template.clone()),
                },
                template.public,
            );
        }
        let _ = owner_module;
        IrType::Named(mangled)
    }

    /// Lowers one function/method body under the given parameter/return
    /// shape, starting a fresh [`FunctionContext`] and materializing one
    /// slot per parameter (spec.md §4.7 "Function").
    #[allow(clippy::too_many_arguments)]
    pub fn lower_function_body(
        &mut self,
        ir_name: &str,
        source_params: &[Param],
        source_return: &Type,
        ir_return_type: IrType,
        param_ir_types: Vec<IrType>,
        body: &[crate::ast::Stmt],
        public: bool,
        struct_ctx: Option<StructContext>,
    ) {
        let (mut ctx, param_values) = FunctionContext::new(&param_ir_types, source_return.clone(), ir_return_type.clone());
        ctx.current_struct = struct_ctx;
        self.func = Some(ctx);

        for (param, (param_ty, value)) in source_params.iter().zip(param_ir_types.iter().zip(param_values.into_iter())) {
            let is_enum = matches!(param.ty, Type::Named { .. }) && self.is_enum_named(&param.ty);
            let alloca_ty = if degrades_at_boundary(&param.ty) && !is_enum {
                IrType::Pointer
            } else {
                param_ty.clone()
            };
            let ptr = match self.func().builder.alloca(alloca_ty.clone()) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let _ = self.func().builder.store(ptr.clone(), value);

            let array_elem_ty = match &param.ty {
                Type::Array { elem, .. } => Some(self.resolve_type(elem)),
                _ => None,
            };
            let storage = if is_enum {
                SlotStorage::Scalar
            } else {
                match &param.ty {
                    Type::Named { .. } | Type::Optional(_) => SlotStorage::PointerBacked,
                    Type::Array { .. } => SlotStorage::PointerBacked,
                    _ => SlotStorage::Scalar,
                }
            };
            self.func().declare_local(
                param.name.clone(),
                LocalSlot {
                    ptr,
                    source_type: param.ty.clone(),
                    value_ir_type: param_ty.clone(),
                    storage,
                    array_elem_ty,
                    mutable: true,
                },
            );
        }

        self.lower_block(body);

        let mut func = self.func.take().expect("function context set above");
        if !func.builder.is_current_terminated() {
            // fallthrough without explicit `return`: spec.md §4.7 "insert
            // a default return if control fell off".
            let default = if ir_return_type.is_void() {
                None
            } else {
                Some(default_zero_value(&ir_return_type))
            };
            let _ = func.builder.ret(default);
        }
        let builder = func.builder;
        let finished = builder.finish(ir_name.to_owned(), param_ir_types, ir_return_type, public);
        if let Some(existing) = self.module.find_function_mut(ir_name) {
            *existing = finished;
        } else {
            self.module.add_function(finished);
        }
    }
}

/// The zero value of an [`IrType`] — used both for a function falling off
/// its end without an explicit `return` (spec.md §4.7) and for `match`'s
/// default arm (spec.md §4.6: "the zero value of the inferred result
/// type").
pub(crate) fn default_zero_value(ty: &IrType) -> crate::ir::IrValue {
    use crate::ir::{Const, FloatWidth, IrValue};
    match ty {
        IrType::Void => IrValue::const_i32(0),
        IrType::Int(width) => IrValue::Const(
            Const::Int {
                width_bits: width.bits(),
                value: 0,
            },
            IrType::Int(*width),
        ),
        IrType::Float(width) => IrValue::Const(
            Const::Float {
                is_f64: matches!(width, FloatWidth::W64),
                bits: 0,
            },
            IrType::Float(*width),
        ),
        IrType::Pointer => IrValue::null_ptr(),
        IrType::Array { .. } | IrType::Named(_) => IrValue::null_ptr(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PrimitiveKind;
    use proptest::prelude::*;

    fn prim(kind: PrimitiveKind) -> Type {
        Type::Primitive(kind)
    }

    #[test]
    fn mangle_matches_spec_example() {
        assert_eq!(mangle("id", &[prim(PrimitiveKind::I32)]), "id_i32");
    }

    #[test]
    fn mangle_method_uses_suffix() {
        assert_eq!(mangle_method("push", "i32"), "push_i32");
    }

    proptest! {
        #[test]
        fn mangling_is_injective_for_primitive_vectors(
            a in prop::collection::vec(0u8..10, 1..4),
            b in prop::collection::vec(0u8..10, 1..4),
        ) {
            let kinds = [
                PrimitiveKind::I8, PrimitiveKind::I16, PrimitiveKind::I32, PrimitiveKind::I64,
                PrimitiveKind::U8, PrimitiveKind::U16, PrimitiveKind::U32, PrimitiveKind::U64,
                PrimitiveKind::F32, PrimitiveKind::Bool,
            ];
            let to_types = |v: &[u8]| -> Vec<Type> {
                v.iter().map(|i| prim(kinds[*i as usize % kinds.len()])).collect()
            };
            let va = to_types(&a);
            let vb = to_types(&b);
            let ma = mangle("g", &va);
            let mb = mangle("g", &vb);
            prop_assert!((ma == mb) == (va == vb));
        }
    }
}
