//! Expression Lowering (spec.md §4.6): turns one [`Expr`] node into an
//! [`IrValue`] plus its [`Shape`], emitting instructions into the active
//! function's [`crate::ir::Builder`] as it goes.

use crate::ast::{AssignTarget, BinOp, EnumDecl, Expr, MatchArm, Pattern, PrimitiveKind, Type, UnOp};
use crate::diagnostics::CompileError;
use crate::generics::default_zero_value;
use crate::ir::{BlockId, CastOp, Const, FloatWidth, GepIndex, IrBinOp, IrType, IrUnOp, IrValue, ir_type_size_bytes};
use crate::lower::{FunctionContext, LocalSlot, Lowerer, Shape, SlotStorage};
use crate::symbol_table::Symbol;

/// The tag-test target for `is`/`match`: either a user-declared enum (tag
/// index from its [`EnumDecl`]) or the built-in `Optional<T>` sum type,
/// whose two "variants" (`Value`/`Error`) aren't registered in the Symbol
/// Table at all — they're a hardcoded contract on the 3-field layout
/// (spec.md §3).
enum TagTarget {
    UserEnum(String),
    Optional { inner: IrType },
}

impl<'st> Lowerer<'st> {
    pub fn lower_expr(&mut self, expr: &Expr) -> (IrValue, Shape) {
        match expr {
            Expr::Integer { value, .. } => (
                IrValue::Const(
                    Const::Int {
                        width_bits: 32,
                        value: *value,
                    },
                    IrType::I32,
                ),
                Shape::Scalar(IrType::I32),
            ),
            Expr::Float { value, .. } => (
                IrValue::Const(
                    Const::Float {
                        is_f64: true,
                        bits: value.to_bits(),
                    },
                    IrType::Float(FloatWidth::W64),
                ),
                Shape::Scalar(IrType::Float(FloatWidth::W64)),
            ),
            Expr::Bool { value, .. } => (IrValue::const_bool(*value), Shape::Scalar(IrType::BOOL)),
            Expr::Str { value, .. } => {
                let name = self.module.intern_string(value);
                (IrValue::Const(Const::StringPtr(name), IrType::Pointer), Shape::Scalar(IrType::Pointer))
            }
            Expr::Char { value, .. } => (
                IrValue::Const(
                    Const::Int {
                        width_bits: 8,
                        value: *value as i64,
                    },
                    IrType::CHAR,
                ),
                Shape::Scalar(IrType::CHAR),
            ),
            Expr::Identifier { name, .. } => self.lower_identifier(name),
            Expr::Binary { op, lhs, rhs, .. } => self.lower_binary(*op, lhs, rhs),
            Expr::Unary { op, operand, .. } => self.lower_unary(*op, operand),
            Expr::Call { module, name, type_args, args, .. } => match module {
                Some(owner) => self.lower_cross_module_call(owner, name, type_args, args),
                None => self.lower_local_call(name, type_args, args),
            },
            Expr::MethodCall { receiver, method, type_args, args, is_static, .. } => {
                if *is_static {
                    self.lower_static_method_call(receiver, method, type_args, args)
                } else {
                    self.lower_global_method_call(method, Some(receiver), args)
                }
            }
            Expr::Assign { target, value, .. } => self.lower_assign(target, value),
            Expr::StructLiteral { name, type_args, fields, .. } => self.lower_struct_literal(name, type_args, fields),
            Expr::EnumVariant { enum_name, variant, args, .. } => self.lower_enum_variant(enum_name, variant, args),
            Expr::ArrayLiteral { .. } => (IrValue::const_i32(0), Shape::Void),
            Expr::Index { base, index, .. } => self.lower_index(base, index),
            Expr::Member { base, field, .. } => self.lower_member(base, field),
            Expr::Match { scrutinee, arms, .. } => self.lower_match(scrutinee, arms),
            Expr::Is { scrutinee, variant, .. } => {
                let (cmp, _, _) = self.lower_is_test(scrutinee, variant);
                (cmp.clone(), Shape::Scalar(cmp.ty().clone()))
            }
            Expr::If { condition, then_branch, else_branch, .. } => self.lower_if_expr(condition, then_branch, else_branch),
            Expr::As { expr, target, .. } => self.lower_as(expr, target),
            Expr::Try { expr, .. } => self.lower_try(expr),
            Expr::Ok { value, .. } => self.lower_ok(value),
            Expr::Err { message, .. } => self.lower_err(message),
        }
    }

    // ---- literals / identifiers -----------------------------------------

    fn lower_identifier(&mut self, name: &str) -> (IrValue, Shape) {
        let Some(slot) = self.func().find_local(name).cloned() else {
            self.push_error(CompileError::SymbolNotFound {
                qualified_name: name.to_owned(),
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        self.load_slot(&slot)
    }

    fn load_slot(&mut self, slot: &LocalSlot) -> (IrValue, Shape) {
        let shape = self.shape_of(&slot.source_type);
        match slot.storage {
            SlotStorage::DirectArray => (slot.ptr.clone(), shape),
            SlotStorage::PointerBacked => {
                let loaded = self.func().builder.load(slot.ptr.clone(), IrType::Pointer).unwrap_or(IrValue::null_ptr());
                (loaded, shape)
            }
            SlotStorage::Scalar => {
                let loaded = self
                    .func()
                    .builder
                    .load(slot.ptr.clone(), slot.value_ir_type.clone())
                    .unwrap_or(IrValue::const_i32(0));
                (loaded, shape)
            }
        }
    }

    /// Returns the address of `expr`'s storage, spilling a freshly-computed
    /// value to a stack slot when it isn't already addressable (spec.md
    /// §4.6 "Match: spill the scrutinee if it is not already addressable").
    fn addressable(&mut self, expr: &Expr) -> (IrValue, Shape) {
        if let Expr::Identifier { name, .. } = expr {
            if let Some(slot) = self.func().find_local(name).cloned() {
                let shape = self.shape_of(&slot.source_type);
                match slot.storage {
                    SlotStorage::DirectArray => return (slot.ptr.clone(), shape),
                    SlotStorage::Scalar if matches!(shape, Shape::Enum(_)) => return (slot.ptr.clone(), shape),
                    SlotStorage::PointerBacked => {
                        let loaded = self.func().builder.load(slot.ptr.clone(), IrType::Pointer).unwrap_or(IrValue::null_ptr());
                        return (loaded, shape);
                    }
                    SlotStorage::Scalar => {}
                }
            }
        }
        let (value, shape) = self.lower_expr(expr);
        if value.ty().is_pointer() {
            return (value, shape);
        }
        let ptr = self.func().builder.alloca(value.ty().clone()).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(ptr.clone(), value);
        (ptr, shape)
    }

    // ---- binary / unary ---------------------------------------------------

    fn lower_binary(&mut self, op: BinOp, lhs_e: &Expr, rhs_e: &Expr) -> (IrValue, Shape) {
        let (lhs, _) = self.lower_expr(lhs_e);
        let (rhs, _) = self.lower_expr(rhs_e);
        if matches!(op, BinOp::Add) && lhs.ty().is_pointer() && rhs.ty().is_pointer() {
            return self.lower_string_concat(lhs, rhs);
        }
        let is_float = matches!(lhs.ty(), IrType::Float(_)) || matches!(rhs.ty(), IrType::Float(_));
        let (l, r) = if is_float { (lhs, rhs) } else { self.promote_ints(lhs, rhs) };
        let irop = match op {
            BinOp::Add => if is_float { IrBinOp::FAdd } else { IrBinOp::Add },
            BinOp::Sub => if is_float { IrBinOp::FSub } else { IrBinOp::Sub },
            BinOp::Mul => if is_float { IrBinOp::FMul } else { IrBinOp::Mul },
            BinOp::Div => if is_float { IrBinOp::FDiv } else { IrBinOp::SDiv },
            BinOp::Mod => IrBinOp::SRem,
            BinOp::Eq => IrBinOp::Eq,
            BinOp::Ne => IrBinOp::Ne,
            BinOp::Lt => IrBinOp::SLt,
            BinOp::Le => IrBinOp::SLe,
            BinOp::Gt => IrBinOp::SGt,
            BinOp::Ge => IrBinOp::SGe,
            BinOp::And => IrBinOp::And,
            BinOp::Or => IrBinOp::Or,
        };
        let value = self.func().builder.bin_op(irop, l, r).unwrap_or(IrValue::const_i32(0));
        let shape = Shape::Scalar(value.ty().clone());
        (value, shape)
    }

    /// Sign-extends the narrower of two integer operands to match the
    /// wider one's width (spec.md §4.6 "operands must share an integer
    /// width; promote the narrower by sign-extension").
    fn promote_ints(&mut self, lhs: IrValue, rhs: IrValue) -> (IrValue, IrValue) {
        match (lhs.ty().clone(), rhs.ty().clone()) {
            (IrType::Int(lw), IrType::Int(rw)) if lw != rw => {
                if lw < rw {
                    let extended = self.func().builder.cast(CastOp::SignExtend, lhs.clone(), IrType::Int(rw)).unwrap_or(lhs);
                    (extended, rhs)
                } else {
                    let extended = self.func().builder.cast(CastOp::SignExtend, rhs.clone(), IrType::Int(lw)).unwrap_or(rhs);
                    (lhs, extended)
                }
            }
            _ => (lhs, rhs),
        }
    }

    fn lower_string_concat(&mut self, lhs: IrValue, rhs: IrValue) -> (IrValue, Shape) {
        self.ensure_runtime_decl("strlen");
        self.ensure_runtime_decl("malloc");
        self.ensure_runtime_decl("strcpy");
        self.ensure_runtime_decl("strcat");
        let len1 = self.func().builder.call("strlen", vec![lhs.clone()], IrType::I64).unwrap_or(IrValue::const_i64(0));
        let len2 = self.func().builder.call("strlen", vec![rhs.clone()], IrType::I64).unwrap_or(IrValue::const_i64(0));
        let total = self.func().builder.bin_op(IrBinOp::Add, len1, len2).unwrap_or(IrValue::const_i64(0));
        let total_plus1 = self
            .func()
            .builder
            .bin_op(IrBinOp::Add, total, IrValue::const_i64(1))
            .unwrap_or(IrValue::const_i64(0));
        let buf = self.func().builder.call("malloc", vec![total_plus1], IrType::Pointer).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.call("strcpy", vec![buf.clone(), lhs], IrType::Pointer);
        let _ = self.func().builder.call("strcat", vec![buf.clone(), rhs], IrType::Pointer);
        (buf, Shape::Scalar(IrType::Pointer))
    }

    fn lower_unary(&mut self, op: UnOp, operand_e: &Expr) -> (IrValue, Shape) {
        let (value, _) = self.lower_expr(operand_e);
        let irop = match op {
            UnOp::Neg => IrUnOp::Neg,
            UnOp::Not => IrUnOp::Not,
        };
        let result = self.func().builder.un_op(irop, value).unwrap_or(IrValue::const_i32(0));
        let shape = Shape::Scalar(result.ty().clone());
        (result, shape)
    }

    /// Widens or narrows `value` to `target` when both are integers of
    /// different widths; otherwise a no-op.
    pub(crate) fn coerce_int_width(&mut self, value: IrValue, target: IrType) -> IrValue {
        match (value.ty().clone(), target.clone()) {
            (IrType::Int(a), IrType::Int(b)) if a != b => {
                let op = if a < b { CastOp::SignExtend } else { CastOp::Truncate };
                self.func().builder.cast(op, value, target).unwrap_or_else(|_| IrValue::const_i32(0))
            }
            _ => value,
        }
    }

    fn lower_as(&mut self, expr: &Expr, target: &Type) -> (IrValue, Shape) {
        let (value, _) = self.lower_expr(expr);
        let target_ir = self.resolve_type(target);
        if *value.ty() == target_ir {
            return (value.clone(), Shape::Scalar(target_ir));
        }
        let op = match (value.ty(), &target_ir) {
            (IrType::Int(a), IrType::Int(b)) => if a < b { CastOp::SignExtend } else { CastOp::Truncate },
            (IrType::Int(_), IrType::Float(_)) => CastOp::IntToFloat,
            (IrType::Float(_), IrType::Int(_)) => CastOp::FloatToInt,
            (IrType::Float(FloatWidth::W32), IrType::Float(FloatWidth::W64)) => CastOp::FloatExtend,
            (IrType::Float(FloatWidth::W64), IrType::Float(FloatWidth::W32)) => CastOp::FloatTruncate,
            _ => CastOp::NoOp,
        };
        let result = self.func().builder.cast(op, value, target_ir.clone()).unwrap_or(IrValue::const_i32(0));
        (result, Shape::Scalar(target_ir))
    }

    // ---- assignment / member / index --------------------------------------

    fn lower_assign(&mut self, target: &AssignTarget, value_e: &Expr) -> (IrValue, Shape) {
        let (value, vshape) = self.lower_expr(value_e);
        match target {
            AssignTarget::Identifier(name) => {
                let Some(slot) = self.func().find_local(name).cloned() else {
                    self.push_error(CompileError::SymbolNotFound {
                        qualified_name: name.clone(),
                        location: self.error_location(),
                    });
                    return (value, vshape);
                };
                let coerced = self.coerce_int_width(value, slot.value_ir_type.clone());
                let _ = self.func().builder.store(slot.ptr.clone(), coerced.clone());
                let shape = self.shape_of(&slot.source_type);
                (coerced, shape)
            }
            AssignTarget::Index { base, index } => {
                let (elem_ptr, elem_ty) = self.index_address(base, index);
                let coerced = self.coerce_int_width(value, elem_ty.clone());
                let _ = self.func().builder.store(elem_ptr, coerced.clone());
                (coerced, Shape::Scalar(elem_ty))
            }
            AssignTarget::Member { base, field } => {
                let (ptr, shape) = self.addressable(base);
                let Some(struct_name) = self.struct_name_for_shape(&shape, field) else {
                    self.push_error(CompileError::TypeNotFound {
                        name: field.clone(),
                        location: self.error_location(),
                    });
                    return (value, vshape);
                };
                let Some(layout) = self.struct_field_layout(&struct_name) else {
                    return (value, vshape);
                };
                let Some(idx) = layout.iter().position(|(n, _)| n == field) else {
                    self.push_error(CompileError::TypeNotFound {
                        name: format!("{struct_name}::{field}"),
                        location: self.error_location(),
                    });
                    return (value, vshape);
                };
                let field_ty = layout[idx].1.clone();
                let coerced = self.coerce_int_width(value, field_ty.clone());
                let field_ptr = self.func().builder.gep(ptr, vec![GepIndex::Field(idx as u32)], field_ty.clone()).unwrap_or(IrValue::null_ptr());
                let _ = self.func().builder.store(field_ptr, coerced.clone());
                (coerced, Shape::Scalar(field_ty))
            }
        }
    }

    fn struct_name_for_shape(&mut self, shape: &Shape, field: &str) -> Option<String> {
        match shape {
            Shape::StructPtr(name) => Some(name.clone()),
            _ => self.fallback_struct_for_field(field),
        }
    }

    /// Deterministic (sorted) search over this module's registered structs
    /// for one declaring a field named `field` — the fallback path spec.md
    /// §4.6 describes for a receiver whose precise struct type isn't known.
    fn fallback_struct_for_field(&mut self, field: &str) -> Option<String> {
        let mut names: Vec<String> = self.module.types.keys().cloned().collect();
        names.sort();
        for name in names {
            if let Some(layout) = self.struct_field_layout(&name) {
                if layout.iter().any(|(n, _)| n == field) {
                    return Some(name);
                }
            }
        }
        None
    }

    fn lower_member(&mut self, base: &Expr, field: &str) -> (IrValue, Shape) {
        let (ptr, shape) = self.addressable(base);
        let Some(struct_name) = self.struct_name_for_shape(&shape, field) else {
            self.push_error(CompileError::TypeNotFound {
                name: field.to_owned(),
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        let Some(layout) = self.struct_field_layout(&struct_name) else {
            self.push_error(CompileError::TypeNotFound {
                name: struct_name,
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        let Some(idx) = layout.iter().position(|(n, _)| n == field) else {
            self.push_error(CompileError::TypeNotFound {
                name: format!("{struct_name}::{field}"),
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        let field_ty = layout[idx].1.clone();
        let field_ptr = self.func().builder.gep(ptr, vec![GepIndex::Field(idx as u32)], field_ty.clone()).unwrap_or(IrValue::null_ptr());
        let value = self.func().builder.load(field_ptr, field_ty.clone()).unwrap_or(IrValue::const_i32(0));
        let result_shape = self
            .field_shapes
            .get(&struct_name)
            .and_then(|v| v.get(idx))
            .cloned()
            .unwrap_or(Shape::Scalar(field_ty));
        (value, result_shape)
    }

    /// Computes the address of `base[index]` — for arrays, GEPs into the
    /// direct-array slot or the decayed parameter pointer; otherwise treats
    /// `base` as a string and indexes its characters (spec.md §4.6
    /// "Index").
    fn index_address(&mut self, base: &Expr, index_e: &Expr) -> (IrValue, IrType) {
        let (index_val, _) = self.lower_expr(index_e);
        if let Expr::Identifier { name, .. } = base {
            if let Some(slot) = self.func().find_local(name).cloned() {
                if let Some(elem_ty) = slot.array_elem_ty.clone() {
                    let (base_ptr, indices) = match slot.storage {
                        SlotStorage::DirectArray => (slot.ptr.clone(), vec![GepIndex::Field(0), GepIndex::Dynamic(index_val)]),
                        _ => {
                            let loaded = self.func().builder.load(slot.ptr.clone(), IrType::Pointer).unwrap_or(IrValue::null_ptr());
                            (loaded, vec![GepIndex::Dynamic(index_val)])
                        }
                    };
                    let ptr = self.func().builder.gep(base_ptr, indices, elem_ty.clone()).unwrap_or(IrValue::null_ptr());
                    return (ptr, elem_ty);
                }
            }
        }
        let (base_val, _) = self.lower_expr(base);
        let ptr = self.func().builder.gep(base_val, vec![GepIndex::Dynamic(index_val)], IrType::CHAR).unwrap_or(IrValue::null_ptr());
        (ptr, IrType::CHAR)
    }

    fn lower_index(&mut self, base: &Expr, index_e: &Expr) -> (IrValue, Shape) {
        let (ptr, elem_ty) = self.index_address(base, index_e);
        let value = self.func().builder.load(ptr, elem_ty.clone()).unwrap_or(IrValue::const_i32(0));
        (value, Shape::Scalar(elem_ty))
    }

    // ---- struct literal / enum variant / optional -------------------------

    fn heap_copy(&mut self, stack_ptr: IrValue, type_name: &str) -> IrValue {
        let size: u32 = self
            .module
            .types
            .get(type_name)
            .map(|body| body.fields.iter().map(ir_type_size_bytes).sum())
            .unwrap_or(0);
        self.ensure_runtime_decl("malloc");
        self.ensure_runtime_decl("memcpy");
        let heap = self.func().builder.call("malloc", vec![IrValue::const_i64(size as i64)], IrType::Pointer).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.call("memcpy", vec![heap.clone(), stack_ptr, IrValue::const_i64(size as i64)], IrType::Pointer);
        heap
    }

    fn lower_struct_literal(&mut self, name: &str, type_args: &[Type], fields: &[(String, Expr)]) -> (IrValue, Shape) {
        let resolved = self.resolve_type(&Type::Named {
            name: name.to_owned(),
            args: type_args.to_vec(),
        });
        let concrete = match &resolved {
            IrType::Named(n) => n.clone(),
            _ => name.to_owned(),
        };
        let Some(layout) = self.struct_field_layout(&concrete) else {
            self.push_error(CompileError::TypeNotFound {
                name: name.to_owned(),
                location: self.error_location(),
            });
            return (IrValue::null_ptr(), Shape::StructPtr(concrete));
        };
        let stack = self.func().builder.alloca(IrType::Named(concrete.clone())).unwrap_or(IrValue::null_ptr());
        for (field_name, field_expr) in fields {
            let Some(idx) = layout.iter().position(|(n, _)| n == field_name) else {
                continue;
            };
            let field_ty = layout[idx].1.clone();
            let (value, _) = self.lower_expr(field_expr);
            let coerced = self.coerce_int_width(value, field_ty.clone());
            let field_ptr = self.func().builder.gep(stack.clone(), vec![GepIndex::Field(idx as u32)], field_ty).unwrap_or(IrValue::null_ptr());
            let _ = self.func().builder.store(field_ptr, coerced);
        }
        let heap = self.heap_copy(stack, &concrete);
        (heap, Shape::StructPtr(concrete))
    }

    fn resolve_enum_name(&mut self, enum_name: &str) -> String {
        match self.shape_of(&Type::named(enum_name)) {
            Shape::Enum(name) => name,
            _ => enum_name.to_owned(),
        }
    }

    fn lower_enum_variant(&mut self, enum_name: &str, variant: &str, args: &[Expr]) -> (IrValue, Shape) {
        let concrete = self.resolve_enum_name(enum_name);
        let Some(decl) = self.enum_decl_for(&concrete) else {
            self.push_error(CompileError::TypeNotFound {
                name: enum_name.to_owned(),
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        let Some(tag) = decl.variant_index(variant) else {
            self.push_error(CompileError::TypeNotFound {
                name: format!("{enum_name}::{variant}"),
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        if !self.module.has_type(&concrete) {
            self.module.declare_opaque_type(&concrete);
            self.module.set_type_body(&concrete, crate::ir::enum_layout());
        }
        let ptr = self.func().builder.alloca(IrType::Named(concrete.clone())).unwrap_or(IrValue::null_ptr());
        let tag_ptr = self.func().builder.gep(ptr.clone(), vec![GepIndex::Field(0)], IrType::I32).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(tag_ptr, IrValue::const_i32(tag as i32));
        if let Some(first_arg) = args.first() {
            let (value, _) = self.lower_expr(first_arg);
            let coerced = self.coerce_int_width(value, IrType::I64);
            let data_ptr = self.func().builder.gep(ptr.clone(), vec![GepIndex::Field(1)], IrType::I64).unwrap_or(IrValue::null_ptr());
            let _ = self.func().builder.store(data_ptr, coerced);
        }
        let loaded = self.func().builder.load(ptr, IrType::Named(concrete.clone())).unwrap_or(IrValue::const_i32(0));
        (loaded, Shape::Enum(concrete))
    }

    /// The `Optional<T>` the currently-lowering function declares as its
    /// return type — `ok`/`err` are only meaningful inside such a function
    /// (spec.md §4.3).
    fn current_optional_inner(&mut self) -> Type {
        match self.func().return_type.clone() {
            Type::Optional(inner) => *inner,
            other => other,
        }
    }

    fn lower_ok(&mut self, value_expr: &Expr) -> (IrValue, Shape) {
        let inner = self.current_optional_inner();
        let name = self.optional_name_for(&inner);
        let inner_ir = self.resolve_boundary_type(&inner);
        let (value, _) = self.lower_expr(value_expr);
        let coerced = self.coerce_int_width(value, inner_ir.clone());
        let stack = self.func().builder.alloca(IrType::Named(name.clone())).unwrap_or(IrValue::null_ptr());
        let tag_ptr = self.func().builder.gep(stack.clone(), vec![GepIndex::Field(0)], IrType::I32).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(tag_ptr, IrValue::const_i32(0));
        let value_ptr = self.func().builder.gep(stack.clone(), vec![GepIndex::Field(1)], inner_ir.clone()).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(value_ptr, coerced);
        let error_ptr = self.func().builder.gep(stack.clone(), vec![GepIndex::Field(2)], IrType::Pointer).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(error_ptr, IrValue::null_ptr());
        let heap = self.heap_copy(stack, &name);
        (heap, Shape::OptionalPtr { name, inner: inner_ir })
    }

    fn lower_err(&mut self, message_expr: &Expr) -> (IrValue, Shape) {
        let inner = self.current_optional_inner();
        let name = self.optional_name_for(&inner);
        let inner_ir = self.resolve_boundary_type(&inner);
        let (message, _) = self.lower_expr(message_expr);
        let stack = self.func().builder.alloca(IrType::Named(name.clone())).unwrap_or(IrValue::null_ptr());
        let tag_ptr = self.func().builder.gep(stack.clone(), vec![GepIndex::Field(0)], IrType::I32).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(tag_ptr, IrValue::const_i32(1));
        let value_ptr = self.func().builder.gep(stack.clone(), vec![GepIndex::Field(1)], inner_ir.clone()).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(value_ptr, default_zero_value(&inner_ir));
        let error_ptr = self.func().builder.gep(stack.clone(), vec![GepIndex::Field(2)], IrType::Pointer).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(error_ptr, message);
        let heap = self.heap_copy(stack, &name);
        (heap, Shape::OptionalPtr { name, inner: inner_ir })
    }

    fn lower_try(&mut self, expr: &Expr) -> (IrValue, Shape) {
        let (ptr, shape) = self.lower_expr(expr);
        let Shape::OptionalPtr { inner, .. } = shape else {
            self.push_error(CompileError::InvalidTryTarget {
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        let tag_ptr = self.func().builder.gep(ptr.clone(), vec![GepIndex::Field(0)], IrType::I32).unwrap_or(IrValue::null_ptr());
        let tag = self.func().builder.load(tag_ptr, IrType::I32).unwrap_or(IrValue::const_i32(0));
        let is_err = self.func().builder.bin_op(IrBinOp::Eq, tag, IrValue::const_i32(1)).unwrap_or(IrValue::const_bool(false));

        let err_block = self.func().builder.new_block();
        let ok_block = self.func().builder.new_block();
        let _ = self.func().builder.cond_br(is_err, err_block, ok_block);

        self.func().builder.switch_to(err_block);
        let _ = self.func().builder.ret(Some(ptr.clone()));

        self.func().builder.switch_to(ok_block);
        let value_ptr = self.func().builder.gep(ptr, vec![GepIndex::Field(1)], inner.clone()).unwrap_or(IrValue::null_ptr());
        let value = self.func().builder.load(value_ptr, inner.clone()).unwrap_or(IrValue::const_i32(0));
        (value, Shape::Scalar(inner))
    }

    // ---- is / match ---------------------------------------------------

    fn sum_type_for(&mut self, shape: &Shape) -> Option<TagTarget> {
        match shape {
            Shape::Enum(name) => Some(TagTarget::UserEnum(name.clone())),
            Shape::OptionalPtr { inner, .. } => Some(TagTarget::Optional { inner: inner.clone() }),
            _ => None,
        }
    }

    fn variant_index_for(&mut self, target: &TagTarget, variant: &str) -> u32 {
        match target {
            TagTarget::UserEnum(name) => self.enum_decl_for(name).and_then(|d| d.variant_index(variant)).unwrap_or(0),
            TagTarget::Optional { .. } => {
                if variant == "Error" {
                    1
                } else {
                    0
                }
            }
        }
    }

    fn load_tag(&mut self, ptr: IrValue) -> IrValue {
        let tag_ptr = self.func().builder.gep(ptr, vec![GepIndex::Field(0)], IrType::I32).unwrap_or(IrValue::null_ptr());
        self.func().builder.load(tag_ptr, IrType::I32).unwrap_or(IrValue::const_i32(0))
    }

    /// Binds a single pattern variable for one arm of `is`/`match`, reading
    /// the payload from the appropriate field of the scrutinee's layout
    /// (spec.md §4.6 "Value binds to the value field ... Error binds to the
    /// error message pointer").
    fn bind_payload(&mut self, target: &TagTarget, variant: &str, ptr: IrValue, binding: &str) {
        let (field_idx, field_ty, source_ty) = match target {
            TagTarget::UserEnum(name) => {
                let payload_ty = self
                    .enum_decl_for(name)
                    .and_then(|d| d.variants.iter().find(|v| v.name == variant).and_then(|v| v.associated_types.first().cloned()))
                    .unwrap_or(Type::Primitive(PrimitiveKind::I32));
                let declared_ir = self.resolve_type(&payload_ty);
                (1u32, declared_ir, payload_ty)
            }
            TagTarget::Optional { inner } => {
                if variant == "Error" {
                    (2u32, IrType::Pointer, Type::Primitive(PrimitiveKind::String))
                } else {
                    (1u32, inner.clone(), Type::Primitive(PrimitiveKind::I32))
                }
            }
        };
        let field_ptr = self.func().builder.gep(ptr, vec![GepIndex::Field(field_idx)], field_ty.clone()).unwrap_or(IrValue::null_ptr());
        let raw = self.func().builder.load(field_ptr, field_ty.clone()).unwrap_or(default_zero_value(&field_ty));
        let coerced = if field_idx == 1 {
            match &target {
                TagTarget::UserEnum(_) => self.coerce_int_width(raw, field_ty.clone()),
                TagTarget::Optional { .. } => raw,
            }
        } else {
            raw
        };
        let slot_ptr = self.func().builder.alloca(field_ty.clone()).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(slot_ptr.clone(), coerced);
        self.func().declare_local(
            binding.to_owned(),
            LocalSlot {
                ptr: slot_ptr,
                source_type: source_ty,
                value_ir_type: field_ty,
                storage: SlotStorage::Scalar,
                array_elem_ty: None,
                mutable: false,
            },
        );
    }

    /// Shared `is`-test: returns `(bool result, scrutinee address, shape)`
    /// so callers (both `Expr::Is` and the `if ... is ...` statement form)
    /// can reuse the address for binding without re-lowering the scrutinee.
    pub(crate) fn lower_is_test(&mut self, scrutinee_e: &Expr, variant: &str) -> (IrValue, IrValue, Shape) {
        let (ptr, shape) = self.addressable(scrutinee_e);
        let Some(target) = self.sum_type_for(&shape) else {
            self.push_error(CompileError::PatternNotSupported {
                kind: "is-test over non-enum, non-Optional scrutinee".into(),
                location: self.error_location(),
            });
            return (IrValue::const_bool(false), ptr, shape);
        };
        let idx = self.variant_index_for(&target, variant);
        let tag = self.load_tag(ptr.clone());
        let cmp = self
            .func()
            .builder
            .bin_op(IrBinOp::Eq, tag, IrValue::const_i32(idx as i32))
            .unwrap_or(IrValue::const_bool(false));
        (cmp, ptr, shape)
    }

    /// Binds the variable from `if scrutinee is Variant(binding)`, called
    /// by statement lowering once the `then` block is current.
    pub(crate) fn bind_is_binding(&mut self, shape: &Shape, ptr: IrValue, variant: &str, binding: &str) {
        if let Some(target) = self.sum_type_for(shape) {
            self.bind_payload(&target, variant, ptr, binding);
        }
    }

    fn lower_match(&mut self, scrutinee_e: &Expr, arms: &[MatchArm]) -> (IrValue, Shape) {
        if arms.is_empty() {
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        }
        let (ptr, shape) = self.addressable(scrutinee_e);
        let Some(target) = self.sum_type_for(&shape) else {
            self.push_error(CompileError::PatternNotSupported {
                kind: "match over non-enum, non-Optional scrutinee".into(),
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        let tag = self.load_tag(ptr.clone());

        let entry_block = self.func().builder.current_block();
        let merge_block = self.func().builder.new_block();
        let default_block = self.func().builder.new_block();
        let arm_blocks: Vec<BlockId> = arms.iter().map(|_| self.func().builder.new_block()).collect();
        let mut test_blocks = vec![entry_block];
        for _ in 1..arms.len() {
            test_blocks.push(self.func().builder.new_block());
        }

        for (i, arm) in arms.iter().enumerate() {
            self.func().builder.switch_to(test_blocks[i]);
            let next_test = if i + 1 < arms.len() { test_blocks[i + 1] } else { default_block };
            match &arm.pattern {
                Pattern::Wildcard | Pattern::Identifier(_) => {
                    let _ = self.func().builder.br(arm_blocks[i]);
                }
                Pattern::EnumVariant { variant, .. } => {
                    let idx = self.variant_index_for(&target, variant);
                    let cmp = self
                        .func()
                        .builder
                        .bin_op(IrBinOp::Eq, tag.clone(), IrValue::const_i32(idx as i32))
                        .unwrap_or(IrValue::const_bool(false));
                    let _ = self.func().builder.cond_br(cmp, arm_blocks[i], next_test);
                }
                Pattern::Literal(_) | Pattern::Struct { .. } => {
                    self.push_error(CompileError::PatternNotSupported {
                        kind: "literal/struct match pattern".into(),
                        location: self.error_location(),
                    });
                    let _ = self.func().builder.br(next_test);
                }
            }
        }

        self.func().builder.switch_to(arm_blocks[0]);
        self.func().push_scope();
        self.bind_match_pattern(&target, &arms[0].pattern, ptr.clone());
        let (first_value, _) = self.lower_expr(&arms[0].body);
        self.func().pop_scope();
        let result_ty = first_value.ty().clone();
        let result_slot = self.func().builder.alloca(result_ty.clone()).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(result_slot.clone(), first_value);
        let _ = self.func().builder.br(merge_block);

        for (i, arm) in arms.iter().enumerate().skip(1) {
            self.func().builder.switch_to(arm_blocks[i]);
            self.func().push_scope();
            self.bind_match_pattern(&target, &arm.pattern, ptr.clone());
            let (value, _) = self.lower_expr(&arm.body);
            self.func().pop_scope();
            let coerced = self.coerce_int_width(value, result_ty.clone());
            let _ = self.func().builder.store(result_slot.clone(), coerced);
            let _ = self.func().builder.br(merge_block);
        }

        self.func().builder.switch_to(default_block);
        let _ = self.func().builder.store(result_slot.clone(), default_zero_value(&result_ty));
        let _ = self.func().builder.br(merge_block);

        self.func().builder.switch_to(merge_block);
        let loaded = self.func().builder.load(result_slot, result_ty.clone()).unwrap_or(IrValue::const_i32(0));
        (loaded, Shape::Scalar(result_ty))
    }

    fn bind_match_pattern(&mut self, target: &TagTarget, pattern: &Pattern, ptr: IrValue) {
        match pattern {
            Pattern::EnumVariant { variant, bindings } => {
                if let Some(binding) = bindings.first() {
                    self.bind_payload(target, variant, ptr, binding);
                }
            }
            Pattern::Identifier(name) => {
                let whole_ty = match target {
                    TagTarget::UserEnum(enum_name) => IrType::Named(enum_name.clone()),
                    TagTarget::Optional { .. } => IrType::Pointer,
                };
                let value = self.func().builder.load(ptr.clone(), whole_ty.clone()).unwrap_or(IrValue::null_ptr());
                let slot_ptr = self.func().builder.alloca(whole_ty.clone()).unwrap_or(IrValue::null_ptr());
                let _ = self.func().builder.store(slot_ptr.clone(), value);
                let source_ty = match target {
                    TagTarget::UserEnum(enum_name) => Type::named(enum_name),
                    TagTarget::Optional { .. } => Type::Primitive(PrimitiveKind::I32),
                };
                self.func().declare_local(
                    name.clone(),
                    LocalSlot {
                        ptr: slot_ptr,
                        source_type: source_ty,
                        value_ir_type: whole_ty,
                        storage: SlotStorage::Scalar,
                        array_elem_ty: None,
                        mutable: false,
                    },
                );
            }
            _ => {}
        }
    }

    fn lower_if_expr(&mut self, condition: &Expr, then_branch: &Expr, else_branch: &Expr) -> (IrValue, Shape) {
        let (cond, _) = self.lower_expr(condition);
        let then_block = self.func().builder.new_block();
        let else_block = self.func().builder.new_block();
        let merge_block = self.func().builder.new_block();
        let _ = self.func().builder.cond_br(cond, then_block, else_block);

        self.func().builder.switch_to(then_block);
        let (then_value, then_shape) = self.lower_expr(then_branch);
        let then_end = self.func().builder.current_block();
        let _ = self.func().builder.br(merge_block);

        self.func().builder.switch_to(else_block);
        let (else_value, _else_shape) = self.lower_expr(else_branch);
        let else_end = self.func().builder.current_block();
        let _ = self.func().builder.br(merge_block);

        if then_value.ty() != else_value.ty() {
            self.push_error(CompileError::MismatchedIfBranches {
                then_type: format!("{:?}", then_value.ty()),
                else_type: format!("{:?}", else_value.ty()),
                location: self.error_location(),
            });
        }

        self.func().builder.switch_to(merge_block);
        let ty = then_value.ty().clone();
        let phi = self
            .func()
            .builder
            .phi(vec![(then_end, then_value), (else_end, else_value)], ty)
            .unwrap_or(IrValue::const_i32(0));
        (phi, then_shape)
    }

    // ---- calls -------------------------------------------------------

    fn lower_call_args(&mut self, args: &[Expr]) -> Vec<IrValue> {
        args.iter().map(|a| self.lower_expr(a).0).collect()
    }

    fn emit_call(&mut self, callee_name: &str, args: &[Expr]) -> IrValue {
        let lowered_args = self.lower_call_args(args);
        let ret_ty = self.module.find_function(callee_name).map(|f| f.return_type.clone()).unwrap_or(IrType::I32);
        self.func().builder.call(callee_name.to_owned(), lowered_args, ret_ty).unwrap_or(IrValue::const_i32(0))
    }

    fn lower_local_call(&mut self, name: &str, type_args: &[Type], args: &[Expr]) -> (IrValue, Shape) {
        let found = self.st.lookup(name, &self.module_name).map(|(o, s)| (o.to_owned(), s.clone()));
        match found {
            Some((owner, Symbol::GenericFunction { ast })) => {
                if type_args.is_empty() {
                    self.push_error(CompileError::GenericArityMismatch {
                        name: name.to_owned(),
                        expected: ast.generic_params.len(),
                        got: 0,
                        location: self.error_location(),
                    });
                    return (IrValue::const_i32(0), Shape::Void);
                }
                let mangled = self.instantiate_function(&owner, &ast, type_args);
                let hint = match self.st.lookup_in_module(&self.module_name, &mangled) {
                    Some(Symbol::Function { return_type, return_shape, .. }) => Shape::from_return_hint(return_type, return_shape),
                    _ => Shape::Scalar(IrType::I32),
                };
                let value = self.emit_call(&mangled, args);
                (value, hint)
            }
            Some((_owner, Symbol::Function { ir_name, return_type, return_shape, .. })) => {
                let hint = Shape::from_return_hint(&return_type, &return_shape);
                let value = self.emit_call(&ir_name, args);
                (value, hint)
            }
            _ => {
                self.push_error(CompileError::SymbolNotFound {
                    qualified_name: name.to_owned(),
                    location: self.error_location(),
                });
                (IrValue::const_i32(0), Shape::Scalar(IrType::I32))
            }
        }
    }

    fn lower_cross_module_call(&mut self, owner: &str, name: &str, type_args: &[Type], args: &[Expr]) -> (IrValue, Shape) {
        let symbol = self.st.lookup_in_module(owner, name).cloned();
        match symbol {
            Some(Symbol::GenericFunction { ast }) => {
                if type_args.is_empty() {
                    self.push_error(CompileError::GenericArityMismatch {
                        name: name.to_owned(),
                        expected: ast.generic_params.len(),
                        got: 0,
                        location: self.error_location(),
                    });
                    return (IrValue::const_i32(0), Shape::Void);
                }
                self.st.declare_or_replace(&self.module_name.clone(), name, Symbol::GenericFunction { ast }, true);
                self.lower_local_call(name, type_args, args)
            }
            Some(_) => {
                if !self.st.is_accessible(owner, name, &self.module_name) {
                    self.push_error(CompileError::SymbolNotAccessible {
                        qualified_name: format!("{owner}::{name}"),
                        from_module: self.module_name.clone(),
                        location: self.error_location(),
                    });
                    return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
                }
                let (local_name, return_shape) = self.import_function(owner, name);
                let ret_ty = self.module.find_function(&local_name).map(|f| f.return_type.clone()).unwrap_or(IrType::I32);
                let hint = Shape::from_return_hint(&ret_ty, &return_shape);
                let value = self.emit_call(&local_name, args);
                (value, hint)
            }
            None => {
                self.push_error(CompileError::SymbolNotFound {
                    qualified_name: format!("{owner}::{name}"),
                    location: self.error_location(),
                });
                (IrValue::const_i32(0), Shape::Scalar(IrType::I32))
            }
        }
    }

    /// `Type::method<TArgs>(args)` — a static call through a named
    /// (possibly generic) type (spec.md §4.6 call-routing case 2).
    fn lower_static_method_call(&mut self, receiver: &Expr, method: &str, type_args: &[Type], args: &[Expr]) -> (IrValue, Shape) {
        let Expr::Identifier { name: type_name, .. } = receiver else {
            self.push_error(CompileError::TypeNotFound {
                name: "static method receiver".into(),
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        let found = self.st.lookup(type_name, &self.module_name).map(|(o, s)| (o.to_owned(), s.clone()));
        if let Some((owner, Symbol::Type { ast: crate::symbol_table::TypeAst::Struct(decl), .. })) = found {
            if decl.is_generic() {
                self.instantiate_struct(&owner, &decl, type_args);
                let mangled = crate::generics::mangle(type_name, type_args);
                let suffix = mangled.strip_prefix(type_name.as_str()).unwrap_or("").trim_start_matches('_').to_owned();
                let mangled_method = crate::generics::mangle_method(method, &suffix);
                let hint = match self.st.lookup_in_module(&self.module_name, &mangled_method) {
                    Some(Symbol::Function { return_type, return_shape, .. }) => Shape::from_return_hint(return_type, return_shape),
                    _ => Shape::Scalar(IrType::I32),
                };
                let value = self.emit_call(&mangled_method, args);
                return (value, hint);
            }
        }
        self.lower_global_method_call(method, None, args)
    }

    /// Resolves and calls a concrete struct method through the global
    /// method-name registry (spec.md §4.6 call-routing case 1, and the
    /// static-method fallback for non-generic structs).
    fn lower_global_method_call(&mut self, method: &str, receiver: Option<&Expr>, args: &[Expr]) -> (IrValue, Shape) {
        let Some(sym) = self.st.lookup_method(method).cloned() else {
            self.push_error(CompileError::SymbolNotFound {
                qualified_name: method.to_owned(),
                location: self.error_location(),
            });
            return (IrValue::const_i32(0), Shape::Scalar(IrType::I32));
        };
        let local_name = if sym.owner_module == self.module_name {
            sym.ir_name.clone()
        } else {
            self.import_method(&sym)
        };
        let mut call_args = Vec::with_capacity(args.len() + 1);
        if let Some(receiver_expr) = receiver {
            let (recv_ptr, _) = self.addressable(receiver_expr);
            call_args.push(recv_ptr);
        }
        call_args.extend(self.lower_call_args(args));
        let ret_ty = self.module.find_function(&local_name).map(|f| f.return_type.clone()).unwrap_or_else(|| sym.return_type.clone());
        let value = self.func().builder.call(local_name, call_args, ret_ty.clone()).unwrap_or(IrValue::const_i32(0));
        let shape = Shape::from_return_hint(&ret_ty, &sym.return_shape);
        (value, shape)
    }
}

// Keeps `FunctionContext` in scope for the doc link above even when this
// file is compiled standalone by rustdoc.
#[allow(unused_imports)]
use crate::lower::FunctionContext as _FunctionContextDocLink;
const _: fn(&FunctionContext) = |_| {};
