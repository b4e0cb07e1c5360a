//! Statement Lowering (spec.md §4.7): `let`, `return`, `if` (including the
//! `scrutinee is Variant(binding)` condition shape), the four loop forms,
//! `break`/`continue`, blocks, and the item-shaped statements (function,
//! struct, enum, impl, extern, type-alias, import).
//!
//! Also hosts [`Lowerer::register_item_types`]/[`Lowerer::lower_item`], the
//! two halves of the Module Compiler's per-module two-pass lowering
//! (spec.md §4.8 step 3): pass 1 registers every struct/enum so later
//! function signatures can see types declared further down the source;
//! pass 2 lowers everything else, item by item, in source order.

use std::rc::Rc;

use crate::ast::{EnumDecl, Expr, ExternFn, FunctionDecl, Impl, Item, LoopForm, PrimitiveKind, Stmt, StructDecl, Type};
use crate::diagnostics::CompileError;
use crate::generics::default_zero_value;
use crate::ir::{GepIndex, IrBinOp, IrFunction, IrType, IrValue};
use crate::lower::{LocalSlot, Lowerer, Shape, SlotStorage, StructContext};
use crate::symbol_table::{MethodSymbol, Symbol, TypeAst};

/// Best-effort inverse of [`crate::type_resolver::primitive_ir_type`], used
/// only to reconstruct a plausible source [`Type`] for an un-annotated
/// local whose initializer's [`Shape`] we already know — a `LocalSlot`
/// needs *some* `Type` to hand back to `shape_of` later, and for scalars
/// the width alone pins it down unambiguously except at the signed/
/// unsigned and `char`/`i8` boundaries, where we pick the signed/integer
/// reading (spec.md §4.3 documents an analogous recoverable default for
/// unknown names).
fn ir_type_to_primitive(ir: &IrType) -> Type {
    use crate::ir::{FloatWidth, IntWidth};
    match ir {
        IrType::Void => Type::Primitive(PrimitiveKind::Void),
        IrType::Int(IntWidth::W1) => Type::Primitive(PrimitiveKind::Bool),
        IrType::Int(IntWidth::W8) => Type::Primitive(PrimitiveKind::I8),
        IrType::Int(IntWidth::W16) => Type::Primitive(PrimitiveKind::I16),
        IrType::Int(IntWidth::W32) => Type::Primitive(PrimitiveKind::I32),
        IrType::Int(IntWidth::W64) => Type::Primitive(PrimitiveKind::I64),
        IrType::Int(IntWidth::W128) => Type::Primitive(PrimitiveKind::I128),
        IrType::Float(FloatWidth::W32) => Type::Primitive(PrimitiveKind::F32),
        IrType::Float(FloatWidth::W64) => Type::Primitive(PrimitiveKind::F64),
        IrType::Pointer => Type::Primitive(PrimitiveKind::String),
        IrType::Array { elem, len } => Type::Array {
            elem: Box::new(ir_type_to_primitive(elem)),
            size: *len as i64,
        },
        IrType::Named(name) => Type::named(name.clone()),
    }
}

impl<'st> Lowerer<'st> {
    fn infer_source_type_from_shape(&self, shape: &Shape) -> Type {
        match shape {
            Shape::Void => Type::Primitive(PrimitiveKind::Void),
            Shape::Scalar(ir) => ir_type_to_primitive(ir),
            Shape::StructPtr(name) => Type::named(name.clone()),
            Shape::Enum(name) => Type::named(name.clone()),
            // Lossy when `T` is itself a struct/optional/array (the inner
            // IR type has already degraded to a bare pointer by then) —
            // an accepted approximation, same spirit as spec.md §4.3's
            // documented fallback for an unresolved name.
            Shape::OptionalPtr { inner, .. } => Type::Optional(Box::new(ir_type_to_primitive(inner))),
            Shape::Array { elem, len } => Type::Array {
                elem: Box::new(ir_type_to_primitive(elem)),
                size: *len as i64,
            },
        }
    }

    /// Declares a fatal-on-duplicate error through the unified diagnostic
    /// channel rather than propagating [`crate::symbol_table::SymbolTableError`]
    /// directly — every call site already has an [`ErrorLocation`] on hand.
    fn declare_or_report(&mut self, name: &str, symbol: Symbol, public: bool) -> bool {
        match self.st.declare(&self.module_name.clone(), name, symbol, public) {
            Ok(()) => true,
            Err(_) => {
                self.push_error(CompileError::DuplicateDeclaration {
                    module: self.module_name.clone(),
                    name: name.to_owned(),
                });
                false
            }
        }
    }

    // ---- block / top-level dispatch --------------------------------------

    /// Lowers a sequence of statements, stopping early once a block falls
    /// terminated (a `return`/`break`/`continue` already emitted) — later
    /// statements would be dead code the builder can't emit into anyway.
    pub fn lower_block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if self.func().builder.is_current_terminated() {
                break;
            }
            self.lower_stmt(stmt);
        }
    }

    pub fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let {
                name,
                annotation,
                initializer,
                mutable,
                ..
            } => self.lower_let(name, annotation, initializer.as_ref(), *mutable),
            Stmt::Return { value, .. } => self.lower_return(value.as_ref()),
            Stmt::If {
                condition,
                then_block,
                else_block,
                ..
            } => self.lower_if_stmt(condition, then_block, else_block),
            Stmt::Loop { form, body, .. } => self.lower_loop(form, body),
            Stmt::Break { .. } => self.lower_break(),
            Stmt::Continue { .. } => self.lower_continue(),
            Stmt::Block { body, .. } => {
                self.func().push_scope();
                self.lower_block(body);
                self.func().pop_scope();
            }
            Stmt::Expr { expr, .. } => {
                self.lower_expr(expr);
            }
            Stmt::Item(item) => self.lower_item(item),
        }
    }

    /// Pass 1 of the Module Compiler's two-pass lowering (spec.md §4.8
    /// step 3): registers every struct/enum, concrete or generic-template,
    /// so later function signatures can reference types declared further
    /// down the source. A no-op for every other item kind.
    pub fn register_item_types(&mut self, item: &Item) {
        match item {
            Item::Struct(decl) => self.register_struct_item_type(decl),
            Item::Enum(decl) => self.register_enum_item_type(decl),
            _ => {}
        }
    }

    fn register_struct_item_type(&mut self, decl: &StructDecl) {
        if decl.is_generic() {
            self.declare_or_report(
                &decl.name,
                Symbol::Type {
                    ir_type: None,
                    ast: TypeAst::Struct(Rc::new(decl.clone())),
                },
                decl.public,
            );
            return;
        }
        self.register_struct_type(decl);
        self.declare_or_report(
            &decl.name,
            Symbol::Type {
                ir_type: Some(IrType::Pointer),
                ast: TypeAst::Struct(Rc::new(decl.clone())),
            },
            decl.public,
        );
    }

    fn register_enum_item_type(&mut self, decl: &EnumDecl) {
        if decl.is_generic() {
            self.declare_or_report(
                &decl.name,
                Symbol::Type {
                    ir_type: None,
                    ast: TypeAst::Enum(Rc::new(decl.clone())),
                },
                decl.public,
            );
            return;
        }
        self.register_enum_type(decl);
        self.declare_or_report(
            &decl.name,
            Symbol::Type {
                ir_type: Some(IrType::Named(decl.name.clone())),
                ast: TypeAst::Enum(Rc::new(decl.clone())),
            },
            decl.public,
        );
    }

    /// Pass 2: lowers every item kind other than struct/enum type
    /// registration, which pass 1 already handled.
    pub fn lower_item(&mut self, item: &Item) {
        match item {
            Item::Function(decl) => self.lower_function_item(decl),
            Item::Struct(decl) => self.lower_struct_item(decl),
            // Enums carry no code of their own (spec.md §4.7 "Enum":
            // "Register the AST and type; no code emitted") — already
            // registered in pass 1.
            Item::Enum(_) => {}
            Item::Impl(block) => self.lower_impl_item(block),
            Item::TypeAlias(decl) => {
                self.type_aliases.insert(decl.name.clone(), decl.target.clone());
            }
            Item::Extern(decl) => self.lower_extern_item(decl),
            // The Loader has already handled imports (spec.md §4.7 "Import").
            Item::Import(_) => {}
        }
    }

    fn lower_function_item(&mut self, decl: &FunctionDecl) {
        if decl.is_generic() {
            self.declare_or_report(
                &decl.name,
                Symbol::GenericFunction { ast: Rc::new(decl.clone()) },
                decl.public,
            );
            return;
        }
        let param_types: Vec<IrType> = decl.params.iter().map(|p| self.resolve_boundary_type(&p.ty)).collect();
        let ir_return_type = self.resolve_boundary_type(&decl.return_type);
        let return_shape = self.shape_of(&decl.return_type).as_return_hint();
        if !self.declare_or_report(
            &decl.name,
            Symbol::Function {
                ir_name: decl.name.clone(),
                param_types: param_types.clone(),
                return_type: ir_return_type.clone(),
                return_shape,
            },
            decl.public,
        ) {
            return;
        }
        self.module.add_function(IrFunction {
            name: decl.name.clone(),
            param_types: param_types.clone(),
            return_type: ir_return_type.clone(),
            public: decl.public,
            blocks: None,
            next_value_id: 0,
        });
        self.lower_function_body(
            &decl.name,
            &decl.params,
            &decl.return_type,
            ir_return_type,
            param_types,
            &decl.body,
            decl.public,
            None,
        );
    }

    fn lower_struct_item(&mut self, decl: &StructDecl) {
        // Generic-struct methods are lowered on demand per instantiation
        // (spec.md §4.4), not here.
        if decl.is_generic() {
            return;
        }
        for method in &decl.methods {
            self.lower_method(&decl.name, method);
        }
    }

    fn lower_impl_item(&mut self, block: &Impl) {
        for method in &block.methods {
            self.lower_method(&block.target, method);
        }
    }

    /// Lowers one concrete struct method, registering it in the global
    /// method-name table rather than the module's ordinary symbol
    /// namespace — spec.md §4.6/§9: method calls are resolved by searching
    /// across every struct's methods by bare name, a distinct lookup path
    /// from plain function calls.
    fn lower_method(&mut self, struct_name: &str, method: &FunctionDecl) {
        let is_instance = method.params.first().map(|p| p.name == "self").unwrap_or(false);
        let param_types: Vec<IrType> = method
            .params
            .iter()
            .map(|p| self.resolve_method_boundary_type(&p.ty, is_instance, struct_name))
            .collect();
        let ir_return_type = self.resolve_method_boundary_type(&method.return_type, is_instance, struct_name);
        let return_shape = self.method_return_shape(&method.return_type, struct_name);

        let method_symbol = MethodSymbol {
            owner_module: self.module_name.clone(),
            struct_name: struct_name.to_owned(),
            ir_name: method.name.clone(),
            param_types: param_types.clone(),
            return_type: ir_return_type.clone(),
            return_shape,
            is_instance,
        };
        if self.st.declare_method(&method.name, method_symbol).is_err() {
            self.push_error(CompileError::DuplicateDeclaration {
                module: self.module_name.clone(),
                name: method.name.clone(),
            });
            return;
        }

        self.module.add_function(IrFunction {
            name: method.name.clone(),
            param_types: param_types.clone(),
            return_type: ir_return_type.clone(),
            public: method.public,
            blocks: None,
            next_value_id: 0,
        });
        self.lower_function_body(
            &method.name,
            &method.params,
            &method.return_type,
            ir_return_type,
            param_types,
            &method.body,
            method.public,
            Some(StructContext {
                struct_name: struct_name.to_owned(),
                is_instance,
            }),
        );
    }

    /// `extern` declarations are always registered module-private (spec.md
    /// §4.7 "Extern" / §9 open question — no re-export mechanism exists).
    fn lower_extern_item(&mut self, decl: &ExternFn) {
        let param_types: Vec<IrType> = decl.params.iter().map(|p| self.resolve_boundary_type(&p.ty)).collect();
        let ir_return_type = self.resolve_boundary_type(&decl.return_type);
        self.module
            .add_function(IrFunction::declaration(decl.name.clone(), param_types.clone(), ir_return_type.clone()));
        let return_shape = self.shape_of(&decl.return_type).as_return_hint();
        self.declare_or_report(
            &decl.name,
            Symbol::Function {
                ir_name: decl.name.clone(),
                param_types,
                return_type: ir_return_type,
                return_shape,
            },
            false,
        );
    }

    // ---- let ---------------------------------------------------------

    fn alloc_local_slot(&mut self, name: &str, source_type: Type, shape: &Shape, mutable: bool) -> IrValue {
        let (ptr, value_ir_type, storage, array_elem_ty) = match shape {
            Shape::Array { elem, len } => {
                let array_ty = IrType::Array {
                    elem: Box::new(elem.clone()),
                    len: *len,
                };
                let ptr = self.func().builder.alloca(array_ty.clone()).unwrap_or(IrValue::null_ptr());
                (ptr, array_ty, SlotStorage::DirectArray, Some(elem.clone()))
            }
            Shape::StructPtr(_) | Shape::OptionalPtr { .. } => {
                let ptr = self.func().builder.alloca(IrType::Pointer).unwrap_or(IrValue::null_ptr());
                (ptr, IrType::Pointer, SlotStorage::PointerBacked, None)
            }
            Shape::Enum(enum_name) => {
                let ty = IrType::Named(enum_name.clone());
                let ptr = self.func().builder.alloca(ty.clone()).unwrap_or(IrValue::null_ptr());
                (ptr, ty, SlotStorage::Scalar, None)
            }
            Shape::Scalar(ir) => {
                let ptr = self.func().builder.alloca(ir.clone()).unwrap_or(IrValue::null_ptr());
                (ptr, ir.clone(), SlotStorage::Scalar, None)
            }
            Shape::Void => {
                let ptr = self.func().builder.alloca(IrType::Void).unwrap_or(IrValue::null_ptr());
                (ptr, IrType::Void, SlotStorage::Scalar, None)
            }
        };
        self.func().declare_local(
            name.to_owned(),
            LocalSlot {
                ptr: ptr.clone(),
                source_type,
                value_ir_type,
                storage,
                array_elem_ty,
                mutable,
            },
        );
        ptr
    }

    fn fix_deferred_array_len(&self, ann: &Type, initializer: Option<&Expr>) -> Type {
        if let Type::Array { elem, size } = ann {
            if *size == Type::DEFERRED_SIZE {
                if let Some(Expr::ArrayLiteral { elements, .. }) = initializer {
                    return Type::Array {
                        elem: elem.clone(),
                        size: elements.len() as i64,
                    };
                }
            }
        }
        ann.clone()
    }

    /// Stores each element of an array-literal initializer (or, for a
    /// whole-array initializer such as another array variable, copies it
    /// element-wise) into an already-allocated direct-array slot.
    fn init_array_slot(&mut self, ptr: IrValue, elem_ty: IrType, len: u32, initializer: Option<&Expr>) {
        match initializer {
            Some(Expr::ArrayLiteral { elements, .. }) => {
                for (i, el) in elements.iter().enumerate() {
                    let (value, _) = self.lower_expr(el);
                    let coerced = self.coerce_int_width(value, elem_ty.clone());
                    let elem_ptr = self
                        .func()
                        .builder
                        .gep(ptr.clone(), vec![GepIndex::Field(0), GepIndex::Dynamic(IrValue::const_i32(i as i32))], elem_ty.clone())
                        .unwrap_or(IrValue::null_ptr());
                    let _ = self.func().builder.store(elem_ptr, coerced);
                }
            }
            Some(other) => {
                let src_ptr = self.array_source_address(other);
                for i in 0..len {
                    let idx = IrValue::const_i32(i as i32);
                    let src_elem_ptr = self
                        .func()
                        .builder
                        .gep(src_ptr.clone(), vec![GepIndex::Field(0), GepIndex::Dynamic(idx.clone())], elem_ty.clone())
                        .unwrap_or(IrValue::null_ptr());
                    let value = self.func().builder.load(src_elem_ptr, elem_ty.clone()).unwrap_or(IrValue::const_i32(0));
                    let dst_elem_ptr = self
                        .func()
                        .builder
                        .gep(ptr.clone(), vec![GepIndex::Field(0), GepIndex::Dynamic(idx)], elem_ty.clone())
                        .unwrap_or(IrValue::null_ptr());
                    let _ = self.func().builder.store(dst_elem_ptr, value);
                }
            }
            None => {}
        }
    }

    fn init_scalar_like_slot(&mut self, ptr: IrValue, shape: &Shape, initializer: Option<&Expr>) {
        let target_ty = shape.local_ir_type();
        match initializer {
            Some(expr) => {
                let (value, _) = self.lower_expr(expr);
                let coerced = if matches!(shape, Shape::Enum(_)) {
                    value
                } else {
                    self.coerce_int_width(value, target_ty)
                };
                let _ = self.func().builder.store(ptr, coerced);
            }
            None => {
                let default = match shape {
                    Shape::StructPtr(_) | Shape::OptionalPtr { .. } => IrValue::null_ptr(),
                    _ => default_zero_value(&target_ty),
                };
                let _ = self.func().builder.store(ptr, default);
            }
        }
    }

    /// Lowers an un-annotated `let name = [a, b, c];` — the element type
    /// is inferred from the first element (an empty literal can't be
    /// inferred at all), and that first element is lowered exactly once
    /// so its side effects (e.g. a call) aren't duplicated.
    fn lower_unannotated_array_let(&mut self, name: &str, elements: &[Expr], mutable: bool) {
        let Some(first) = elements.first() else {
            self.push_error(CompileError::TypeNotFound {
                name: name.to_owned(),
                location: self.error_location(),
            });
            return;
        };
        let (first_value, _) = self.lower_expr(first);
        let elem_ty = first_value.ty().clone();
        let len = elements.len() as u32;
        let source_type = Type::Array {
            elem: Box::new(ir_type_to_primitive(&elem_ty)),
            size: len as i64,
        };
        let shape = Shape::Array { elem: elem_ty.clone(), len };
        let ptr = self.alloc_local_slot(name, source_type, &shape, mutable);

        let coerced0 = self.coerce_int_width(first_value, elem_ty.clone());
        let elem_ptr0 = self
            .func()
            .builder
            .gep(ptr.clone(), vec![GepIndex::Field(0), GepIndex::Dynamic(IrValue::const_i32(0))], elem_ty.clone())
            .unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(elem_ptr0, coerced0);

        for (i, el) in elements.iter().enumerate().skip(1) {
            let (value, _) = self.lower_expr(el);
            let coerced = self.coerce_int_width(value, elem_ty.clone());
            let elem_ptr = self
                .func()
                .builder
                .gep(ptr.clone(), vec![GepIndex::Field(0), GepIndex::Dynamic(IrValue::const_i32(i as i32))], elem_ty.clone())
                .unwrap_or(IrValue::null_ptr());
            let _ = self.func().builder.store(elem_ptr, coerced);
        }
    }

    fn lower_let(&mut self, name: &str, annotation: &Option<Type>, initializer: Option<&Expr>, mutable: bool) {
        match annotation {
            Some(ann) => {
                let resolved_ann = self.fix_deferred_array_len(ann, initializer);
                let shape = self.shape_of(&resolved_ann);
                match shape.clone() {
                    Shape::Array { elem, len } => {
                        let ptr = self.alloc_local_slot(name, resolved_ann, &shape, mutable);
                        self.init_array_slot(ptr, elem, len, initializer);
                    }
                    _ => {
                        let ptr = self.alloc_local_slot(name, resolved_ann, &shape, mutable);
                        self.init_scalar_like_slot(ptr, &shape, initializer);
                    }
                }
            }
            None => {
                let Some(init) = initializer else {
                    self.push_error(CompileError::TypeNotFound {
                        name: name.to_owned(),
                        location: self.error_location(),
                    });
                    return;
                };
                if let Expr::ArrayLiteral { elements, .. } = init {
                    self.lower_unannotated_array_let(name, elements, mutable);
                    return;
                }
                let (value, shape) = self.lower_expr(init);
                let source_type = self.infer_source_type_from_shape(&shape);
                let ptr = self.alloc_local_slot(name, source_type, &shape, mutable);
                let coerced = if matches!(shape, Shape::Enum(_)) {
                    value
                } else {
                    self.coerce_int_width(value, shape.local_ir_type())
                };
                let _ = self.func().builder.store(ptr, coerced);
            }
        }
    }

    // ---- return --------------------------------------------------------

    fn lower_return(&mut self, value: Option<&Expr>) {
        match value {
            Some(expr) => {
                let (mut val, _) = self.lower_expr(expr);
                let ret_ty = self.func().ir_return_type.clone();
                // Legacy path (spec.md §4.7 "Return"): a declared-by-value
                // struct return whose expression still produced a pointer.
                // Enums are exempt — their own `Named` IR type already *is*
                // the value type, never a pointer.
                if let IrType::Named(name) = &ret_ty {
                    if val.ty().is_pointer() && self.enum_decl_for(name).is_none() {
                        val = self.func().builder.load(val, ret_ty.clone()).unwrap_or(val);
                    }
                }
                let coerced = self.coerce_int_width(val, ret_ty);
                let _ = self.func().builder.ret(Some(coerced));
            }
            None => {
                let _ = self.func().builder.ret(None);
            }
        }
    }

    // ---- if ------------------------------------------------------------

    fn lower_branch_block(&mut self, stmts: &[Stmt], merge: crate::ir::BlockId) {
        self.func().push_scope();
        self.lower_block(stmts);
        if !self.func().builder.is_current_terminated() {
            let _ = self.func().builder.br(merge);
        }
        self.func().pop_scope();
    }

    fn lower_if_stmt(&mut self, condition: &Expr, then_block: &[Stmt], else_block: &[Stmt]) {
        if let Expr::Is { scrutinee, variant, binding, .. } = condition {
            let (cmp, ptr, shape) = self.lower_is_test(scrutinee, variant);
            let then_bb = self.func().builder.new_block();
            let else_bb = self.func().builder.new_block();
            let merge_bb = self.func().builder.new_block();
            let _ = self.func().builder.cond_br(cmp, then_bb, else_bb);

            self.func().builder.switch_to(then_bb);
            self.func().push_scope();
            if let Some(b) = binding {
                self.bind_is_binding(&shape, ptr.clone(), variant, b);
            }
            self.lower_block(then_block);
            if !self.func().builder.is_current_terminated() {
                let _ = self.func().builder.br(merge_bb);
            }
            self.func().pop_scope();

            self.lower_branch_block(else_block, merge_bb);
            self.func().builder.switch_to(merge_bb);
        } else {
            let (cond, _) = self.lower_expr(condition);
            let then_bb = self.func().builder.new_block();
            let else_bb = self.func().builder.new_block();
            let merge_bb = self.func().builder.new_block();
            let _ = self.func().builder.cond_br(cond, then_bb, else_bb);

            self.func().builder.switch_to(then_bb);
            self.lower_branch_block(then_block, merge_bb);

            self.func().builder.switch_to(else_bb);
            self.lower_branch_block(else_block, merge_bb);

            self.func().builder.switch_to(merge_bb);
        }
    }

    // ---- loops -----------------------------------------------------------

    fn lower_loop(&mut self, form: &LoopForm, body: &[Stmt]) {
        match form {
            LoopForm::Infinite => self.lower_infinite_loop(body),
            LoopForm::While(cond) => self.lower_while_loop(cond, body),
            LoopForm::Range { binding, start, end } => self.lower_range_loop(binding, start, end, body),
            LoopForm::Iterator { binding, array } => self.lower_iterator_loop(binding, array, body),
        }
    }

    fn lower_infinite_loop(&mut self, body: &[Stmt]) {
        let head = self.func().builder.new_block();
        let exit = self.func().builder.new_block();
        let _ = self.func().builder.br(head);

        self.func().builder.switch_to(head);
        self.func().loop_stack.push((head, exit));
        self.func().push_scope();
        self.lower_block(body);
        self.func().pop_scope();
        self.func().loop_stack.pop();
        if !self.func().builder.is_current_terminated() {
            let _ = self.func().builder.br(head);
        }
        self.func().builder.switch_to(exit);
    }

    fn lower_while_loop(&mut self, condition: &Expr, body: &[Stmt]) {
        let head = self.func().builder.new_block();
        let body_bb = self.func().builder.new_block();
        let exit = self.func().builder.new_block();
        let _ = self.func().builder.br(head);

        self.func().builder.switch_to(head);
        let (cond_val, _) = self.lower_expr(condition);
        let _ = self.func().builder.cond_br(cond_val, body_bb, exit);

        self.func().builder.switch_to(body_bb);
        self.func().loop_stack.push((head, exit));
        self.func().push_scope();
        self.lower_block(body);
        self.func().pop_scope();
        self.func().loop_stack.pop();
        if !self.func().builder.is_current_terminated() {
            let _ = self.func().builder.br(head);
        }
        self.func().builder.switch_to(exit);
    }

    /// `i in a..b`, half-open ascending (spec.md §4.7).
    fn lower_range_loop(&mut self, binding: &str, start: &Expr, end: &Expr, body: &[Stmt]) {
        let (start_val, _) = self.lower_expr(start);
        let (end_val, _) = self.lower_expr(end);
        let iter_ptr = self.func().builder.alloca(IrType::I32).unwrap_or(IrValue::null_ptr());
        let start_i32 = self.coerce_int_width(start_val, IrType::I32);
        let _ = self.func().builder.store(iter_ptr.clone(), start_i32);

        let head = self.func().builder.new_block();
        let body_bb = self.func().builder.new_block();
        let incr_bb = self.func().builder.new_block();
        let exit = self.func().builder.new_block();
        let _ = self.func().builder.br(head);

        self.func().builder.switch_to(head);
        let cur = self.func().builder.load(iter_ptr.clone(), IrType::I32).unwrap_or(IrValue::const_i32(0));
        let end_i32 = self.coerce_int_width(end_val, IrType::I32);
        let cmp = self.func().builder.bin_op(IrBinOp::SLt, cur, end_i32).unwrap_or(IrValue::const_bool(false));
        let _ = self.func().builder.cond_br(cmp, body_bb, exit);

        self.func().builder.switch_to(body_bb);
        self.func().push_scope();
        self.func().declare_local(
            binding.to_owned(),
            LocalSlot {
                ptr: iter_ptr.clone(),
                source_type: Type::Primitive(PrimitiveKind::I32),
                value_ir_type: IrType::I32,
                storage: SlotStorage::Scalar,
                array_elem_ty: None,
                mutable: true,
            },
        );
        // `continue` must land on the increment, not the raw head — jumping
        // straight back to `head` would re-test the un-incremented iterator
        // and loop forever (spec.md §4.7's `(continue-target, break-target)`
        // pair).
        self.func().loop_stack.push((incr_bb, exit));
        self.lower_block(body);
        self.func().loop_stack.pop();
        if !self.func().builder.is_current_terminated() {
            let _ = self.func().builder.br(incr_bb);
        }
        self.func().pop_scope();

        self.func().builder.switch_to(incr_bb);
        let cur2 = self.func().builder.load(iter_ptr.clone(), IrType::I32).unwrap_or(IrValue::const_i32(0));
        let next = self.func().builder.bin_op(IrBinOp::Add, cur2, IrValue::const_i32(1)).unwrap_or(IrValue::const_i32(0));
        let _ = self.func().builder.store(iter_ptr, next);
        let _ = self.func().builder.br(head);

        self.func().builder.switch_to(exit);
    }

    /// Reads the array-shaped local slot bound to `array_expr`, returning
    /// its base GEP address, element type, declared length, and storage
    /// kind (spec.md §4.7 "Iterator": "over an array variable of known
    /// length"). Only identifiers are supported — the language never
    /// iterates a freshly-computed array temporary.
    fn array_binding_info(&mut self, array_expr: &Expr) -> Option<(IrValue, IrType, u32, SlotStorage)> {
        let Expr::Identifier { name, .. } = array_expr else {
            return None;
        };
        let slot = self.func().find_local(name).cloned()?;
        let elem_ty = slot.array_elem_ty.clone()?;
        let len = match self.shape_of(&slot.source_type) {
            Shape::Array { len, .. } => len,
            _ => return None,
        };
        let base = match slot.storage {
            SlotStorage::DirectArray => slot.ptr.clone(),
            _ => self.func().builder.load(slot.ptr.clone(), IrType::Pointer).unwrap_or(IrValue::null_ptr()),
        };
        Some((base, elem_ty, len, slot.storage))
    }

    /// Resolves a whole-array source expression to its base address, for
    /// the element-wise copy in [`Self::init_array_slot`]. An identifier
    /// reuses its local slot's address directly; anything else is lowered
    /// and spilled to a fresh alloca if it didn't already come back as a
    /// pointer.
    fn array_source_address(&mut self, expr: &Expr) -> IrValue {
        if let Some((base, _, _, _)) = self.array_binding_info(expr) {
            return base;
        }
        let (value, _) = self.lower_expr(expr);
        if value.ty().is_pointer() {
            return value;
        }
        let ty = value.ty().clone();
        let ptr = self.func().builder.alloca(ty).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(ptr.clone(), value);
        ptr
    }

    /// `item in arr` (spec.md §4.7): a hidden `i32` index drives the loop;
    /// each iteration loads `arr[index]` into the user-visible binding.
    fn lower_iterator_loop(&mut self, binding: &str, array: &Expr, body: &[Stmt]) {
        let Some((base_ptr, elem_ty, len, storage)) = self.array_binding_info(array) else {
            self.push_error(CompileError::TypeNotFound {
                name: "array iterator target".into(),
                location: self.error_location(),
            });
            return;
        };

        let index_ptr = self.func().builder.alloca(IrType::I32).unwrap_or(IrValue::null_ptr());
        let _ = self.func().builder.store(index_ptr.clone(), IrValue::const_i32(0));
        let iter_ptr = self.func().builder.alloca(elem_ty.clone()).unwrap_or(IrValue::null_ptr());

        let head = self.func().builder.new_block();
        let body_bb = self.func().builder.new_block();
        let incr_bb = self.func().builder.new_block();
        let exit = self.func().builder.new_block();
        let _ = self.func().builder.br(head);

        self.func().builder.switch_to(head);
        let idx = self.func().builder.load(index_ptr.clone(), IrType::I32).unwrap_or(IrValue::const_i32(0));
        let cmp = self
            .func()
            .builder
            .bin_op(IrBinOp::SLt, idx, IrValue::const_i32(len as i32))
            .unwrap_or(IrValue::const_bool(false));
        let _ = self.func().builder.cond_br(cmp, body_bb, exit);

        self.func().builder.switch_to(body_bb);
        let idx2 = self.func().builder.load(index_ptr.clone(), IrType::I32).unwrap_or(IrValue::const_i32(0));
        let indices = match storage {
            SlotStorage::DirectArray => vec![GepIndex::Field(0), GepIndex::Dynamic(idx2)],
            _ => vec![GepIndex::Dynamic(idx2)],
        };
        let elem_ptr = self.func().builder.gep(base_ptr, indices, elem_ty.clone()).unwrap_or(IrValue::null_ptr());
        let elem_val = self.func().builder.load(elem_ptr, elem_ty.clone()).unwrap_or(IrValue::const_i32(0));
        let _ = self.func().builder.store(iter_ptr.clone(), elem_val);

        self.func().push_scope();
        let source_type = self.infer_source_type_from_shape(&Shape::Scalar(elem_ty.clone()));
        self.func().declare_local(
            binding.to_owned(),
            LocalSlot {
                ptr: iter_ptr,
                source_type,
                value_ir_type: elem_ty,
                storage: SlotStorage::Scalar,
                array_elem_ty: None,
                mutable: true,
            },
        );
        // `continue` targets the increment block, not `head` directly — see
        // the matching note in `lower_range_loop`.
        self.func().loop_stack.push((incr_bb, exit));
        self.lower_block(body);
        self.func().loop_stack.pop();
        if !self.func().builder.is_current_terminated() {
            let _ = self.func().builder.br(incr_bb);
        }
        self.func().pop_scope();

        self.func().builder.switch_to(incr_bb);
        let idx3 = self.func().builder.load(index_ptr.clone(), IrType::I32).unwrap_or(IrValue::const_i32(0));
        let next = self.func().builder.bin_op(IrBinOp::Add, idx3, IrValue::const_i32(1)).unwrap_or(IrValue::const_i32(0));
        let _ = self.func().builder.store(index_ptr, next);
        let _ = self.func().builder.br(head);

        self.func().builder.switch_to(exit);
    }

    // ---- break / continue ----------------------------------------------

    fn lower_break(&mut self) {
        match self.func().loop_stack.last().copied() {
            Some((_, exit)) => {
                let _ = self.func().builder.br(exit);
            }
            None => self.push_error(CompileError::BreakOutsideLoop {
                location: self.error_location(),
            }),
        }
    }

    fn lower_continue(&mut self) {
        match self.func().loop_stack.last().copied() {
            Some((head, _)) => {
                let _ = self.func().builder.br(head);
            }
            None => self.push_error(CompileError::ContinueOutsideLoop {
                location: self.error_location(),
            }),
        }
    }
}
