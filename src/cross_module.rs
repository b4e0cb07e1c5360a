//! Cross-module import (spec.md §4.5): when the current module needs a
//! type or function defined elsewhere, its declaration is rebuilt
//! structurally inside the current module's IR context — names preserved,
//! pointer types staying opaque pointers, struct bodies translated
//! field-by-field. Grounded in the same dependency-graph bookkeeping as
//! `module_loader.rs`.

use crate::diagnostics::CompileError;
use crate::ir::{IrFunction, IrType, StructBody};
use crate::lower::Lowerer;
use crate::symbol_table::{Symbol, TypeAst};

impl<'st> Lowerer<'st> {
    /// Rebuilds `owner::name`'s type inside the current module's IR
    /// context, caching the translation (spec.md §4.5 step 2). Returns the
    /// resulting type — a pointer for structs (matching the local
    /// resolution rule), the enum's own tagged-union type for enums.
    pub fn import_type(&mut self, owner: &str, name: &str) -> IrType {
        let key = (owner.to_owned(), name.to_owned());
        if let Some(cached) = self.import_type_cache.get(&key) {
            return cached.clone();
        }

        if !self.st.is_accessible(owner, name, &self.module_name) {
            self.push_error(CompileError::SymbolNotAccessible {
                qualified_name: format!("{owner}::{name}"),
                from_module: self.module_name.clone(),
                location: self.error_location(),
            });
            return IrType::I32;
        }

        let Some(symbol) = self.st.lookup_in_module(owner, name).cloned() else {
            self.push_error(CompileError::SymbolNotFound {
                qualified_name: format!("{owner}::{name}"),
                location: self.error_location(),
            });
            return IrType::I32;
        };

        let result = match symbol {
            Symbol::Type {
                ast: TypeAst::Struct(decl),
                ..
            } => {
                // Opaque-first so a struct that (transitively) contains
                // itself by name doesn't recurse forever.
                self.module.declare_opaque_type(name);
                self.import_type_cache.insert(key.clone(), IrType::Pointer);

                let mut fields = Vec::with_capacity(decl.fields.len());
                for field in &decl.fields {
                    let field_ty = self.resolve_type_in_owner_context(owner, &field.ty);
                    fields.push(field_ty);
                }
                self.module.set_type_body(name, StructBody { fields });
                IrType::Pointer
            }
            Symbol::Type {
                ast: TypeAst::Enum(_),
                ..
            } => {
                self.module.declare_opaque_type(name);
                self.module.set_type_body(name, crate::ir::enum_layout());
                IrType::Named(name.to_owned())
            }
            _ => {
                self.push_error(CompileError::TypeNotFound {
                    name: name.to_owned(),
                    location: self.error_location(),
                });
                IrType::I32
            }
        };

        self.import_type_cache.insert(key, result.clone());
        result
    }

    /// Resolves `ty` as it would be seen from `owner`'s module — used
    /// while rebuilding an imported struct's field list, since a field's
    /// own named type might itself need importing from `owner` (or a
    /// module `owner` imports from), not from the current module.
    fn resolve_type_in_owner_context(&mut self, owner: &str, ty: &crate::ast::Type) -> IrType {
        use crate::ast::Type;
        match ty {
            Type::Named { name, args } if args.is_empty() => {
                if self.module.has_type(name) {
                    // Already local (including the struct being built).
                    if matches!(
                        self.st.lookup_in_module(owner, name),
                        Some(Symbol::Type { ast: TypeAst::Struct(_), .. })
                    ) {
                        IrType::Pointer
                    } else {
                        IrType::Named(name.clone())
                    }
                } else if self.st.lookup_in_module(owner, name).is_some() {
                    self.import_type(owner, name)
                } else {
                    self.resolve_type(ty)
                }
            }
            _ => self.resolve_type(ty),
        }
    }

    /// Ensures a local external declaration exists for `owner::name`,
    /// creating one (with types translated into the current module's IR
    /// context) the first time it's called, then returns the local name to
    /// call together with its return-shape hint (spec.md §4.5 step 3).
    pub fn import_function(
        &mut self,
        owner: &str,
        name: &str,
    ) -> (String, Option<crate::symbol_table::NamedReturnShape>) {
        if let Some(existing) = self.module.find_function(name) {
            return (name.to_owned(), self.cached_return_shape(owner, name, &existing.return_type.clone()));
        }

        if !self.st.is_accessible(owner, name, &self.module_name) {
            self.push_error(CompileError::SymbolNotAccessible {
                qualified_name: format!("{owner}::{name}"),
                from_module: self.module_name.clone(),
                location: self.error_location(),
            });
            return (name.to_owned(), None);
        }

        let Some(Symbol::Function {
            param_types,
            return_type,
            return_shape,
            ..
        }) = self.st.lookup_in_module(owner, name).cloned()
        else {
            self.push_error(CompileError::SymbolNotFound {
                qualified_name: format!("{owner}::{name}"),
                location: self.error_location(),
            });
            return (name.to_owned(), None);
        };

        self.module.add_function(IrFunction::declaration(
            name.to_owned(),
            param_types,
            return_type,
        ));
        self.import_fn_cache.insert(name.to_owned());
        (name.to_owned(), return_shape)
    }

    /// The method counterpart to [`Self::import_function`]: struct methods
    /// live in the Symbol Table's separate global method registry (spec.md
    /// §4.3 "method resolution is global, not per-struct"), so the
    /// declaration is built directly from the already-resolved
    /// [`crate::symbol_table::MethodSymbol`] rather than re-looked-up
    /// through `lookup_in_module`, which never sees it.
    pub fn import_method(&mut self, sym: &crate::symbol_table::MethodSymbol) -> String {
        if self.module.find_function(&sym.ir_name).is_none() {
            self.module.add_function(IrFunction::declaration(
                sym.ir_name.clone(),
                sym.param_types.clone(),
                sym.return_type.clone(),
            ));
            self.import_fn_cache.insert(sym.ir_name.clone());
        }
        sym.ir_name.clone()
    }

    fn cached_return_shape(
        &self,
        owner: &str,
        name: &str,
        _return_type: &IrType,
    ) -> Option<crate::symbol_table::NamedReturnShape> {
        match self.st.lookup_in_module(owner, name) {
            Some(Symbol::Function { return_shape, .. }) => return_shape.clone(),
            _ => None,
        }
    }
}
