//! PAWC — the middle-end compiler core for the Paw language.
//!
//! Lexing and parsing happen upstream; this crate starts from a parsed
//! [`ast::Program`] per module and carries it through type resolution,
//! generic monomorphization, and IR lowering, finishing with a per-module
//! object file and a final link into one executable.
#![allow(dead_code)]

pub mod ast;
pub mod ir;

pub mod diagnostics;
pub mod symbol_table;
pub mod module_loader;
pub mod type_resolver;
pub mod generics;
pub mod cross_module;
pub mod lower;
pub mod module_compiler;
pub mod codegen;
pub mod runtime_abi;

pub mod config;
pub mod cli;
