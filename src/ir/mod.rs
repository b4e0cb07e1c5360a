//! Backend-agnostic IR: the output of this crate, and the input to the
//! opaque downstream codegen tool (spec.md §6).
//!
//! Modeled on an LLVM-style SSA IR (types, typed values, a builder that
//! appends instructions to basic blocks) but deliberately decoupled from any
//! concrete backend crate — the real object-file emission is someone else's
//! problem, reached through [`crate::codegen::ObjectCodegen`].

mod builder;
mod function;
mod module;
mod types;
mod value;

pub use builder::{Builder, BuilderError};
pub use function::{BasicBlock, BlockId, CastOp, GepIndex, Instr, IrBinOp, IrFunction, IrUnOp, Terminator};
pub use module::{IrModule, StringConstant};
pub use types::{enum_layout, ir_type_size_bytes, optional_layout, FloatWidth, IntWidth, IrType, StructBody};
pub use value::{Const, IrValue, ValueId};
