//! A small SSA instruction builder, scoped to exactly one function at a
//! time (spec.md §5: "IR modules, contexts, and builders are scoped to one
//! module's lowering"). [`crate::lower::Lowerer`] owns one `Builder` per
//! function it lowers and calls [`Builder::finish`] to hand back an
//! [`IrFunction`] once the body is done.

use super::function::{BasicBlock, BlockId, GepIndex, Instr, IrBinOp, IrUnOp, CastOp, Terminator};
use super::{IrFunction, IrType, IrValue, ValueId};

#[derive(Debug, Clone, PartialEq)]
pub enum BuilderError {
    /// An instruction was emitted into a block that already has a
    /// terminator — dead code past a `return`/`break`/`continue`.
    EmitAfterTerminator,
    UnknownBlock(BlockId),
}

pub struct Builder {
    blocks: Vec<BasicBlock>,
    current: BlockId,
    next_value: u32,
    next_block: u32,
}

impl Builder {
    /// Starts a fresh function with a single, unterminated entry block.
    pub fn new() -> Self {
        let entry = BlockId(0);
        Builder {
            blocks: vec![BasicBlock::new(entry)],
            current: entry,
            next_value: 0,
            next_block: 1,
        }
    }

    /// Starts a fresh function and reserves one SSA value per incoming
    /// parameter — arguments are values like any instruction result, they
    /// just aren't produced by one (an LLVM-style convention). Returns the
    /// builder plus the parameter values in declaration order, ready to be
    /// stored into per-parameter slots by statement lowering (spec.md
    /// §4.7).
    pub fn new_function(param_types: &[IrType]) -> (Self, Vec<IrValue>) {
        let mut builder = Builder::new();
        let params = param_types
            .iter()
            .map(|ty| {
                let id = ValueId(builder.next_value);
                builder.next_value += 1;
                IrValue::Result(id, ty.clone())
            })
            .collect();
        (builder, params)
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.push(BasicBlock::new(id));
        id
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn switch_to(&mut self, block: BlockId) {
        debug_assert!(self.blocks.iter().any(|b| b.id == block));
        self.current = block;
    }

    pub fn is_current_terminated(&self) -> bool {
        self.block(self.current).is_terminated()
    }

    fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks
            .iter()
            .find(|b| b.id == id)
            .expect("builder block id always refers to a live block")
    }

    fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .expect("builder block id always refers to a live block")
    }

    fn emit(&mut self, instr: Instr) -> Result<IrValue, BuilderError> {
        if self.is_current_terminated() {
            return Err(BuilderError::EmitAfterTerminator);
        }
        let ty = instr.result_ty();
        let id = ValueId(self.next_value);
        self.next_value += 1;
        let current = self.current;
        self.block_mut(current).instrs.push((Some(id), instr));
        Ok(IrValue::Result(id, ty))
    }

    /// Void instructions (`store`, a `void`-returning `call`) still consume
    /// a slot in the block but produce no usable value.
    fn emit_void(&mut self, instr: Instr) -> Result<(), BuilderError> {
        if self.is_current_terminated() {
            return Err(BuilderError::EmitAfterTerminator);
        }
        let current = self.current;
        self.block_mut(current).instrs.push((None, instr));
        Ok(())
    }

    pub fn alloca(&mut self, ty: IrType) -> Result<IrValue, BuilderError> {
        self.emit(Instr::Alloca { ty })
    }

    pub fn load(&mut self, ptr: IrValue, ty: IrType) -> Result<IrValue, BuilderError> {
        self.emit(Instr::Load { ptr, ty })
    }

    pub fn store(&mut self, ptr: IrValue, value: IrValue) -> Result<(), BuilderError> {
        self.emit_void(Instr::Store { ptr, value })
    }

    pub fn gep(
        &mut self,
        base: IrValue,
        indices: Vec<GepIndex>,
        pointee_ty: IrType,
    ) -> Result<IrValue, BuilderError> {
        self.emit(Instr::Gep {
            base,
            indices,
            pointee_ty,
        })
    }

    pub fn bin_op(&mut self, op: IrBinOp, lhs: IrValue, rhs: IrValue) -> Result<IrValue, BuilderError> {
        self.emit(Instr::BinOp { op, lhs, rhs })
    }

    pub fn un_op(&mut self, op: IrUnOp, operand: IrValue) -> Result<IrValue, BuilderError> {
        self.emit(Instr::UnOp { op, operand })
    }

    pub fn cast(&mut self, op: CastOp, value: IrValue, target_ty: IrType) -> Result<IrValue, BuilderError> {
        self.emit(Instr::Cast {
            op,
            value,
            target_ty,
        })
    }

    pub fn call(
        &mut self,
        callee: impl Into<String>,
        args: Vec<IrValue>,
        ret_ty: IrType,
    ) -> Result<IrValue, BuilderError> {
        if ret_ty.is_void() {
            self.emit_void(Instr::Call {
                callee: callee.into(),
                args,
                ret_ty,
            })?;
            return Ok(IrValue::const_i32(0));
        }
        self.emit(Instr::Call {
            callee: callee.into(),
            args,
            ret_ty,
        })
    }

    pub fn phi(&mut self, incoming: Vec<(BlockId, IrValue)>, ty: IrType) -> Result<IrValue, BuilderError> {
        self.emit(Instr::Phi { incoming, ty })
    }

    pub fn br(&mut self, target: BlockId) -> Result<(), BuilderError> {
        if self.is_current_terminated() {
            return Ok(());
        }
        let current = self.current;
        self.block_mut(current).terminator = Some(Terminator::Br(target));
        Ok(())
    }

    pub fn cond_br(
        &mut self,
        cond: IrValue,
        then_block: BlockId,
        else_block: BlockId,
    ) -> Result<(), BuilderError> {
        if self.is_current_terminated() {
            return Ok(());
        }
        let current = self.current;
        self.block_mut(current).terminator = Some(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
        Ok(())
    }

    pub fn ret(&mut self, value: Option<IrValue>) -> Result<(), BuilderError> {
        if self.is_current_terminated() {
            return Ok(());
        }
        let current = self.current;
        self.block_mut(current).terminator = Some(Terminator::Ret(value));
        Ok(())
    }

    pub fn unreachable(&mut self) {
        if self.is_current_terminated() {
            return;
        }
        let current = self.current;
        self.block_mut(current).terminator = Some(Terminator::Unreachable);
    }

    /// Consumes the builder, producing the finished [`IrFunction`]. Any
    /// block still missing a terminator gets an implicit `unreachable` —
    /// callers that want the spec's "default return if control fell off"
    /// behavior (statement lowering, §4.7) insert a real `ret` before
    /// calling this.
    pub fn finish(
        mut self,
        name: String,
        param_types: Vec<IrType>,
        return_type: IrType,
        public: bool,
    ) -> IrFunction {
        for block in &mut self.blocks {
            if block.terminator.is_none() {
                block.terminator = Some(Terminator::Unreachable);
            }
        }
        IrFunction {
            name,
            param_types,
            return_type,
            public,
            blocks: Some(self.blocks),
            next_value_id: self.next_value,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}
