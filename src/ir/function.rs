use super::{IrType, IrValue, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    Eq,
    Ne,
    SLt,
    SLe,
    SGt,
    SGe,
    And,
    Or,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrUnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    /// int -> int, narrower -> wider.
    SignExtend,
    /// int -> int, wider -> narrower.
    Truncate,
    /// signed int -> float.
    IntToFloat,
    /// float -> signed int.
    FloatToInt,
    FloatExtend,
    FloatTruncate,
    /// identical source/target type: a no-op retained for IR fidelity.
    NoOp,
}

/// A single GEP step: either a constant struct field index or a dynamic
/// array/pointer offset.
#[derive(Debug, Clone)]
pub enum GepIndex {
    Field(u32),
    Dynamic(IrValue),
}

#[derive(Debug, Clone)]
pub enum Instr {
    Alloca {
        ty: IrType,
    },
    Load {
        ptr: IrValue,
        ty: IrType,
    },
    Store {
        ptr: IrValue,
        value: IrValue,
    },
    /// Address computation; `result_ty` is the type of the addressed
    /// location (the GEP result is always a pointer to it).
    Gep {
        base: IrValue,
        indices: Vec<GepIndex>,
        pointee_ty: IrType,
    },
    BinOp {
        op: IrBinOp,
        lhs: IrValue,
        rhs: IrValue,
    },
    UnOp {
        op: IrUnOp,
        operand: IrValue,
    },
    Cast {
        op: CastOp,
        value: IrValue,
        target_ty: IrType,
    },
    Call {
        callee: String,
        args: Vec<IrValue>,
        ret_ty: IrType,
    },
    Phi {
        incoming: Vec<(BlockId, IrValue)>,
        ty: IrType,
    },
}

impl Instr {
    pub fn result_ty(&self) -> IrType {
        match self {
            Instr::Alloca { .. } => IrType::Pointer,
            Instr::Load { ty, .. } => ty.clone(),
            Instr::Store { .. } => IrType::Void,
            Instr::Gep { .. } => IrType::Pointer,
            Instr::BinOp { op, lhs, .. } => binop_result_ty(*op, lhs.ty()),
            Instr::UnOp { operand, .. } => operand.ty().clone(),
            Instr::Cast { target_ty, .. } => target_ty.clone(),
            Instr::Call { ret_ty, .. } => ret_ty.clone(),
            Instr::Phi { ty, .. } => ty.clone(),
        }
    }
}

fn binop_result_ty(op: IrBinOp, operand_ty: &IrType) -> IrType {
    use IrBinOp::*;
    match op {
        Eq | Ne | SLt | SLe | SGt | SGe | And | Or => IrType::BOOL,
        _ => operand_ty.clone(),
    }
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: IrValue,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(Option<IrValue>),
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    /// `None` results are instructions kept purely for side effects
    /// (`Store`, void `Call`).
    pub instrs: Vec<(Option<ValueId>, Instr)>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        BasicBlock {
            id,
            instrs: Vec::new(),
            terminator: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub param_types: Vec<IrType>,
    pub return_type: IrType,
    pub public: bool,
    /// `None` for an imported declaration (an `extern` or a cross-module
    /// call stub); `Some` for an owned body.
    pub blocks: Option<Vec<BasicBlock>>,
    pub next_value_id: u32,
}

impl IrFunction {
    pub fn declaration(name: String, param_types: Vec<IrType>, return_type: IrType) -> Self {
        IrFunction {
            name,
            param_types,
            return_type,
            public: false,
            blocks: None,
            next_value_id: 0,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_none()
    }

    /// Whether every reachable basic block ends in a terminator and every
    /// referenced block id actually exists — the minimal shape the
    /// downstream codegen tool's verifier is assumed to check before
    /// lowering to machine code (spec.md §4.8).
    pub fn verify(&self) -> Result<(), String> {
        let Some(blocks) = &self.blocks else {
            return Ok(());
        };
        if blocks.is_empty() {
            return Err(format!("function '{}' has no entry block", self.name));
        }
        let ids: std::collections::HashSet<u32> = blocks.iter().map(|b| b.id.0).collect();
        for block in blocks {
            match &block.terminator {
                None => return Err(format!(
                    "function '{}': block {} is missing a terminator",
                    self.name, block.id.0
                )),
                Some(Terminator::Br(target)) if !ids.contains(&target.0) => {
                    return Err(format!(
                        "function '{}': block {} branches to unknown block {}",
                        self.name, block.id.0, target.0
                    ));
                }
                Some(Terminator::CondBr {
                    then_block,
                    else_block,
                    ..
                }) if !ids.contains(&then_block.0) || !ids.contains(&else_block.0) => {
                    return Err(format!(
                        "function '{}': block {} has a conditional branch to an unknown block",
                        self.name, block.id.0
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
