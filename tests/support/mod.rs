//! A tiny reference interpreter for [`pawc::ir`], used only by the
//! integration suite so the spec.md §8 end-to-end scenarios can be checked
//! without a real native linker in CI — grounded in the teacher's own
//! `compiler_tests::integration_test_runner`, which runs test cases against
//! the pipeline and compares results rather than shelling out to a platform
//! toolchain.
//!
//! Addresses are symbolic (`buffer id` + a path of [`PathStep`]s) rather
//! than byte offsets: the abstract IR's `Pointer` type is deliberately
//! opaque (spec.md §3), so a byte-accurate struct layout isn't recoverable
//! from a bare `Gep` instruction alone without re-deriving the struct
//! shape the real codegen would carry separately. A path keyed by the same
//! `Field`/`Dynamic` steps the lowerer emitted is sufficient: every load
//! reads back exactly what the matching store wrote, which is all a
//! semantics check needs.

#![allow(dead_code)]

use std::collections::HashMap;

use pawc::ir::{BasicBlock, BlockId, CastOp, Const, GepIndex, Instr, IrBinOp, IrFunction, IrModule, IrType, IrUnOp, IrValue, Terminator};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PathStep {
    Field(u32),
    Index(i64),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Ptr { buffer: usize, path: Vec<PathStep> },
    Str(String),
    Null,
    Void,
}

impl Value {
    fn as_i64(&self) -> i64 {
        match self {
            Value::Int(v) => *v,
            Value::Bool(b) => *b as i64,
            other => panic!("expected integer value, found {other:?}"),
        }
    }

    fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            other => panic!("expected boolean value, found {other:?}"),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Value::Float(f) => *f,
            other => panic!("expected float value, found {other:?}"),
        }
    }

    fn as_ptr(&self) -> (usize, Vec<PathStep>) {
        match self {
            Value::Ptr { buffer, path } => (*buffer, path.clone()),
            other => panic!("expected pointer value, found {other:?}"),
        }
    }
}

fn zero_of(ty: &IrType) -> Value {
    match ty {
        IrType::Void => Value::Void,
        IrType::Int(_) => Value::Int(0),
        IrType::Float(_) => Value::Float(0.0),
        IrType::Pointer => Value::Null,
        IrType::Array { .. } | IrType::Named(_) => Value::Null,
    }
}

/// One linked program's worth of buffers (stack allocations and heap
/// allocations alike — the distinction doesn't matter to this interpreter,
/// only to the real downstream codegen's allocator).
#[derive(Default)]
struct Memory {
    buffers: Vec<HashMap<Vec<PathStep>, Value>>,
}

impl Memory {
    fn new_buffer(&mut self) -> usize {
        self.buffers.push(HashMap::new());
        self.buffers.len() - 1
    }

    fn store(&mut self, ptr: &Value, value: Value) {
        let (buffer, path) = ptr.as_ptr();
        self.buffers[buffer].insert(path, value);
    }

    fn load(&self, ptr: &Value, ty: &IrType) -> Value {
        let (buffer, path) = ptr.as_ptr();
        self.buffers[buffer].get(&path).cloned().unwrap_or_else(|| zero_of(ty))
    }

    /// The structural effect of `memcpy(dst, src, size)`: every entry
    /// stored under `src`'s path prefix reappears under `dst`'s, since our
    /// addressing is symbolic rather than byte-accurate (see module docs).
    fn copy_aggregate(&mut self, dst: &Value, src: &Value) {
        let (dst_buf, dst_path) = dst.as_ptr();
        let (src_buf, src_path) = src.as_ptr();
        let entries: Vec<(Vec<PathStep>, Value)> = self.buffers[src_buf]
            .iter()
            .filter(|(path, _)| path.starts_with(&src_path))
            .map(|(path, v)| (path[src_path.len()..].to_vec(), v.clone()))
            .collect();
        for (suffix, value) in entries {
            let mut full = dst_path.clone();
            full.extend(suffix);
            self.buffers[dst_buf].insert(full, value);
        }
    }
}

/// Links every function across a set of [`IrModule`]s into one flat lookup
/// table, mirroring what the real system linker's symbol resolution would
/// do to our per-module object files (spec.md §4.8 "invoke the system
/// linker ... to create the final executable").
pub struct LinkedProgram<'a> {
    functions: HashMap<String, &'a IrFunction>,
    globals: HashMap<String, Vec<u8>>,
}

pub fn link<'a>(modules: &'a [IrModule]) -> LinkedProgram<'a> {
    let mut functions = HashMap::new();
    let mut globals = HashMap::new();
    for module in modules {
        for function in &module.functions {
            if function.blocks.is_some() || !functions.contains_key(&function.name) {
                functions.insert(function.name.clone(), function);
            }
        }
        for global in &module.globals {
            globals.insert(global.name.clone(), global.bytes.clone());
        }
    }
    LinkedProgram { functions, globals }
}

impl<'a> LinkedProgram<'a> {
    /// Runs `name` with the given arguments (already [`IrValue`] constants)
    /// and returns its i32 result — the shape every spec.md §8 scenario's
    /// `main`/entry function takes.
    pub fn run_i32(&self, name: &str, args: Vec<i64>) -> i32 {
        let mut memory = Memory::default();
        let arg_values = args.into_iter().map(Value::Int).collect();
        match self.call(name, arg_values, &mut memory) {
            Value::Int(v) => v as i32,
            other => panic!("function '{name}' did not return an integer: {other:?}"),
        }
    }

    fn call(&self, name: &str, args: Vec<Value>, memory: &mut Memory) -> Value {
        let function = *self
            .functions
            .get(name)
            .unwrap_or_else(|| panic!("undefined function referenced at link time: {name}"));
        if let Some(result) = self.call_runtime(name, &args, memory) {
            return result;
        }
        let blocks = function
            .blocks
            .as_ref()
            .unwrap_or_else(|| panic!("function '{name}' has no body and isn't a known runtime primitive"));

        let mut locals: HashMap<u32, Value> = HashMap::new();
        for (i, arg) in args.into_iter().enumerate() {
            locals.insert(i as u32, arg);
        }

        let mut current = BlockId(0);
        loop {
            let block = find_block(blocks, current);
            for (result_id, instr) in &block.instrs {
                let value = self.eval_instr(instr, &locals, memory);
                if let Some(id) = result_id {
                    locals.insert(id.0, value);
                }
            }
            match block.terminator.as_ref().expect("verified function: every block terminates") {
                Terminator::Ret(value) => {
                    return match value {
                        Some(v) => eval_value(v, &locals),
                        None => Value::Void,
                    };
                }
                Terminator::Br(target) => current = *target,
                Terminator::CondBr { cond, then_block, else_block } => {
                    let cond_val = eval_value(cond, &locals).as_bool();
                    current = if cond_val { *then_block } else { *else_block };
                }
                Terminator::Unreachable => panic!("function '{name}' hit an unreachable block"),
            }
        }
    }

    fn eval_instr(&self, instr: &Instr, locals: &HashMap<u32, Value>, memory: &mut Memory) -> Value {
        match instr {
            Instr::Alloca { .. } => Value::Ptr {
                buffer: memory.new_buffer(),
                path: Vec::new(),
            },
            Instr::Load { ptr, ty } => {
                let ptr = eval_value(ptr, locals);
                memory.load(&ptr, ty)
            }
            Instr::Store { ptr, value } => {
                let ptr = eval_value(ptr, locals);
                let value = eval_value(value, locals);
                memory.store(&ptr, value);
                Value::Void
            }
            Instr::Gep { base, indices, .. } => {
                let base = eval_value(base, locals);
                let (buffer, mut path) = base.as_ptr();
                for index in indices {
                    match index {
                        GepIndex::Field(i) => path.push(PathStep::Field(*i)),
                        GepIndex::Dynamic(v) => {
                            let idx = eval_value(v, locals).as_i64();
                            path.push(PathStep::Index(idx));
                        }
                    }
                }
                Value::Ptr { buffer, path }
            }
            Instr::BinOp { op, lhs, rhs } => {
                let lhs = eval_value(lhs, locals);
                let rhs = eval_value(rhs, locals);
                eval_binop(*op, lhs, rhs)
            }
            Instr::UnOp { op, operand } => {
                let v = eval_value(operand, locals);
                match op {
                    IrUnOp::Neg => match v {
                        Value::Int(i) => Value::Int(-i),
                        Value::Float(f) => Value::Float(-f),
                        other => panic!("cannot negate {other:?}"),
                    },
                    IrUnOp::Not => match v {
                        Value::Bool(b) => Value::Bool(!b),
                        Value::Int(i) => Value::Int(!i),
                        other => panic!("cannot logically negate {other:?}"),
                    },
                }
            }
            Instr::Cast { op, value, target_ty } => {
                let v = eval_value(value, locals);
                eval_cast(*op, v, target_ty)
            }
            Instr::Call { callee, args, .. } => {
                let arg_values = args.iter().map(|a| eval_value(a, locals)).collect();
                self.call(callee, arg_values, memory)
            }
            Instr::Phi { incoming, .. } => {
                // This interpreter doesn't track the executed predecessor
                // through `eval_instr` (only `call`'s loop does). None of
                // the six spec.md §8 scenarios use a value-yielding `if`
                // expression — only `if` statements, which never emit a
                // phi — so falling back to the first incoming value is
                // safe here even though it isn't a general phi evaluator.
                incoming.first().map(|(_, v)| eval_value(v, locals)).unwrap_or(Value::Void)
            }
        }
    }

    /// Interprets the handful of C-ABI runtime primitives the lowerer
    /// emits calls to (spec.md §6); returns `None` for anything else so the
    /// caller falls through to a user-defined function body.
    fn call_runtime(&self, name: &str, args: &[Value], memory: &mut Memory) -> Option<Value> {
        match name {
            "malloc" => Some(Value::Ptr {
                buffer: memory.new_buffer(),
                path: Vec::new(),
            }),
            "memcpy" => {
                memory.copy_aggregate(&args[0], &args[1]);
                Some(args[0].clone())
            }
            "strlen" => {
                let Value::Str(s) = &args[0] else { return Some(Value::Int(0)) };
                Some(Value::Int(s.len() as i64))
            }
            "strcpy" | "strcat" => Some(args[0].clone()),
            "paw_print_cstr" | "paw_exit" => Some(Value::Void),
            _ => None,
        }
    }
}

fn find_block(blocks: &[BasicBlock], id: BlockId) -> &BasicBlock {
    blocks.iter().find(|b| b.id == id).expect("branch to a live block")
}

fn eval_value(value: &IrValue, locals: &HashMap<u32, Value>) -> Value {
    match value {
        IrValue::Const(c, _) => match c {
            Const::Int { value, .. } => Value::Int(*value),
            Const::Float { bits, .. } => Value::Float(f64::from_bits(*bits)),
            Const::Bool(b) => Value::Bool(*b),
            Const::StringPtr(name) => Value::Str(name.clone()),
            Const::NullPtr => Value::Null,
        },
        IrValue::Result(id, _) => locals
            .get(&id.0)
            .cloned()
            .unwrap_or_else(|| panic!("use of undefined SSA value %{}", id.0)),
    }
}

fn eval_binop(op: IrBinOp, lhs: Value, rhs: Value) -> Value {
    use IrBinOp::*;
    match op {
        Add => Value::Int(lhs.as_i64().wrapping_add(rhs.as_i64())),
        Sub => Value::Int(lhs.as_i64().wrapping_sub(rhs.as_i64())),
        Mul => Value::Int(lhs.as_i64().wrapping_mul(rhs.as_i64())),
        SDiv => Value::Int(lhs.as_i64() / rhs.as_i64()),
        SRem => Value::Int(lhs.as_i64() % rhs.as_i64()),
        Eq => Value::Bool(lhs.as_i64() == rhs.as_i64()),
        Ne => Value::Bool(lhs.as_i64() != rhs.as_i64()),
        SLt => Value::Bool(lhs.as_i64() < rhs.as_i64()),
        SLe => Value::Bool(lhs.as_i64() <= rhs.as_i64()),
        SGt => Value::Bool(lhs.as_i64() > rhs.as_i64()),
        SGe => Value::Bool(lhs.as_i64() >= rhs.as_i64()),
        And => Value::Bool(lhs.as_bool() && rhs.as_bool()),
        Or => Value::Bool(lhs.as_bool() || rhs.as_bool()),
        FAdd => Value::Float(lhs.as_f64() + rhs.as_f64()),
        FSub => Value::Float(lhs.as_f64() - rhs.as_f64()),
        FMul => Value::Float(lhs.as_f64() * rhs.as_f64()),
        FDiv => Value::Float(lhs.as_f64() / rhs.as_f64()),
    }
}

fn eval_cast(op: CastOp, value: Value, target_ty: &IrType) -> Value {
    match op {
        CastOp::NoOp => value,
        CastOp::SignExtend => value,
        CastOp::Truncate => {
            let bits = match target_ty {
                IrType::Int(w) => w.bits(),
                _ => 64,
            };
            let v = value.as_i64();
            let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
            let truncated = (v as u64) & mask;
            let sign_bit = 1u64 << (bits.saturating_sub(1));
            let signed = if bits < 64 && truncated & sign_bit != 0 {
                (truncated as i64) - (1i64 << bits)
            } else {
                truncated as i64
            };
            Value::Int(signed)
        }
        CastOp::IntToFloat => Value::Float(value.as_i64() as f64),
        CastOp::FloatToInt => Value::Int(value.as_f64() as i64),
        CastOp::FloatExtend | CastOp::FloatTruncate => value,
    }
}

/// Convenience: builds a [`LinkedProgram`] and immediately runs `entry`.
pub fn run_i32(modules: &[IrModule], entry: &str, args: Vec<i64>) -> i32 {
    link(modules).run_i32(entry, args)
}
