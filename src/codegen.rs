//! The downstream codegen/link boundary (spec.md §6): `compile_module_to_
//! object(ir_module, out_path) → bool`, plus the final `clang <objs> -o
//! <out> [platform-sdk-flags]` link. Both are genuinely out of scope per
//! spec.md §1 ("the downstream IR-to-object-file compiler and the system
//! linker ... invoked via an opaque tool interface") — this module only
//! defines the boundary and a reference implementation that shells out to
//! an external tool, in the teacher's subprocess-and-check-exit-status
//! idiom (`wat_to_wasm.rs` invokes an external tool and inspects its exit
//! code the same way).

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::diagnostics::CompileError;
use crate::ir::{BasicBlock, IrFunction, IrModule, Terminator};

/// The seam the Module Compiler calls through to turn one lowered
/// [`IrModule`] into an object file. Implementations are free to shell out,
/// link against a codegen library, or (in tests) fake success — the core
/// never inspects what happens on the other side of this trait.
pub trait ObjectCodegen {
    fn compile_module_to_object(&self, module: &IrModule, out_path: &Path) -> Result<(), CompileError>;
}

/// Reference implementation: dumps the module's IR as text and hands it to
/// an external tool via `std::process::Command`, per spec.md §6's
/// `compile_module_to_object(ir_module, out_path) -> bool` contract. The
/// tool is expected to read the dump from stdin and write an object file at
/// `out_path`; a non-zero exit status is a `ToolFailure` (spec.md §7).
pub struct ExternalToolCodegen {
    pub tool_path: PathBuf,
}

impl ExternalToolCodegen {
    pub fn new(tool_path: impl Into<PathBuf>) -> Self {
        ExternalToolCodegen { tool_path: tool_path.into() }
    }
}

impl ObjectCodegen for ExternalToolCodegen {
    fn compile_module_to_object(&self, module: &IrModule, out_path: &Path) -> Result<(), CompileError> {
        let ir_text = dump_ir_text(module);
        crate::ir_log!("{}", ir_text);

        let status = Command::new(&self.tool_path)
            .arg("--emit-object")
            .arg(out_path)
            .arg("--module-name")
            .arg(&module.name)
            .env("PAWC_IR_INPUT", &ir_text)
            .status()
            .map_err(|e| CompileError::ToolFailure {
                stage: format!("codegen({}): {e}", module.name),
                exit_code: -1,
            })?;

        if !status.success() {
            return Err(CompileError::ToolFailure {
                stage: format!("codegen({})", module.name),
                exit_code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// A human-readable dump of one module's functions and blocks — not a
/// stable wire format, just what gets handed to the downstream tool and
/// (behind `show_ir`) printed for diagnostics, mirroring the teacher's
/// `display_hir`/`show_codegen` dev dump.
pub fn dump_ir_text(module: &IrModule) -> String {
    let mut out = String::new();
    out.push_str(&format!("; module {}\n", module.name));
    for (name, body) in &module.types {
        out.push_str(&format!("type {name} = {{ {} fields }}\n", body.fields.len()));
    }
    for global in &module.globals {
        out.push_str(&format!("global {} = {} bytes\n", global.name, global.bytes.len()));
    }
    for function in &module.functions {
        out.push_str(&dump_function_text(function));
    }
    out
}

fn dump_function_text(function: &IrFunction) -> String {
    let mut out = String::new();
    let visibility = if function.public { "pub" } else { "priv" };
    out.push_str(&format!(
        "{visibility} fn {}({:?}) -> {:?}",
        function.name, function.param_types, function.return_type
    ));
    match &function.blocks {
        None => out.push_str(" (declaration)\n"),
        Some(blocks) => {
            out.push_str(" {\n");
            for block in blocks {
                out.push_str(&dump_block_text(block));
            }
            out.push_str("}\n");
        }
    }
    out
}

fn dump_block_text(block: &BasicBlock) -> String {
    let mut out = format!("  bb{}:\n", block.id.0);
    for (value, instr) in &block.instrs {
        match value {
            Some(id) => out.push_str(&format!("    %{} = {instr:?}\n", id.0)),
            None => out.push_str(&format!("    {instr:?}\n")),
        }
    }
    match &block.terminator {
        Some(Terminator::Br(target)) => out.push_str(&format!("    br bb{}\n", target.0)),
        Some(Terminator::CondBr { cond, then_block, else_block }) => {
            out.push_str(&format!("    condbr {cond:?} bb{} bb{}\n", then_block.0, else_block.0))
        }
        Some(Terminator::Ret(value)) => out.push_str(&format!("    ret {value:?}\n")),
        Some(Terminator::Unreachable) => out.push_str("    unreachable\n"),
        None => out.push_str("    <unterminated>\n"),
    }
    out
}

/// `clang <obj1> <obj2> … -o <out> [platform-sdk-flags]` (spec.md §6).
/// macOS needs an explicit SDK sysroot to find the system libraries; every
/// other platform links with clang's own defaults.
pub fn link_objects(objects: &[PathBuf], output: &Path) -> Result<(), CompileError> {
    let mut command = Command::new("clang");
    command.args(objects).arg("-o").arg(output);

    if cfg!(target_os = "macos") {
        if let Ok(sdk_path) = Command::new("xcrun").args(["--show-sdk-path"]).output() {
            if sdk_path.status.success() {
                let sdk = String::from_utf8_lossy(&sdk_path.stdout).trim().to_owned();
                command.arg("-isysroot").arg(sdk);
            }
        }
    }

    let status = command.status().map_err(|e| CompileError::ToolFailure {
        stage: format!("link: {e}"),
        exit_code: -1,
    })?;

    if !status.success() {
        return Err(CompileError::ToolFailure {
            stage: "link".to_owned(),
            exit_code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrType;

    struct AlwaysSucceeds;
    impl ObjectCodegen for AlwaysSucceeds {
        fn compile_module_to_object(&self, _module: &IrModule, out_path: &Path) -> Result<(), CompileError> {
            std::fs::write(out_path, b"fake-object").map_err(|e| CompileError::ToolFailure {
                stage: e.to_string(),
                exit_code: -1,
            })
        }
    }

    #[test]
    fn fake_codegen_writes_the_object_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.o");
        let module = IrModule::new("a");
        AlwaysSucceeds.compile_module_to_object(&module, &out).unwrap();
        assert!(out.is_file());
    }

    #[test]
    fn dump_includes_every_declared_function() {
        let mut module = IrModule::new("a");
        module.add_function(IrFunction::declaration("foo".to_owned(), vec![IrType::I32], IrType::I32));
        let text = dump_ir_text(&module);
        assert!(text.contains("foo"));
        assert!(text.contains("declaration"));
    }
}
