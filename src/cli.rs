//! Command-line entrypoint (SPEC_FULL.md §1: "a small CLI ... `pawc build
//! <path>`, `pawc check <path>`, `pawc new <path>`, `pawc help`"). Hand-rolled
//! argument parsing, no external crate, in the teacher's `cli.rs` idiom:
//! a private `Command` enum, `get_command`/`get_flags` parsing
//! `env::args()`, `colour` for terminal output.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use colour::{e_red_ln, green_ln_bold, grey_ln};

use crate::codegen::ExternalToolCodegen;
use crate::config::Config;
use crate::diagnostics::{self, CompileError};
use crate::module_compiler::PawCompiler;
use crate::module_loader::SourceParser;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Build { path: String },
    Check { path: String },
    New { path: String },
    Help,
}

/// Entry point called from `main`. `parser` is the front end's lexer/parser
/// seam (spec.md §1: out of scope here, supplied by the caller).
pub fn start_cli(parser: &dyn SourceParser) {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help(true);
        return;
    }

    let command = match get_command(&args[1..]) {
        Ok(command) => command,
        Err(e) => {
            e_red_ln!("{}", e);
            print_help(true);
            return;
        }
    };

    match command {
        Command::Help => print_help(true),
        Command::New { path } => run_new(&path),
        Command::Check { path } => run_build_or_check(parser, &path, true),
        Command::Build { path } => run_build_or_check(parser, &path, false),
    }
}

fn get_command(args: &[String]) -> Result<Command, String> {
    let command = args.first().map(String::as_str);

    match command {
        Some("help") => Ok(Command::Help),
        Some("new") => Ok(Command::New {
            path: args.get(1).cloned().unwrap_or_default(),
        }),
        Some("check") => Ok(Command::Check {
            path: args.get(1).cloned().unwrap_or_default(),
        }),
        Some("build") => Ok(Command::Build {
            path: args.get(1).cloned().unwrap_or_default(),
        }),
        Some(other) => Err(format!("Invalid command: '{other}'")),
        None => Err("No command given".to_owned()),
    }
}

fn run_new(path: &str) {
    let project_root = if path.is_empty() {
        prompt_user_for_input("Project path: ")
    } else {
        path.to_owned()
    };

    match create_new_project(&project_root) {
        Ok(()) => green_ln_bold!("Created new project at '{}'", project_root),
        Err(e) => e_red_ln!("Error creating project: {e}"),
    }
}

fn create_new_project(project_root: &str) -> Result<(), CompileError> {
    let root = PathBuf::from(project_root);
    std::fs::create_dir_all(&root).map_err(|e| CompileError::FileError {
        path: root.clone(),
        message: e.to_string(),
    })?;
    std::fs::create_dir_all(root.join("std")).map_err(|e| CompileError::FileError {
        path: root.clone(),
        message: e.to_string(),
    })?;

    let name = root
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "paw_project".to_owned());
    let manifest = format!(
        "[package]\nname = \"{name}\"\nversion = \"0.1.0\"\n\n[build]\nentry = \"main.paw\"\nstd_root = \"std\"\n"
    );
    std::fs::write(root.join(crate::config::MANIFEST_FILE_NAME), manifest).map_err(|e| {
        CompileError::FileError {
            path: root.clone(),
            message: e.to_string(),
        }
    })?;
    std::fs::write(root.join("main.paw"), "fn main() -> i32 {\n    return 0;\n}\n").map_err(|e| {
        CompileError::FileError {
            path: root.clone(),
            message: e.to_string(),
        }
    })?;
    Ok(())
}

/// `check_only` runs the front half of the pipeline (load, lower, verify)
/// and skips codegen/link — spec.md's `pawc check` is a "does this compile"
/// query, not a build.
fn run_build_or_check(parser: &dyn SourceParser, path: &str, check_only: bool) {
    let project_root = if path.is_empty() {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        PathBuf::from(path)
    };

    let config = match Config::load(&project_root) {
        Ok(config) => config,
        Err(e) => {
            diagnostics::print_error(&e);
            return;
        }
    };

    let entry_path = config.entry_path(&project_root);
    let mut compiler = PawCompiler::new(config, project_root.clone(), parser);

    if check_only {
        match check(&mut compiler, &entry_path) {
            Ok(()) => green_ln_bold!("ok"),
            Err(e) => diagnostics::print_error(&e),
        }
        return;
    }

    let output = compiler.config.output_name();
    let output_path = project_root.join(output);
    let codegen = ExternalToolCodegen::new("pawc-codegen");

    match compiler.compile_project(&entry_path, &codegen, &output_path) {
        Ok(()) => green_ln_bold!("Built '{}'", output_path.display()),
        Err(messages) => diagnostics::print_messages(&messages),
    }
}

fn check(compiler: &mut PawCompiler, entry_path: &Path) -> Result<(), CompileError> {
    let modules = compiler.load_modules(entry_path)?;
    compiler
        .lower_all(&modules)
        .map_err(|messages| messages.errors.into_iter().next().unwrap_or(CompileError::ToolFailure {
            stage: "check".to_owned(),
            exit_code: -1,
        }))
        .and_then(|ir_modules| compiler.verify_all(&ir_modules))
}

fn prompt_user_for_input(msg: &str) -> String {
    print!("{msg}");
    io::stdout().flush().ok();
    let mut input = String::new();
    io::stdin().read_line(&mut input).ok();
    input.trim().to_owned()
}

fn print_help(commands_only: bool) {
    if !commands_only {
        grey_ln!("------------------------------------");
        green_ln_bold!("The Paw compiler");
        println!("Usage: pawc <command> <args>");
    }
    green_ln_bold!("\nCommands:");
    println!("  build <path>   - Compiles a project to an executable");
    println!("  check <path>   - Type-checks a project without producing an executable");
    println!("  new <path>     - Scaffolds a new project");
    println!("  help           - Prints this message");
}
