//! Unified error/diagnostic types (spec.md §7), plus the dev-logging
//! macros and colored terminal printing that make up the ambient
//! observability stack (SPEC_FULL.md §1).
//!
//! Grounded in the teacher's `compiler_frontend/compiler_messages/*`:
//! one `CompileError` enum carrying an `ErrorLocation`, aggregated into a
//! `CompilerMessages { errors, warnings }`, printed with `colour`.

use std::fmt;
use std::path::PathBuf;

use crate::ast::Span;

/// Where a diagnostic originated: which module, and where in its source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLocation {
    pub module: String,
    pub file: PathBuf,
    pub span: Span,
}

impl ErrorLocation {
    pub fn new(module: impl Into<String>, file: PathBuf, span: Span) -> Self {
        ErrorLocation {
            module: module.into(),
            file,
            span,
        }
    }

    pub fn in_module(module: impl Into<String>) -> Self {
        ErrorLocation {
            module: module.into(),
            file: PathBuf::new(),
            span: Span::default(),
        }
    }
}

/// The taxonomy from spec.md §7, one variant per named error kind.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    ParseError {
        location: ErrorLocation,
        message: String,
    },
    CyclicImport {
        cycle: Vec<String>,
    },
    SymbolNotFound {
        qualified_name: String,
        location: ErrorLocation,
    },
    SymbolNotAccessible {
        qualified_name: String,
        from_module: String,
        location: ErrorLocation,
    },
    DuplicateDeclaration {
        module: String,
        name: String,
    },
    TypeNotFound {
        name: String,
        location: ErrorLocation,
    },
    AmbiguousType {
        name: String,
        location: ErrorLocation,
    },
    GenericArityMismatch {
        name: String,
        expected: usize,
        got: usize,
        location: ErrorLocation,
    },
    UnresolvedGeneric {
        param_name: String,
        location: ErrorLocation,
    },
    PatternNotSupported {
        kind: String,
        location: ErrorLocation,
    },
    InvalidTryTarget {
        location: ErrorLocation,
    },
    MismatchedIfBranches {
        then_type: String,
        else_type: String,
        location: ErrorLocation,
    },
    BreakOutsideLoop {
        location: ErrorLocation,
    },
    ContinueOutsideLoop {
        location: ErrorLocation,
    },
    IrVerificationFailed {
        module: String,
        diagnostic: String,
    },
    ToolFailure {
        stage: String,
        exit_code: i32,
    },
    /// A file-system-level failure from the Module Loader (file not found,
    /// unreadable directory, ...).
    FileError {
        path: PathBuf,
        message: String,
    },
    /// `paw.toml` malformed or missing a required field.
    ConfigError {
        message: String,
    },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::ParseError { location, message } => {
                write!(f, "parse error in {}: {message}", location.module)
            }
            CompileError::CyclicImport { cycle } => {
                write!(f, "cyclic import: {}", cycle.join(" -> "))
            }
            CompileError::SymbolNotFound { qualified_name, .. } => {
                write!(f, "symbol not found: {qualified_name}")
            }
            CompileError::SymbolNotAccessible {
                qualified_name,
                from_module,
                ..
            } => write!(
                f,
                "symbol '{qualified_name}' is not visible from module '{from_module}'"
            ),
            CompileError::DuplicateDeclaration { module, name } => {
                write!(f, "'{name}' is already declared in module '{module}'")
            }
            CompileError::TypeNotFound { name, .. } => write!(f, "type not found: {name}"),
            CompileError::AmbiguousType { name, .. } => write!(f, "ambiguous type: {name}"),
            CompileError::GenericArityMismatch {
                name,
                expected,
                got,
                ..
            } => write!(
                f,
                "'{name}' expects {expected} type argument(s), got {got}"
            ),
            CompileError::UnresolvedGeneric { param_name, .. } => {
                write!(f, "unresolved generic parameter '{param_name}' reached IR")
            }
            CompileError::PatternNotSupported { kind, .. } => {
                write!(f, "unsupported pattern: {kind}")
            }
            CompileError::InvalidTryTarget { .. } => {
                write!(f, "'?' applied to a non-Optional value")
            }
            CompileError::MismatchedIfBranches {
                then_type,
                else_type,
                ..
            } => write!(
                f,
                "if-expression branches disagree: then is {then_type}, else is {else_type}"
            ),
            CompileError::BreakOutsideLoop { .. } => write!(f, "'break' outside a loop"),
            CompileError::ContinueOutsideLoop { .. } => write!(f, "'continue' outside a loop"),
            CompileError::IrVerificationFailed { module, diagnostic } => {
                write!(f, "IR verification failed in module '{module}': {diagnostic}")
            }
            CompileError::ToolFailure { stage, exit_code } => {
                write!(f, "{stage} exited with status {exit_code}")
            }
            CompileError::FileError { path, message } => {
                write!(f, "{}: {message}", path.display())
            }
            CompileError::ConfigError { message } => write!(f, "paw.toml: {message}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// A non-fatal diagnostic — currently unused by the core (spec.md defines
/// no warning taxonomy), kept as a plain message so `CompilerMessages`
/// matches the teacher's `{ errors, warnings }` shape exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerWarning {
    pub location: ErrorLocation,
    pub message: String,
}

/// The aggregate the Module Compiler accumulates per pass before deciding
/// whether the compile can proceed (spec.md §7: "a non-empty error set
/// fails the whole compile").
#[derive(Debug, Clone, Default)]
pub struct CompilerMessages {
    pub errors: Vec<CompileError>,
    pub warnings: Vec<CompilerWarning>,
}

impl CompilerMessages {
    pub fn new() -> Self {
        CompilerMessages::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn push_error(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: CompilerMessages) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Prints one diagnostic to stderr in the teacher's style: a colored
/// severity tag followed by the message and source location.
pub fn print_error(error: &CompileError) {
    colour::e_red_ln_bold!("error: {error}");
}

pub fn print_warning(warning: &CompilerWarning) {
    colour::e_yellow_ln_bold!("warning: {}", warning.message);
}

pub fn print_messages(messages: &CompilerMessages) {
    for error in &messages.errors {
        print_error(error);
    }
    for warning in &messages.warnings {
        print_warning(warning);
    }
}

/// AST-dump dev logging, gated behind the `show_ast` feature — mirrors the
/// teacher's `ast_log!`/`hir_log!` macros in
/// `compiler_messages/compiler_dev_logging.rs`.
#[macro_export]
#[cfg(feature = "show_ast")]
macro_rules! ast_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}

#[macro_export]
#[cfg(not(feature = "show_ast"))]
macro_rules! ast_log {
    ($($arg:tt)*) => {};
}

/// IR-dump dev logging, gated behind `show_ir`.
#[macro_export]
#[cfg(feature = "show_ir")]
macro_rules! ir_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}

#[macro_export]
#[cfg(not(feature = "show_ir"))]
macro_rules! ir_log {
    ($($arg:tt)*) => {};
}

/// Per-stage timing, gated behind `detailed_timers`.
#[macro_export]
#[cfg(feature = "detailed_timers")]
macro_rules! timer_log {
    ($time:expr, $msg:expr) => {
        saying::say!($msg, Green #$time.elapsed());
    };
}

#[macro_export]
#[cfg(not(feature = "detailed_timers"))]
macro_rules! timer_log {
    ($time:expr, $msg:expr) => {};
}
