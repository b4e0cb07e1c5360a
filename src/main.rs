//! `pawc` binary entry point.
//!
//! Lexing/parsing source text into an [`ast::Program`] is out of scope here
//! (spec.md §1) — the middle end is driven through the [`SourceParser`]
//! seam, so this binary wires in a stub that reports any attempted parse as
//! an unimplemented front end rather than silently accepting every file.

use std::path::Path;

use pawc::ast::Program;
use pawc::diagnostics::CompileError;
use pawc::module_loader::SourceParser;

struct UnimplementedParser;

impl SourceParser for UnimplementedParser {
    fn parse(&self, _source: &str, path: &Path) -> Result<Program, CompileError> {
        Err(CompileError::ParseError {
            location: pawc::diagnostics::ErrorLocation::new(
                String::new(),
                path.to_path_buf(),
                Default::default(),
            ),
            message: "no front end wired into this build of pawc".to_owned(),
        })
    }
}

fn main() {
    let parser = UnimplementedParser;
    pawc::cli::start_cli(&parser);
}
