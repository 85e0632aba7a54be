//! Compiles one script source file into an in-memory executable module
//!
//! Script sources are WebAssembly text (`*.script.wat`). Compilation goes
//! through two stages: `wat` parses the text to a binary image, then wasmtime
//! compiles and validates that image into a [`wasmtime::Module`]. Both stages
//! report failure as a [`ScriptFailure`] value rather than an error that
//! could escape the runner.
//!
//! These functions are pure with respect to everything except the read-only
//! `Engine`, so concurrent compilations of different scripts are independent.

use std::path::Path;

use wasmtime::{Engine, Module};

use crate::diagnostics::{Diagnostic, FailureStage, ScriptFailure, SourceSpan};

/// Read and compile a script source file.
///
/// An unreadable file is reported as a compile failure, not an error: the
/// watcher will deliver a Removed event if the file is actually gone.
pub fn compile_file(engine: &Engine, path: &Path) -> Result<Module, ScriptFailure> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        ScriptFailure::single(
            FailureStage::Compile,
            Diagnostic::error(format!("failed to read {}: {}", path.display(), e)),
        )
    })?;

    compile_source(engine, path, &source)
}

/// Compile script source text into a module.
pub fn compile_source(engine: &Engine, path: &Path, source: &str) -> Result<Module, ScriptFailure> {
    let binary = wat::parse_str(source).map_err(|e| {
        let rendered = e.to_string();
        let mut diag =
            Diagnostic::error(format!("{}: {}", path.display(), rendered));
        if let Some(span) = span_from_rendered(&rendered) {
            diag = diag.with_span(span);
        }
        ScriptFailure::single(FailureStage::Compile, diag)
    })?;

    Module::new(engine, &binary).map_err(|e| {
        ScriptFailure::single(
            FailureStage::Compile,
            Diagnostic::error(format!("module validation failed: {:#}", e)),
        )
    })
}

/// Pull a `line:column` position out of a rendered wat error.
///
/// wat renders parse errors with a `--> path:line:col` locus line. The crate
/// does not expose the position structurally, so we recover it from the
/// rendering; when the shape changes we just return no span.
fn span_from_rendered(rendered: &str) -> Option<SourceSpan> {
    // Multi-line rendering with a `--> path:line:col` locus, or the
    // single-line `... at path:line:col` fallback.
    let locus = rendered
        .lines()
        .find(|l| l.trim_start().starts_with("-->"))
        .or_else(|| rendered.lines().find(|l| l.contains(" at ")))?;
    let mut parts = locus.trim_end().rsplitn(3, ':');
    let column = parts.next()?.trim().parse().ok()?;
    let line = parts.next()?.trim().parse().ok()?;
    Some(SourceSpan { line, column })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_engine() -> Engine {
        Engine::default()
    }

    #[test]
    fn compiles_valid_wat() {
        let engine = test_engine();
        let source = r#"(module (func (export "execute")))"#;
        let module = compile_source(&engine, &PathBuf::from("ok.script.wat"), source);
        assert!(module.is_ok());
    }

    #[test]
    fn syntax_error_yields_diagnostics_with_span() {
        let engine = test_engine();
        let source = "(module\n  (func (export \"execute\") oops))";
        let err = compile_source(&engine, &PathBuf::from("bad.script.wat"), source)
            .err()
            .expect("source should not compile");

        assert_eq!(err.stage, FailureStage::Compile);
        assert_eq!(err.diagnostics.len(), 1);
        let diag = &err.diagnostics[0];
        let span = diag.span.expect("wat errors carry a position");
        assert_eq!(span.line, 2);
    }

    #[test]
    fn missing_file_is_a_compile_failure() {
        let engine = test_engine();
        let err = compile_file(&engine, &PathBuf::from("/nonexistent/gone.script.wat"))
            .err()
            .expect("file does not exist");
        assert_eq!(err.stage, FailureStage::Compile);
    }

    #[test]
    fn span_parsing_handles_locus_line() {
        let rendered = "expected `(`\n     --> scripts/x.script.wat:12:34\n      |";
        let span = span_from_rendered(rendered).expect("locus present");
        assert_eq!(span.line, 12);
        assert_eq!(span.column, 34);
    }

    #[test]
    fn span_parsing_tolerates_missing_locus() {
        assert!(span_from_rendered("something went wrong").is_none());
    }
}
