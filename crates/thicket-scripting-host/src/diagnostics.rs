//! Structured failure reporting for the script pipeline
//!
//! Every per-script failure (compile, load, initialize) is a value carrying
//! a list of diagnostics. Nothing in this module is ever propagated past the
//! runner as a panic or a fatal error.

use std::fmt;

/// Line/column position in the script source, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One compiler or loader message; everything the pipeline reports is an
/// error, so severity is implied.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    /// Source position, when the underlying error reports one
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "error at {}: {}", span, self.message),
            None => write!(f, "error: {}", self.message),
        }
    }
}

/// Which pipeline stage a script failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Source did not parse or validate
    Compile,
    /// Compiled module did not satisfy the script contract
    Load,
    /// The script's own `initialize` export trapped
    Initialize,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Compile => write!(f, "compile"),
            FailureStage::Load => write!(f, "load"),
            FailureStage::Initialize => write!(f, "initialize"),
        }
    }
}

/// A failed script transition, reported as a plain value
#[derive(Debug, Clone)]
pub struct ScriptFailure {
    pub stage: FailureStage,
    pub diagnostics: Vec<Diagnostic>,
}

impl ScriptFailure {
    pub fn single(stage: FailureStage, diagnostic: Diagnostic) -> Self {
        Self {
            stage,
            diagnostics: vec![diagnostic],
        }
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.stage)?;
        for diag in &self.diagnostics {
            write!(f, "; {}", diag)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_display_includes_span() {
        let diag = Diagnostic::error("unexpected token").with_span(SourceSpan { line: 3, column: 7 });
        assert_eq!(diag.to_string(), "error at 3:7: unexpected token");
    }

    #[test]
    fn failure_display_names_stage() {
        let failure = ScriptFailure::single(FailureStage::Compile, Diagnostic::error("bad"));
        assert!(failure.to_string().starts_with("compile failed"));
    }
}
