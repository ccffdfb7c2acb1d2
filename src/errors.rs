//! Error types with rich diagnostics using miette
//!
//! Parsing reports one [`SyntaxError`] at the deepest failure, interpretation
//! reports one [`ExecutionError`]. [`XyError`] is what the public entry points
//! return.

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Where a diagram lives inside the enclosing document.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Name of the source (document name or "<input>")
    pub name: String,
    /// Line of the enclosing document on which the diagram source starts (0-based)
    pub line_offset: usize,
}

impl SourceInfo {
    pub fn new(name: impl Into<String>, line_offset: usize) -> Self {
        Self {
            name: name.into(),
            line_offset,
        }
    }
}

impl Default for SourceInfo {
    fn default() -> Self {
        Self::new("<input>", 0)
    }
}

// ============================================================================
// Syntax Errors
// ============================================================================

/// The single fatal parse error, positioned at the deepest recorded failure.
#[derive(Error, Diagnostic, Debug)]
#[error("syntax error at {line}.{column}: {message}\n{source_line}\n{caret}")]
#[diagnostic(code(xyru::parse::syntax))]
pub struct SyntaxError {
    pub message: String,
    /// 1-based line, shifted by the diagram's line offset in its document
    pub line: usize,
    /// 1-based column, counted in characters
    pub column: usize,
    pub source_line: String,
    pub caret: String,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("{message}")]
    pub span: SourceSpan,
}

impl SyntaxError {
    /// Build the error for a failure at byte `offset` of `source`.
    pub fn at(info: &SourceInfo, source: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[offset..]
            .find('\n')
            .map_or(source.len(), |i| offset + i);
        let line = before.matches('\n').count() + 1;
        let column = source[line_start..offset].chars().count() + 1;
        let width = source[offset..]
            .chars()
            .next()
            .map_or(0, |c| c.len_utf8());

        Self {
            message: message.into(),
            line: line + info.line_offset,
            column,
            source_line: source[line_start..line_end].to_string(),
            caret: format!("{}^", " ".repeat(column - 1)),
            src: NamedSource::new(&info.name, source.to_string()),
            span: SourceSpan::new(offset.into(), width),
        }
    }
}

// ============================================================================
// Execution Errors
// ============================================================================

/// Errors raised while interpreting a parsed diagram. None are recovered.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("undefined position \"{name}\"")]
    #[diagnostic(
        code(xyru::exec::undefined_position),
        help("save a position first with `=\"{name}\"`")
    )]
    UndefinedPosition { name: String },

    #[error("saved value \"{name}\" is a {found}, not a {expected}")]
    #[diagnostic(code(xyru::exec::wrong_saved_kind))]
    WrongSavedKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("pop from an empty position stack")]
    #[diagnostic(code(xyru::exec::empty_stack))]
    EmptyStack,

    #[error("stack position s{index} out of range (stack holds {len})")]
    #[diagnostic(code(xyru::exec::stack_index))]
    StackIndex { index: usize, len: usize },

    #[error("\\restore without a matching \\save")]
    #[diagnostic(code(xyru::exec::unbalanced_restore))]
    UnbalancedRestore,

    #[error("matrix hop used outside of a matrix entry")]
    #[diagnostic(code(xyru::exec::hop_outside_matrix))]
    HopOutsideMatrix,

    #[error("matrix has no entry at row {row}, column {column}")]
    #[diagnostic(code(xyru::exec::no_such_entry))]
    NoSuchEntry { row: isize, column: isize },

    #[error("saved coordinate \"{name}\" expands into itself")]
    #[diagnostic(code(xyru::exec::recursive_macro))]
    RecursiveMacro { name: String },

    #[error("{object} requires {attribute}")]
    #[diagnostic(code(xyru::exec::missing_attribute))]
    MissingAttribute {
        object: &'static str,
        attribute: &'static str,
    },

    #[error("cannot import into a zero-sized box ({width} x {height})")]
    #[diagnostic(code(xyru::exec::degenerate_import))]
    DegenerateImport { width: f64, height: f64 },
}

// ============================================================================
// Combined
// ============================================================================

/// Any failure of the parse-then-evaluate pipeline.
#[derive(Error, Diagnostic, Debug)]
pub enum XyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] ExecutionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_points_at_offending_column() {
        let src = "\\POS (0,0)\n*{A} ?? x";
        let offset = src.find('?').unwrap();
        let err = SyntaxError::at(&SourceInfo::default(), src, offset, "expected object");
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 6);
        assert_eq!(err.source_line, "*{A} ?? x");
        assert_eq!(err.caret, "     ^");
    }

    #[test]
    fn line_offset_shifts_reported_line() {
        let err = SyntaxError::at(&SourceInfo::new("doc.tex", 41), "abc", 1, "boom");
        assert_eq!(err.line, 42);
        assert_eq!(err.column, 2);
    }

    #[test]
    fn offset_past_end_is_clamped() {
        let err = SyntaxError::at(&SourceInfo::default(), "ab", 10, "unexpected end");
        assert_eq!(err.column, 3);
        assert_eq!(err.caret, "  ^");
    }

    #[test]
    fn execution_messages() {
        let err = ExecutionError::UndefinedPosition { name: "A".into() };
        assert_eq!(err.to_string(), "undefined position \"A\"");
        assert_eq!(
            ExecutionError::EmptyStack.to_string(),
            "pop from an empty position stack"
        );
    }
}
