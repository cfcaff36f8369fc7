// diag.rs — Unified diagnostics model
//
// Shared diagnostic types for user-facing reports: network loading and the
// actor pipeline both turn their typed errors into a `Diagnostic` with a
// stable code before the CLI prints them.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use chumsky::span::Span as _;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `E0201`).
///
/// Codes are `&'static str` constants defined in the `codes` module. Once
/// assigned, a code never changes meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Assigned diagnostic codes. `E01xx`: structure of a network description.
/// `E02xx`: types. `E03xx`: actor pipeline.
pub mod codes {
    use super::DiagCode;

    pub const E0100: DiagCode = DiagCode("E0100"); // syntax error
    pub const E0101: DiagCode = DiagCode("E0101"); // empty required attribute
    pub const E0102: DiagCode = DiagCode("E0102"); // duplicate instance id
    pub const E0103: DiagCode = DiagCode("E0103"); // network without instances
    pub const E0104: DiagCode = DiagCode("E0104"); // unknown actor class
    pub const E0105: DiagCode = DiagCode("E0105"); // non-existent instance
    pub const E0106: DiagCode = DiagCode("E0106"); // non-existent source port
    pub const E0107: DiagCode = DiagCode("E0107"); // non-existent target port
    pub const E0108: DiagCode = DiagCode("E0108"); // buffer size not an integer
    pub const E0109: DiagCode = DiagCode("E0109"); // heterogeneous list parameter
    pub const E0201: DiagCode = DiagCode("E0201"); // connection type mismatch
    pub const E0301: DiagCode = DiagCode("E0301"); // loop reached if-conversion
    pub const E0302: DiagCode = DiagCode("E0302"); // no parent type for a cast
    pub const E0303: DiagCode = DiagCode("E0303"); // malformed phi
    pub const E0304: DiagCode = DiagCode("E0304"); // broken IR structure
    pub const E0305: DiagCode = DiagCode("E0305"); // guard evaluation failed
    pub const E0306: DiagCode = DiagCode("E0306"); // zero initial value too large
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain, outermost first.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub message: String,
    pub span: Option<Span>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by network loading or the actor pipeline.
///
/// `span` is absent for inputs without source text (JSON documents).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Option<Span>,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, related spans, or causes.
    pub fn new(level: DiagLevel, span: Option<Span>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
            cause_chain: Vec::new(),
        }
    }

    pub fn error(span: Option<Span>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            span,
        });
        self
    }

    /// Render with a `file:line:col` prefix resolved against `source`.
    pub fn render(&self, file: &str, source: Option<&str>) -> String {
        let location = match (self.span, source) {
            (Some(span), Some(text)) => {
                let (line, col) = line_col(text, span.start());
                format!("{file}:{line}:{col}")
            }
            _ => file.to_string(),
        };
        let mut out = format!("{location}: {self}");
        for cause in &self.cause_chain {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.message);
        }
        out
    }
}

/// 1-based line and column of byte `offset` in `text`.
fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count() + 1;
    let col = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;
    (line, col)
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
