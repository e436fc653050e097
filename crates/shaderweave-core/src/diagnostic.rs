//! Structured diagnostic channel.
//!
//! Every compile failure is turned into a [`Diagnostic`]: the origin of the
//! source unit, the byte range it covers, a short message and a full
//! message with source context. Diagnostics aggregate into [`Diagnostics`]
//! so a single compile attempt reports everything it found, and may also be
//! forwarded to a [`DiagnosticSink`] as they are raised.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{ErrorCategory, ShaderError, render_with_source};
use crate::Span;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Compilation of the affected unit failed.
    Error,
    /// Compilation continued; the result may not be what the author meant.
    Warning,
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Origin of the source unit (usually a file name).
    pub origin: Arc<str>,
    /// Source span, absent for pipeline failures.
    pub span: Option<Span>,
    /// Taxonomy category.
    pub category: ErrorCategory,
    /// Severity.
    pub severity: Severity,
    /// One-line message.
    pub short_message: String,
    /// Message with location and source excerpt.
    pub full_message: String,
}

impl Diagnostic {
    /// Build an error diagnostic from a shader error.
    ///
    /// When `source` is supplied the full message carries the offending line
    /// and a caret marker.
    pub fn from_error(origin: impl Into<Arc<str>>, error: &ShaderError, source: Option<&str>) -> Self {
        let origin = origin.into();
        let span = error.span();
        let category = error.category();
        let short_message = error.short_message();
        let full_message = match (span, source) {
            (Some(span), Some(source)) => format!(
                "{}:{}",
                origin,
                render_with_source(source, span, category.as_str(), &short_message)
            ),
            (Some(span), None) => format!("{}:{}: {} error: {}", origin, span, category, short_message),
            (None, _) => format!("{}: {} error: {}", origin, category, short_message),
        };
        Self {
            origin,
            span,
            category,
            severity: Severity::Error,
            short_message,
            full_message,
        }
    }

    /// Build a warning.
    pub fn warning(
        origin: impl Into<Arc<str>>,
        span: Option<Span>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        let origin = origin.into();
        let short_message = message.into();
        let full_message = match span {
            Some(span) => format!("{}:{}: warning: {}", origin, span, short_message),
            None => format!("{}: warning: {}", origin, short_message),
        };
        Self {
            origin,
            span,
            category,
            severity: Severity::Warning,
            short_message,
            full_message,
        }
    }

    /// Byte offsets covered, when the diagnostic points at source text.
    pub fn byte_range(&self) -> Option<Range<u32>> {
        self.span.map(|s| s.byte_range())
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{}:{}: {}", self.origin, span, self.short_message),
            None => write!(f, "{}: {}", self.origin, self.short_message),
        }
    }
}

/// Receives diagnostics as they are raised.
pub trait DiagnosticSink: Send + Sync {
    /// Called once per diagnostic.
    fn report(&self, diagnostic: &Diagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&Diagnostic) + Send + Sync,
{
    fn report(&self, diagnostic: &Diagnostic) {
        self(diagnostic)
    }
}

/// An aggregating collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Add a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Convert and add a shader error.
    pub fn push_error(&mut self, origin: &Arc<str>, error: impl Into<ShaderError>, source: Option<&str>) {
        self.items
            .push(Diagnostic::from_error(origin.clone(), &error.into(), source));
    }

    /// Whether any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    /// Number of error diagnostics.
    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    /// Total number of diagnostics.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in the order diagnostics were raised.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Diagnostics raised for one source unit.
    pub fn for_origin<'a>(&'a self, origin: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.items.iter().filter(move |d| &*d.origin == origin)
    }

    /// Forward every diagnostic to a sink.
    pub fn forward(&self, sink: &dyn DiagnosticSink) {
        for diagnostic in &self.items {
            sink.report(diagnostic);
        }
    }

    /// Convert to a Vec.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompileError, PassError};
    use std::sync::Mutex;

    #[test]
    fn diagnostic_carries_byte_offsets() {
        let source = "[Pixel]\nclass Foo\n{\n}\n";
        let err: ShaderError = CompileError::ClassNotAllowed {
            name: "Foo".into(),
            span: Span::new(2, 1, 8, 9),
        }
        .into();
        let diag = Diagnostic::from_error("Foo.frag", &err, Some(source));

        assert_eq!(diag.byte_range(), Some(8..17));
        assert_eq!(diag.category, ErrorCategory::Structural);
        assert_eq!(
            diag.short_message,
            "Cannot declare class types in fragments. Use struct instead."
        );
        assert!(diag.full_message.starts_with("Foo.frag:"));
        assert!(diag.full_message.contains("class Foo"));
        assert!(diag.is_error());
    }

    #[test]
    fn pipeline_diagnostic_has_no_span() {
        let err: ShaderError = PassError::failed("backend", "boom").into();
        let diag = Diagnostic::from_error("Opaque_Pixel", &err, None);
        assert!(diag.byte_range().is_none());
        assert_eq!(diag.category, ErrorCategory::Pipeline);
    }

    #[test]
    fn aggregate_and_forward() {
        let origin: Arc<str> = Arc::from("a.frag");
        let mut diagnostics = Diagnostics::new();
        diagnostics.push_error(
            &origin,
            CompileError::UnknownAttribute {
                name: "X".into(),
                span: Span::default(),
            },
            None,
        );
        diagnostics.push(Diagnostic::warning("b.frag", None, ErrorCategory::Resolution, "w"));

        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.for_origin("b.frag").count(), 1);

        let seen = Mutex::new(Vec::new());
        let sink = |d: &Diagnostic| seen.lock().unwrap().push(d.short_message.clone());
        diagnostics.forward(&sink);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
