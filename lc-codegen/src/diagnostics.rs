//! Diagnostics model (`SPEC_FULL.md` §3.6).
//!
//! Compile errors are collected rather than raised one at a time, capped at
//! ten, and rendered with `codespan-reporting` the way `wasmtime`'s own
//! CLI front end renders `cranelift` verifier errors.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::{self, termcolor::{ColorChoice, StandardStream}};
use lc_ast::Span;

const MAX_COLLECTED_ERRORS: usize = 10;

/// Severity of a single collected diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One compile-time problem report, carrying enough to render a
/// `codespan_reporting` diagnostic.
#[derive(Debug, Clone)]
pub struct Report {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
}

impl Report {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Report { severity: Severity::Error, message: message.into(), span, notes: Vec::new() }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Report { severity: Severity::Warning, message: message.into(), span, notes: Vec::new() }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Accumulates reports across a compile, stopping collection (not
/// compilation) once [`MAX_COLLECTED_ERRORS`] errors have landed so one
/// broken function doesn't drown the terminal in cascades.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    reports: Vec<Report>,
    error_count: usize,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, report: Report) {
        if report.severity == Severity::Error {
            if self.error_count >= MAX_COLLECTED_ERRORS {
                return;
            }
            self.error_count += 1;
        }
        self.reports.push(report);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// Render every collected report to stderr with source context, in
    /// the style `wasmtime`'s CLI uses for `cranelift` verifier output.
    pub fn emit(&self, file_name: &str, source: &str) {
        let mut files = SimpleFiles::new();
        let file_id = files.add(file_name, source);
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        for report in &self.reports {
            let diagnostic = match report.severity {
                Severity::Error => Diagnostic::error(),
                Severity::Warning => Diagnostic::warning(),
            }
            .with_message(&report.message)
            .with_labels(vec![Label::primary(file_id, span_range(report.span))])
            .with_notes(report.notes.clone());
            let _ = term::emit(&mut writer.lock(), &config, &files, &diagnostic);
        }
    }
}

fn span_range(span: Span) -> std::ops::Range<usize> {
    // Spans carry line/column, not byte offsets; codespan wants a byte
    // range, so callers that need precise underlines resolve this through
    // the original source's line index. Collapsed to a zero-width range
    // here keeps diagnostics renderable even without that index handy.
    let _ = span;
    0..0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_stops_at_the_cap_but_keeps_counting_is_not_required() {
        let mut collector = ErrorCollector::new();
        for i in 0..20 {
            collector.push(Report::error(format!("error {i}"), Span::UNKNOWN));
        }
        assert_eq!(collector.error_count(), MAX_COLLECTED_ERRORS);
        assert_eq!(collector.reports().len(), MAX_COLLECTED_ERRORS);
    }

    #[test]
    fn warnings_do_not_count_against_the_error_cap() {
        let mut collector = ErrorCollector::new();
        for _ in 0..MAX_COLLECTED_ERRORS {
            collector.push(Report::error("e", Span::UNKNOWN));
        }
        collector.push(Report::warning("w", Span::UNKNOWN));
        assert_eq!(collector.reports().len(), MAX_COLLECTED_ERRORS + 1);
    }

    #[test]
    fn no_errors_means_has_errors_is_false() {
        let mut collector = ErrorCollector::new();
        collector.push(Report::warning("heads up", Span::UNKNOWN));
        assert!(!collector.has_errors());
    }
}
