//! Diagnostics and Error Reporting
//!
//! Validation and well-formedness problems are reported through an
//! [`ErrorHandler`] collaborator. The handler's return value is the only
//! recovery signal: warnings and errors continue unless the handler says
//! stop, fatal errors always halt the pipeline.

use std::fmt;
use std::sync::Arc;

use crate::error::XmlError;

/// Severity of a reported problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal error",
        })
    }
}

/// Position of the scanner when a problem was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// System identifier of the entity being scanned, if known.
    pub system_id: Option<Arc<str>>,
    /// 1-based line, 0 when unknown.
    pub line: u32,
    /// 1-based column, 0 when unknown.
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.system_id {
            Some(id) => write!(f, "{}:{}:{}", id, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// A reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, location: Location) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.location, self.message)
    }
}

/// External error-handling callback.
///
/// Invoked synchronously from inside the pipeline. Return `true` to keep
/// processing; the return value is ignored for fatal errors, which always
/// halt.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, diagnostic: &Diagnostic) -> bool;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Diagnostic) -> bool + Send + Sync,
{
    fn handle(&self, diagnostic: &Diagnostic) -> bool {
        self(diagnostic)
    }
}

/// Per-parse reporter: logs, records, and forwards diagnostics.
#[derive(Default)]
pub struct ErrorReporter {
    handler: Option<Arc<dyn ErrorHandler>>,
    diagnostics: Vec<Diagnostic>,
}

impl ErrorReporter {
    pub fn new(handler: Option<Arc<dyn ErrorHandler>>) -> Self {
        ErrorReporter {
            handler,
            diagnostics: Vec::new(),
        }
    }

    /// Report a problem. Returns `Err` when the pipeline must stop.
    pub fn report(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        location: &Location,
    ) -> Result<(), XmlError> {
        let diagnostic = Diagnostic::new(severity, message, location.clone());
        match severity {
            Severity::Warning => tracing::warn!(%diagnostic, "xml warning"),
            Severity::Error => tracing::warn!(%diagnostic, "xml error"),
            Severity::Fatal => tracing::error!(%diagnostic, "xml fatal error"),
        }

        let keep_going = self
            .handler
            .as_ref()
            .map(|h| h.handle(&diagnostic))
            .unwrap_or(true);
        self.diagnostics.push(diagnostic.clone());

        if severity == Severity::Fatal {
            Err(XmlError::Fatal(diagnostic))
        } else if keep_going {
            Ok(())
        } else {
            Err(XmlError::Aborted(diagnostic))
        }
    }

    pub fn warning(
        &mut self,
        message: impl Into<String>,
        location: &Location,
    ) -> Result<(), XmlError> {
        self.report(Severity::Warning, message, location)
    }

    pub fn error(
        &mut self,
        message: impl Into<String>,
        location: &Location,
    ) -> Result<(), XmlError> {
        self.report(Severity::Error, message, location)
    }

    /// Report a fatal error. Always returns `Err`.
    pub fn fatal(&mut self, message: impl Into<String>, location: &Location) -> XmlError {
        match self.report(Severity::Fatal, message, location) {
            Err(e) => e,
            Ok(()) => XmlError::structural("fatal diagnostic did not halt"),
        }
    }

    /// Everything reported so far, in order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_errors_continue_without_handler() {
        let mut reporter = ErrorReporter::new(None);
        assert!(reporter.warning("w", &Location::default()).is_ok());
        assert!(reporter.error("e", &Location::default()).is_ok());
        assert_eq!(reporter.diagnostics().len(), 2);
    }

    #[test]
    fn test_fatal_always_halts() {
        let handler: Arc<dyn ErrorHandler> = Arc::new(|_: &Diagnostic| true);
        let mut reporter = ErrorReporter::new(Some(handler));
        let err = reporter.fatal("bad", &Location::default());
        assert!(matches!(err, XmlError::Fatal(_)));
    }

    #[test]
    fn test_handler_can_abort_on_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handler: Arc<dyn ErrorHandler> = Arc::new(move |d: &Diagnostic| {
            seen.fetch_add(1, Ordering::SeqCst);
            d.severity == Severity::Warning
        });
        let mut reporter = ErrorReporter::new(Some(handler));
        assert!(reporter.warning("w", &Location::default()).is_ok());
        let result = reporter.error("e", &Location::default());
        assert!(matches!(result, Err(XmlError::Aborted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_location_display() {
        let loc = Location {
            system_id: Some(Arc::from("doc.xml")),
            line: 3,
            column: 7,
        };
        assert_eq!(loc.to_string(), "doc.xml:3:7");
    }
}
