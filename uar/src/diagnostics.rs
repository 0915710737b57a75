//! Non-fatal reporting for per-entry failures.
//!
//! Structural failures (bad magic, truncated index, unsupported version) are
//! always returned as an [`crate::Error`]. Per-entry failures -- a file that
//! vanished between `readdir` and `lstat`, a name collision, an entry we
//! chose not to restore on extract -- are reported through a diagnostics
//! callback instead of aborting the whole operation.

use std::fmt;

/// Severity of a single diagnostic event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    /// Informational; no entry was skipped or altered.
    None,
    /// An entry was skipped, altered, or a path was rewritten.
    Warning,
}

/// A single non-fatal event raised while building, reading, or extracting
/// an archive.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Path the diagnostic concerns, if any.
    pub path: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::None,
            path: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Callback invoked for each [`Diagnostic`] raised during an operation.
///
/// The default implementation (see [`tracing_sink`]) logs through `tracing`
/// at `warn` or `info` depending on severity; callers that want to collect
/// diagnostics instead of just logging them can supply their own closure.
pub type DiagnosticCallback<'a> = Box<dyn FnMut(&Diagnostic) + 'a>;

/// Builds a [`DiagnosticCallback`] that logs every diagnostic via `tracing`.
pub fn tracing_sink<'a>() -> DiagnosticCallback<'a> {
    Box::new(|diagnostic: &Diagnostic| match diagnostic.severity {
        Severity::Warning => tracing::warn!("{diagnostic}"),
        Severity::None => tracing::info!("{diagnostic}"),
    })
}
