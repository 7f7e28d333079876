use std::fmt;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Severity of a parser diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Reported but does not stop the parse.
    Warning,
    /// Makes the parse fail.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// What a diagnostic is about.
///
/// Only [`DiagnosticKind::MissingFile`] is treated specially: sources and
/// included files are fetched by a later pipeline stage, so their absence
/// is expected while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiagnosticKind {
    /// Anything the grammar or macro engine complains about.
    #[default]
    General,
    /// A referenced file does not exist on disk.
    MissingFile,
}

/// A message produced by the spec grammar.
///
/// The grammar never prints anything itself; it records diagnostics and
/// leaves it to [`resurface`] to decide what the caller sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// How serious the problem is.
    pub severity: Severity,
    /// What the diagnostic is about.
    pub kind: DiagnosticKind,
    /// 1-based line in the spec file, when the problem has one.
    pub line: Option<usize>,
    /// Human readable description.
    pub message: String,
}

impl Diagnostic {
    /// A warning at `line`.
    pub fn warning(line: Option<usize>, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            kind: DiagnosticKind::General,
            line,
            message: message.into(),
        }
    }

    /// An error at `line`.
    pub fn error(line: Option<usize>, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            kind: DiagnosticKind::General,
            line,
            message: message.into(),
        }
    }

    /// The diagnostic emitted when `file` does not exist on disk.
    pub fn missing_file(line: Option<usize>, file: &Path) -> Self {
        Diagnostic {
            kind: DiagnosticKind::MissingFile,
            ..Diagnostic::error(line, format!("{}: No such file or directory", file.display()))
        }
    }

    /// Whether this is the expected "file not fetched yet" noise.
    pub fn is_missing_file(&self) -> bool {
        self.kind == DiagnosticKind::MissingFile
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}: line {line}: {}", self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Apply the diagnostic policy for a parse of `path`.
///
/// Missing-file diagnostics are dropped. Every other warning is logged.
/// The first remaining error, if any, becomes an [`Error::Parse`] naming
/// `path` and the offending line.
pub fn resurface(path: &Path, diagnostics: &[Diagnostic]) -> Result<()> {
    let mut first_error = None;
    for diagnostic in diagnostics {
        if diagnostic.is_missing_file() {
            debug!(path = %path.display(), line = ?diagnostic.line, "{}", diagnostic.message);
            continue;
        }
        match diagnostic.severity {
            Severity::Warning => {
                warn!(path = %path.display(), line = ?diagnostic.line, "{}", diagnostic.message)
            }
            Severity::Error => {
                first_error.get_or_insert(diagnostic);
            }
        }
    }
    match first_error {
        Some(d) => Err(Error::parse(path, d.line, d.message.clone())),
        None => Ok(()),
    }
}
