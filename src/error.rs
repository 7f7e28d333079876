use std::path::{Path, PathBuf};

/// Error type for spec parsing and derivation.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// A referenced file, source or patch does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed spec syntax.
    #[error("{}: {message}", location(path, *line))]
    Parse {
        /// Spec file the error was found in.
        path: PathBuf,
        /// 1-based line number, when known.
        line: Option<usize>,
        /// What went wrong.
        message: String,
    },

    /// The spec file name does not match the package declared inside it.
    #[error("spec file name '{}' does not match package name '{package}'", file.display())]
    SpecNameMismatch {
        /// Path of the spec file.
        file: PathBuf,
        /// Package name declared by the `Name:` tag.
        package: String,
    },

    /// Invalid dependency list (`Requires:`, `BuildRequires:`, `Provides:`).
    #[error("invalid dependency list: {0}")]
    InvalidDependency(String),

    /// Invalid `%if` expression.
    #[error("invalid conditional expression: {0}")]
    InvalidExpression(String),

    /// A macro layer was popped from an empty stack.
    #[error("macro stack underflow")]
    StackUnderflow,

    /// A `--define` argument was not of the form `KEY VALUE`.
    #[error("malformed macro passed to --define: {0:?}")]
    MalformedDefine(String),

    /// A link or pin file could not be understood.
    #[error("invalid link file {}: {message}", path.display())]
    InvalidLink {
        /// Path of the link or pin file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The configuration file could not be understood.
    #[error("invalid configuration {}: {message}", path.display())]
    InvalidConfig {
        /// Path of the configuration file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Any other I/O failure.
    #[error("{}: {message}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// The underlying I/O error, rendered.
        message: String,
    },
}

impl Error {
    /// Convert an I/O error on `path`, mapping `NotFound` onto [`Error::NotFound`].
    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path.display().to_string())
        } else {
            Error::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn parse(path: &Path, line: Option<usize>, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

fn location(path: &Path, line: Option<usize>) -> String {
    match line {
        Some(line) => format!("{}:{line}", path.display()),
        None => path.display().to_string(),
    }
}

/// Result type for planex operations.
pub type Result<T> = std::result::Result<T, Error>;
