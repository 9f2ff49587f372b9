//! Fatal compiler diagnostics.
//!
//! Every error in the pipeline is fatal: it is reported against the
//! original source line and compilation stops. Passes build
//! [`CompileError`] values through an [`ErrorContext`] and bubble them to
//! `main` with `?`; no error is locally recovered and no partial output
//! is kept.

use std::cell::Cell;
use std::fmt;

/// A fatal diagnostic, carrying the file and source line it was raised
/// against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub file: String,
    /// Zero-based source line, when one was known at the raise site.
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Lines are tracked zero-based and displayed one-based.
        match self.line {
            Some(line) => write!(
                f,
                "Compiler Error! {}:{} {}",
                self.file,
                line + 1,
                self.message
            ),
            None => write!(f, "Compiler Error! {}: {}", self.file, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<CompileError> for String {
    fn from(e: CompileError) -> Self {
        e.to_string()
    }
}

/// Tracks the file and the line the compiler is currently working on.
///
/// Each pass sets the line before descending into a token or tree node,
/// so checks deep inside the pass do not have to thread position
/// information through every call.
#[derive(Debug)]
pub struct ErrorContext {
    file: String,
    line: Cell<Option<usize>>,
}

impl ErrorContext {
    pub fn new(file: impl Into<String>) -> Self {
        ErrorContext {
            file: file.into(),
            line: Cell::new(None),
        }
    }

    /// Set the zero-based line subsequent errors are reported against.
    pub fn set_line(&self, line: usize) {
        self.line.set(Some(line));
    }

    pub fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError {
            file: self.file.clone(),
            line: self.line.get(),
            message: message.into(),
        }
    }

    /// Fail with `message` when `cond` holds.
    pub fn on_true(&self, cond: bool, message: impl Into<String>) -> Result<(), CompileError> {
        if cond {
            Err(self.error(message))
        } else {
            Ok(())
        }
    }

    /// Fail with `message` unless `cond` holds.
    pub fn on_false(&self, cond: bool, message: impl Into<String>) -> Result<(), CompileError> {
        self.on_true(!cond, message)
    }
}
