//! Validation error types
//!
//! Non-fatal diagnostics produced while decoding. A document with validation
//! errors but no fatal error was parsed and is still usable.

use std::fmt;

use crate::ast::NodeRef;

/// Kind of validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    TypeMismatch,
    MissingRequiredField,
    DuplicateKey,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationErrorKind::TypeMismatch => write!(f, "type mismatch"),
            ValidationErrorKind::MissingRequiredField => write!(f, "missing required field"),
            ValidationErrorKind::DuplicateKey => write!(f, "duplicate key"),
        }
    }
}

/// Severity of validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation error with its source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    /// 1-based; 0 when unknown
    pub line: usize,
    pub column: usize,
    /// Raised while decoding a nested record; such errors never affect the
    /// enclosing record's `valid_syntax`
    pub(crate) nested: bool,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
            column,
            nested: false,
        }
    }

    /// Error positioned at `node`
    pub fn at(kind: ValidationErrorKind, message: impl Into<String>, node: &NodeRef) -> Self {
        Self::new(kind, message, node.line(), node.column())
    }

    pub fn type_mismatch(message: impl Into<String>, node: &NodeRef) -> Self {
        Self::at(ValidationErrorKind::TypeMismatch, message, node)
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            ValidationErrorKind::DuplicateKey => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn is_type_mismatch(&self) -> bool {
        self.kind == ValidationErrorKind::TypeMismatch
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}: {}", self.line, self.column, self.kind, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Split diagnostics into (errors, warnings), keeping order
pub fn partition(errors: &[ValidationError]) -> (Vec<&ValidationError>, Vec<&ValidationError>) {
    errors.iter().partition(|e| e.severity() == Severity::Error)
}
