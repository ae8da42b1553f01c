//! Fatal error types with fix suggestions
//!
//! Error code ranges:
//! - BIND-001-009: decode/populate/sync failures
//! - BIND-010-019: IO and text errors
//!
//! Non-fatal diagnostics live in `errors` (validation errors); anything here
//! aborts the whole operation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BindError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum BindError {
    #[error("[BIND-001] Structural error: {reason}")]
    Structural { reason: String },

    #[error("[BIND-002] Cannot convert {from} '{value}' to {to}")]
    Conversion {
        from: String,
        to: String,
        value: String,
    },

    #[error("[BIND-003] Malformed {tag} scalar '{value}' at line {line}, column {column}")]
    MalformedScalar {
        tag: String,
        value: String,
        line: usize,
        column: usize,
    },

    #[error("[BIND-004] Nesting depth {depth} exceeds the configured limit")]
    DepthExceeded { depth: usize },

    #[error("[BIND-005] Decode cancelled")]
    Cancelled,

    #[error("[BIND-010] YAML syntax error at line {line}, column {column}: {problem}")]
    Syntax {
        problem: String,
        line: usize,
        column: usize,
    },

    #[error("[BIND-011] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[BIND-012] YAML value error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BindError {
    pub(crate) fn structural(reason: impl Into<String>) -> Self {
        BindError::Structural {
            reason: reason.into(),
        }
    }

    pub(crate) fn conversion(from: &str, to: &str, value: impl ToString) -> Self {
        BindError::Conversion {
            from: from.to_string(),
            to: to.to_string(),
            value: value.to_string(),
        }
    }
}

impl FixSuggestion for BindError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BindError::Structural { .. } => {
                Some("Check the document root is a mapping and the target type is a record")
            }
            BindError::Conversion { .. } => {
                Some("Use a domain type whose range covers the wire value")
            }
            BindError::MalformedScalar { .. } => {
                Some("Remove the explicit tag or fix the value to match it")
            }
            BindError::DepthExceeded { .. } => {
                Some("Check for recursive aliases or raise DOCBIND_MAX_DEPTH")
            }
            BindError::Cancelled => None,
            BindError::Syntax { .. } => Some("Check YAML syntax: indentation and quoting"),
            BindError::Io(_) => Some("Check file path and permissions"),
            BindError::Yaml(_) => Some("Check the value has the shape the target type expects"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        let err = BindError::conversion("int", "u8", 300);
        assert_eq!(err.to_string(), "[BIND-002] Cannot convert int '300' to u8");

        let err = BindError::structural("document has no root node");
        assert!(err.to_string().starts_with("[BIND-001]"));
    }

    #[test]
    fn test_syntax_error_message() {
        let err = BindError::Syntax {
            problem: "did not find expected ',' or ']'".to_string(),
            line: 2,
            column: 1,
        };
        assert!(err.to_string().starts_with("[BIND-010] YAML syntax error at line 2, column 1"));
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn test_fix_suggestions() {
        assert!(BindError::DepthExceeded { depth: 9 }.fix_suggestion().is_some());
        assert!(BindError::Cancelled.fix_suggestion().is_none());
    }
}
