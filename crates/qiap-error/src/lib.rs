//! Error type shared by every QIAP layer.
//!
//! All fallible operations in the workspace return [`Result`]. A single enum
//! keeps the error *kind* stable as it travels from the data model through
//! the rule engine to the caller:
//!
//! - context wrappers ([`QiapError::ActionPath`], [`QiapError::ExtentEvaluation`])
//!   keep the original error as `source` and report its kind, and
//! - [`QiapError::Discard`] is an expected outcome, not a failure: callers
//!   check [`QiapError::is_discard`] to tell "data intentionally withheld"
//!   apart from I/O or logic errors.

use serde::Serialize;
use std::fmt;

pub type Result<T> = std::result::Result<T, QiapError>;

// ============================================================================
// Kinds
// ============================================================================

/// Coarse classification of a [`QiapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidPath,
    Xml,
    CorrectionTypeMismatch,
    Discard,
    Expression,
    Data,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::InvalidPath => "invalid path",
            Self::Xml => "xml error",
            Self::CorrectionTypeMismatch => "correction type mismatch",
            Self::Discard => "data should be discarded",
            Self::Expression => "expression error",
            Self::Data => "data error",
            Self::Io => "i/o error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Discard outcome
// ============================================================================

/// What a discard rule withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiscardScope {
    /// The whole product was rejected at open time.
    Product,
    /// A single value (or a composite containing it) was withheld on read.
    Value,
}

/// The rule that fired a discard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discard {
    pub scope: DiscardScope,
    pub issue_id: i64,
    pub affected_product_id: i64,
    pub affected_value_id: Option<i64>,
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            DiscardScope::Product => write!(
                f,
                "product should be discarded (issue={}, product={})",
                self.issue_id, self.affected_product_id
            ),
            DiscardScope::Value => {
                write!(
                    f,
                    "item should be discarded (issue={}, product={}",
                    self.issue_id, self.affected_product_id
                )?;
                if let Some(value_id) = self.affected_value_id {
                    write!(f, ", value={value_id}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ============================================================================
// Error
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum QiapError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("xml error: {message} (line {line})")]
    Xml { line: u64, message: String },

    #[error("trying to apply corrective action of type {expression} to data of type {data}")]
    CorrectionTypeMismatch {
        expression: &'static str,
        data: &'static str,
    },

    #[error("{0}")]
    Discard(Discard),

    #[error("expression error: {0}")]
    Expression(String),

    #[error("{0}")]
    Data(String),

    #[error("{source} for action on '{parameter}' (value_id={value_id}, issue_id={issue_id})")]
    ActionPath {
        parameter: String,
        value_id: i64,
        issue_id: i64,
        #[source]
        source: Box<QiapError>,
    },

    #[error(
        "could not evaluate extent expression for QIAP issue={issue_id}, product={affected_product_id}{} ({source})",
        value_suffix(.affected_value_id)
    )]
    ExtentEvaluation {
        issue_id: i64,
        affected_product_id: i64,
        affected_value_id: Option<i64>,
        #[source]
        source: Box<QiapError>,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn value_suffix(value_id: &Option<i64>) -> String {
    match value_id {
        Some(id) => format!(", value={id}"),
        None => String::new(),
    }
}

impl QiapError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn xml(line: u64, message: impl Into<String>) -> Self {
        Self::Xml {
            line,
            message: message.into(),
        }
    }

    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Kind of the innermost cause; wrappers are transparent.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidPath { .. } => ErrorKind::InvalidPath,
            Self::Xml { .. } => ErrorKind::Xml,
            Self::CorrectionTypeMismatch { .. } => ErrorKind::CorrectionTypeMismatch,
            Self::Discard(_) => ErrorKind::Discard,
            Self::Expression(_) => ErrorKind::Expression,
            Self::Data(_) => ErrorKind::Data,
            Self::Io { .. } => ErrorKind::Io,
            Self::ActionPath { source, .. } | Self::ExtentEvaluation { source, .. } => source.kind(),
        }
    }

    pub fn is_discard(&self) -> bool {
        self.kind() == ErrorKind::Discard
    }

    /// The discard record, looking through context wrappers.
    pub fn discard(&self) -> Option<&Discard> {
        match self {
            Self::Discard(discard) => Some(discard),
            Self::ActionPath { source, .. } | Self::ExtentEvaluation { source, .. } => {
                source.discard()
            }
            _ => None,
        }
    }
}

impl From<Discard> for QiapError {
    fn from(discard: Discard) -> Self {
        Self::Discard(discard)
    }
}
