//! Unified error type and stable error classes.
//!
//! Each subsystem has its own error enum (`ResolveError`, `PathError`,
//! `HierarchyError`, `GrammarError`, `ActionError`, `StepError`). This module
//! bridges them into [`StoryError`], whose [`ErrorClass`] gives every error a
//! stable integer code for reports.
//!
//! ## Error Classes
//!
//! - `2`: Configuration (malformed paths, duplicate nodes, bad settings)
//! - `3`: Unparseable value (cell text that does not convert)
//! - `4`: Unsupported type (no rule or finder can produce the type)
//! - `5`: Application action (the bound action failed or was cancelled)
//! - `10`: Internal

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grammar::{ActionError, GrammarError};
use crate::hierarchy::HierarchyError;
use crate::path::PathError;
use crate::resolver::ResolveError;
use crate::step::StepError;

// ============================================================================
// Error Classes
// ============================================================================

/// Stable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ErrorClass {
    Configuration = 2,
    UnparseableValue = 3,
    UnsupportedType = 4,
    ApplicationAction = 5,
    Internal = 10,
}

impl ErrorClass {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoryError {
    /// Invalid structure or settings.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Cell text that cannot be converted.
    #[error("{message}")]
    UnparseableValue {
        cell: Option<String>,
        message: String,
    },

    /// A type that cannot be produced from text.
    #[error("type {type_name} cannot be parsed from text")]
    UnsupportedType {
        cell: Option<String>,
        type_name: String,
    },

    /// The bound action failed.
    #[error("action error: {message}")]
    ApplicationAction { message: String },

    /// Bug or unexpected state.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl StoryError {
    pub fn configuration(message: impl Into<String>) -> Self {
        StoryError::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StoryError::Internal {
            message: message.into(),
        }
    }

    /// The cell an error is attributed to, if any.
    pub fn cell(&self) -> Option<&str> {
        match self {
            StoryError::UnparseableValue { cell, .. } | StoryError::UnsupportedType { cell, .. } => {
                cell.as_deref()
            }
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        ErrorClass::from(self)
    }
}

impl From<&StoryError> for ErrorClass {
    fn from(err: &StoryError) -> Self {
        match err {
            StoryError::Configuration { .. } => ErrorClass::Configuration,
            StoryError::UnparseableValue { .. } => ErrorClass::UnparseableValue,
            StoryError::UnsupportedType { .. } => ErrorClass::UnsupportedType,
            StoryError::ApplicationAction { .. } => ErrorClass::ApplicationAction,
            StoryError::Internal { .. } => ErrorClass::Internal,
        }
    }
}

// ============================================================================
// Bridges
// ============================================================================

fn from_resolve(cell: Option<String>, err: ResolveError) -> StoryError {
    match err {
        ResolveError::UnsupportedType { type_name } => StoryError::UnsupportedType { cell, type_name },
        other => StoryError::UnparseableValue {
            cell,
            message: other.to_string(),
        },
    }
}

impl From<ResolveError> for StoryError {
    fn from(err: ResolveError) -> Self {
        from_resolve(None, err)
    }
}

impl From<PathError> for StoryError {
    fn from(err: PathError) -> Self {
        StoryError::configuration(err.to_string())
    }
}

impl From<HierarchyError> for StoryError {
    fn from(err: HierarchyError) -> Self {
        StoryError::configuration(err.to_string())
    }
}

impl From<GrammarError> for StoryError {
    fn from(err: GrammarError) -> Self {
        let type_name = match &err {
            GrammarError::UnsupportedParameter { type_name, .. }
            | GrammarError::UnsupportedOutput { type_name, .. } => type_name.clone(),
        };
        let cell = match err {
            GrammarError::UnsupportedParameter { parameter, .. } => parameter,
            GrammarError::UnsupportedOutput { cell, .. } => cell,
        };
        StoryError::UnsupportedType {
            cell: Some(cell),
            type_name,
        }
    }
}

impl From<ActionError> for StoryError {
    fn from(err: ActionError) -> Self {
        StoryError::ApplicationAction {
            message: err.to_string(),
        }
    }
}

impl From<StepError> for StoryError {
    fn from(err: StepError) -> Self {
        match err {
            StepError::Resolve { cell, source } => from_resolve(Some(cell), source),
            StepError::MissingCell { cell } => StoryError::UnparseableValue {
                message: format!("cell '{}' is missing", cell),
                cell: Some(cell),
            },
            StepError::UnknownGrammar { key } => {
                StoryError::configuration(format!("unknown grammar '{}'", key))
            }
            StepError::Output { cell, source } => StoryError::ApplicationAction {
                message: format!("action result for output '{}' does not fit: {}", cell, source),
            },
            StepError::Action(err) => StoryError::from(err),
            StepError::Cancelled => StoryError::ApplicationAction {
                message: "cancelled before execution".to_string(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
