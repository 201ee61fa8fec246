//! Unified error type for the planning pipeline.
//!
//! Every failure the planner can surface maps to one stable wire code so
//! that embedding services can translate errors without string matching.
//! Internal errors indicate a broken invariant; they are logged by the
//! caller and never treated as process-fatal.

use serde::Serialize;

/// Result type used across the planner.
pub type PlanResult<T> = Result<T, PlanError>;

/// Stable error codes exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ManifestInvalid,
    UnknownObject,
    AmbiguousIdentifier,
    Cycle,
    Parse,
    InputTooLarge,
    UnsupportedDialect,
    Internal,
}

/// Errors produced while analyzing a manifest or planning a statement.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// The manifest violates a construction-time invariant.
    #[error("manifest invalid: {message}")]
    ManifestInvalid {
        message: String,
        /// Location of the offending definition, if known.
        path: Option<String>,
    },

    /// A reference names an object the manifest does not declare.
    #[error("unknown object: '{0}'")]
    UnknownObject(String),

    /// An identifier resolves to columns of more than one relation in scope.
    #[error("ambiguous identifier '{identifier}' - exists on: {candidates}")]
    AmbiguousIdentifier {
        identifier: String,
        candidates: String,
    },

    /// A calculated-field traversal closed a dependency cycle.
    #[error("found cycle in {0}")]
    Cycle(String),

    /// Input SQL or a manifest expression failed to parse.
    #[error("parse error: {0}")]
    Parse(String),

    /// Input exceeded a configured size bound.
    #[error("input too large: {0}")]
    InputTooLarge(String),

    /// The requested dialect is not supported by this build.
    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),

    /// Invariant violation inside the planner. Should never occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlanError {
    pub fn manifest_invalid(message: impl Into<String>) -> Self {
        PlanError::ManifestInvalid {
            message: message.into(),
            path: None,
        }
    }

    pub fn manifest_invalid_at(message: impl Into<String>, path: impl Into<String>) -> Self {
        PlanError::ManifestInvalid {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn ambiguous(identifier: impl Into<String>, candidates: &[String]) -> Self {
        PlanError::AmbiguousIdentifier {
            identifier: identifier.into(),
            candidates: candidates.join(", "),
        }
    }

    /// The stable wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PlanError::ManifestInvalid { .. } => ErrorCode::ManifestInvalid,
            PlanError::UnknownObject(_) => ErrorCode::UnknownObject,
            PlanError::AmbiguousIdentifier { .. } => ErrorCode::AmbiguousIdentifier,
            PlanError::Cycle(_) => ErrorCode::Cycle,
            PlanError::Parse(_) => ErrorCode::Parse,
            PlanError::InputTooLarge(_) => ErrorCode::InputTooLarge,
            PlanError::UnsupportedDialect(_) => ErrorCode::UnsupportedDialect,
            PlanError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Wire representation: `{code, message, path?}`.
    pub fn to_wire(&self) -> WireError {
        let path = match self {
            PlanError::ManifestInvalid { path, .. } => path.clone(),
            _ => None,
        };
        WireError {
            code: self.code(),
            message: self.to_string(),
            path,
        }
    }
}

/// JSON shape of an error as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Longest slice of input SQL allowed to appear in an error message.
const EXCERPT_LEN: usize = 120;

/// Bounded excerpt of input text for error messages. Never leaks more than
/// [`EXCERPT_LEN`] characters of the original statement.
pub fn excerpt(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.chars().count() <= EXCERPT_LEN {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(EXCERPT_LEN).collect();
    format!("{}...", cut)
}
