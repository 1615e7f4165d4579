// ── Core error types ──
//
// Every engine failure names the field path it happened at. Transport
// errors from rekon-api are wrapped rather than flattened so callers can
// still ask `is_not_found()` / `is_transient()` on them.

use std::path::PathBuf;

use thiserror::Error;

use crate::path::FieldPath;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Value errors ─────────────────────────────────────────────────
    #[error("Cannot coerce {path}: expected {expected}, found {found}")]
    Coercion {
        path: FieldPath,
        expected: String,
        found: String,
    },

    #[error("Cannot expand {path}: {reason}")]
    Expand { path: FieldPath, reason: String },

    #[error("Unknown field: {path}")]
    UnknownField { path: FieldPath },

    #[error("Invalid API version '{raw}': {reason}")]
    InvalidVersion { raw: String, reason: String },

    #[error("Invalid field path '{raw}': {reason}")]
    InvalidPath { raw: String, reason: String },

    // ── Schema errors ────────────────────────────────────────────────
    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Unknown resource: {name}")]
    UnknownResource { name: String },

    #[error("Cannot determine the identifier of the created {resource} object")]
    MissingId { resource: String },

    // ── I/O and transport ────────────────────────────────────────────
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] rekon_api::Error),
}

impl CoreError {
    pub(crate) fn coercion(
        path: &FieldPath,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::Coercion {
            path: path.clone(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// The device reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_not_found())
    }

    /// Field path the error refers to, if any.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            Self::Coercion { path, .. } | Self::Expand { path, .. } | Self::UnknownField { path } => {
                Some(path)
            }
            _ => None,
        }
    }
}
