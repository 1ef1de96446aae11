//! Core error types for worldmodel-core.
//!
//! Scheduling conflicts are not errors: they travel back to the caller as
//! data on [`UpdateResult`](crate::world::UpdateResult). The types here cover
//! the exceptional paths only (unknown ids, empty undo stack, malformed
//! input) plus configuration and IO failures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for worldmodel-core.
#[derive(Error, Debug)]
pub enum WorldError {
    /// Operation referenced a task id that is not in the world.
    #[error("Task {0} not found")]
    NotFound(String),

    /// Undo requested with nothing on the stack.
    #[error("Nothing to undo")]
    EmptyUndoStack,

    /// Input rejected before validation (inverted ranges, duplicate ids, ...).
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorldError {
    /// The serializable kind for errors that can appear on an update result.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::NotFound(_) => Some(ErrorKind::NotFound),
            Self::EmptyUndoStack => Some(ErrorKind::EmptyUndoStack),
            Self::MalformedInput(_) => Some(ErrorKind::MalformedInput),
            _ => None,
        }
    }

    /// The payload carried by the error, without the kind's wording.
    pub fn detail(&self) -> String {
        match self {
            Self::NotFound(detail) | Self::MalformedInput(detail) => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Rebuild an error from a kind and message reported on an update result.
    pub fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::EmptyUndoStack => Self::EmptyUndoStack,
            ErrorKind::MalformedInput => Self::MalformedInput(message),
        }
    }
}

/// Distinguishable failure kinds reported through `UpdateResult::error_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    EmptyUndoStack,
    MalformedInput,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Could not determine where configuration lives
    #[error("Could not resolve configuration directory: {0}")]
    DataDir(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for WorldError
pub type Result<T, E = WorldError> = std::result::Result<T, E>;
