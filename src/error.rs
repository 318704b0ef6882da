//! Error handling for msubuild
//!
//! Structural model errors are rejected locally and leave the model valid.
//! Per-song build problems are reported through the build report instead of
//! through this type, so a single failing song never aborts a batch.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::NodeId;

/// Result type alias for msubuild operations
pub type Result<T> = std::result::Result<T, MsuError>;

/// Main error type for msubuild operations
#[derive(Error, Debug)]
pub enum MsuError {
    // Model Errors
    #[error("Invalid node structure: {reason}")]
    InvalidStructure { reason: String },

    #[error("Cannot move node {node} into {target}: target is inside the moved subtree")]
    Cycle { node: NodeId, target: NodeId },

    #[error("Node not found: {node}")]
    NodeNotFound { node: NodeId },

    #[error("Song not found: {song_id}")]
    SongNotFound { song_id: String },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory creation failed: {path}: {source}")]
    DirectoryCreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Compiler Errors
    #[error("msupcm++ not found at {path}")]
    CompilerNotFound { path: PathBuf },

    #[error("msupcm++ failed: {reason}")]
    CompilerFailed { reason: String },

    #[error("Invalid PCM artifact {path}: {reason}")]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("Build cancelled")]
    Cancelled,

    // Serialization Errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MsuError {
    pub(crate) fn invalid_structure(reason: impl Into<String>) -> Self {
        MsuError::InvalidStructure {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MsuError::InvalidStructure { .. } => "INVALID_STRUCTURE",
            MsuError::Cycle { .. } => "CYCLE",
            MsuError::NodeNotFound { .. } => "NODE_NOT_FOUND",
            MsuError::SongNotFound { .. } => "SONG_NOT_FOUND",
            MsuError::FileNotFound { .. } => "FILE_NOT_FOUND",
            MsuError::FileReadError { .. } => "FILE_READ_ERROR",
            MsuError::FileWriteError { .. } => "FILE_WRITE_ERROR",
            MsuError::DirectoryCreateError { .. } => "DIRECTORY_CREATE_ERROR",
            MsuError::CompilerNotFound { .. } => "COMPILER_NOT_FOUND",
            MsuError::CompilerFailed { .. } => "COMPILER_FAILED",
            MsuError::InvalidArtifact { .. } => "INVALID_ARTIFACT",
            MsuError::Cancelled => "CANCELLED",
            MsuError::Json(_) => "JSON_ERROR",
            MsuError::Io(_) => "IO_ERROR",
        }
    }

    /// Returns true if this error indicates the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MsuError::FileWriteError { .. }
                | MsuError::DirectoryCreateError { .. }
                | MsuError::CompilerFailed { .. }
        )
    }

    /// Returns a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            MsuError::InvalidStructure { .. } => {
                Some("Clear the node's input file before adding sub-tracks or sub-channels.")
            }
            MsuError::Cycle { .. } => Some("Pick a destination outside the node being moved."),
            MsuError::FileNotFound { .. } => Some("Check the file path and try again."),
            MsuError::CompilerNotFound { .. } => {
                Some("Install msupcm++ or pass its location with --compiler.")
            }
            MsuError::InvalidArtifact { .. } => {
                Some("Check that the loop point is inside the trimmed track.")
            }
            _ => None,
        }
    }
}
