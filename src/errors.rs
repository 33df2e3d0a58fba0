// src/errors.rs

//! Crate-wide error type.
//!
//! Script-level outcomes (non-zero exit, timeout, missing artifact) are not
//! errors; they travel inside [`crate::render::RenderResult`]. The variants
//! here are for environment and contract problems.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderkitError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {kind} id {id:?}: must be a single plain path component")]
    InvalidId { kind: &'static str, id: String },

    #[error("Session already active: {0}")]
    SessionActive(String),

    #[error("Stream handle already closed for session {0}")]
    StreamClosed(String),

    #[error("Media operation failed: {0}")]
    Media(String),

    #[error("Unknown speech provider: {0}")]
    UnknownProvider(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderkitError {
    /// Wrap an I/O failure on a specific path, keeping the `IoError` category.
    pub fn io_at(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        RenderkitError::IoError(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", path.display()),
        ))
    }

    /// True for the environment-fault category (disk, permissions, missing dirs).
    pub fn is_io(&self) -> bool {
        matches!(self, RenderkitError::IoError(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RenderkitError>;
