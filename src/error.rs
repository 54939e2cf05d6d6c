//! Error types for hotclaw
//!
//! This module defines all error types used throughout the hotclaw runtime.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Nothing in this crate treats an error as fatal to the host process:
//! failures degrade to "this one plugin/command/component is non-functional"
//! and are logged at the point where they are swallowed.

use thiserror::Error;

/// The primary error type for hotclaw operations.
#[derive(Error, Debug)]
pub enum HotclawError {
    /// File watcher errors (init failures, watch registration issues, etc.)
    #[error("Watch error: {0}")]
    Watch(String),

    /// Module/plugin load errors (no loader for path, entry init failed, etc.)
    #[error("Load error: {0}")]
    Load(String),

    /// Configuration document errors (invalid store root, malformed JSON, etc.)
    #[error("Config error: {0}")]
    Config(String),

    /// Command/component registration errors (remote write failed, bad target)
    #[error("Registration error: {0}")]
    Registration(String),

    /// Scoped resource errors (no connector configured, open failed, etc.)
    #[error("Resource error: {0}")]
    Resource(String),

    /// Gateway collaborator errors (fetch/create/update/publish failures)
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Invalid command or component definitions caught before registration
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for hotclaw operations.
pub type Result<T> = std::result::Result<T, HotclawError>;
