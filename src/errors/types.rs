//! Error type definitions for the plugin database
//!
//! Hierarchical error types: each subsystem owns an enum and `AppError`
//! wraps them all through `#[from]` conversions.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Record store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Content cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Tag synchronization errors
    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    /// Host registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Mutation dispatcher errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Record store specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failures while reading or writing record files
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Record (de)serialization failures
    #[error("Serialization failed for {path:?}: {source}")]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Update of a record that is not present
    #[error("Record not found: {id}")]
    NotFound { id: Uuid },

    /// Add of a record whose id is already present
    #[error("Record already exists: {id}")]
    AlreadyExists { id: Uuid },

    /// The mutation could not be dispatched
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Content cache specific errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// URL could not be parsed or is not HTTP(S)
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Remote answered with a non-success status other than 404
    #[error("HTTP error: {status} for {url}")]
    Http { status: u16, url: String },

    /// Network level failure
    #[error("Transport error for {url}: {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },

    /// Remote answered with an empty body
    #[error("Empty download for {url}")]
    EmptyFile { url: String },

    /// Disk write/delete failure
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Decode, resize or encode failure
    #[error("Image error for {path:?}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    /// Blocking resize task was cancelled or panicked
    #[error("Resize task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Tag synchronization specific errors
#[derive(Error, Debug)]
pub enum TagError {
    /// Host tag registry failure
    #[error("Tag registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Tag was created but could not be found afterwards
    #[error("Tag '{name}' missing after creation")]
    MissingAfterCreate { name: String },

    /// The entity update could not be dispatched
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Host registry specific errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Entity not present in the registry
    #[error("Entity not found: {id}")]
    EntityNotFound { id: Uuid },

    /// Catalog file could not be read or written
    #[error("Catalog I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Catalog file is malformed
    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Mutation dispatcher errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher thread has shut down
    #[error("mutation dispatcher is closed")]
    Closed,

    /// The dispatcher thread could not be started
    #[error("failed to start mutation dispatcher: {message}")]
    Spawn { message: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl CacheError {
    pub(crate) fn invalid_url<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the failure is the remote reporting the resource as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }
}
