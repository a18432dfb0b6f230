//! Centralized error handling for the plugin database
//!
//! This module provides the error hierarchy shared by every layer of the
//! crate so that failures surface with consistent messages whether they come
//! from the record store, the remote file cache or the host registries.
//!
//! # Error Categories
//!
//! - **Store Errors**: record persistence, serialization, missing records
//! - **Cache Errors**: URL validation, HTTP transport, disk writes, resizing
//! - **Tag Errors**: tag registry failures while synchronizing labels
//! - **Registry Errors**: host entity/tag registry failures
//! - **Dispatch Errors**: the mutation thread is gone
//!
//! # Usage
//!
//! ```rust
//! use plugin_db::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for record store Results
pub type StoreResult<T> = Result<T, StoreError>;

/// Convenience type alias for content cache Results
pub type CacheResult<T> = Result<T, CacheError>;

/// Convenience type alias for tag synchronization Results
pub type TagResult<T> = Result<T, TagError>;

/// Convenience type alias for host registry Results
pub type RegistryResult<T> = Result<T, RegistryError>;
