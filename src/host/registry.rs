//! Host registry trait definitions

use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::RegistryResult;
use crate::models::{EntityEvent, ExternalEntity, Tag};

/// The host's catalog of external entities.
///
/// Mutating calls are only issued from the mutation dispatcher thread.
pub trait EntityRegistry: Send + Sync {
    /// Find an entity by id
    fn get(&self, id: Uuid) -> Option<ExternalEntity>;

    /// Snapshot of every entity
    fn all(&self) -> Vec<ExternalEntity>;

    fn add(&self, entity: ExternalEntity) -> RegistryResult<()>;

    /// Replace an existing entity, publishing [`EntityEvent::Updated`]
    fn update(&self, entity: ExternalEntity) -> RegistryResult<()>;

    /// Remove an entity, returning it if it existed
    fn remove(&self, id: Uuid) -> RegistryResult<Option<ExternalEntity>>;

    /// Subscribe to lifecycle events. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<EntityEvent>;

    /// Resolve a host-relative file path (entity icons)
    fn full_file_path(&self, relative: &str) -> PathBuf {
        PathBuf::from(relative)
    }
}

/// The host's tag registry
pub trait TagRegistry: Send + Sync {
    /// Snapshot of every tag
    fn tags(&self) -> Vec<Tag>;

    /// Create a tag unconditionally
    fn add_tag(&self, name: &str) -> RegistryResult<Tag>;

    /// Return the tag named `name`, creating it if absent.
    ///
    /// Lookup-then-create: not atomic on its own, callers that need
    /// idempotency under concurrency must serialize around it.
    fn add_if_absent(&self, name: &str) -> RegistryResult<Tag> {
        match self.tags().into_iter().find(|t| t.name == name) {
            Some(tag) => Ok(tag),
            None => self.add_tag(name),
        }
    }
}
