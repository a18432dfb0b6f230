//! In-memory host registries, optionally backed by a JSON catalog file
//!
//! Used by the CLI (catalog file on disk) and by tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{RegistryError, RegistryResult};
use crate::models::{EntityEvent, EntityUpdate, ExternalEntity, Tag};

use super::registry::{EntityRegistry, TagRegistry};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// On-disk shape of a host catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub entities: Vec<ExternalEntity>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Root that relative icon paths resolve against
    #[serde(default)]
    pub files_root: Option<PathBuf>,
}

/// Entity and tag registry held in memory
pub struct InMemoryHost {
    entities: RwLock<HashMap<Uuid, ExternalEntity>>,
    tags: RwLock<Vec<Tag>>,
    files_root: Option<PathBuf>,
    events: broadcast::Sender<EntityEvent>,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::from_catalog(Catalog::default())
    }

    pub fn with_entities(entities: impl IntoIterator<Item = ExternalEntity>) -> Self {
        Self::from_catalog(Catalog {
            entities: entities.into_iter().collect(),
            ..Catalog::default()
        })
    }

    pub fn from_catalog(catalog: Catalog) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entities: RwLock::new(catalog.entities.into_iter().map(|e| (e.id, e)).collect()),
            tags: RwLock::new(catalog.tags),
            files_root: catalog.files_root,
            events,
        }
    }

    /// Load a catalog file; a missing file yields an empty host
    pub fn load_catalog(path: &Path) -> RegistryResult<Self> {
        if !path.exists() {
            debug!("Catalog {} not found, starting empty", path.display());
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog: Catalog = serde_json::from_str(&raw)?;
        debug!(
            "Loaded catalog {}: {} entities, {} tags",
            path.display(),
            catalog.entities.len(),
            catalog.tags.len()
        );
        Ok(Self::from_catalog(catalog))
    }

    pub fn to_catalog(&self) -> Catalog {
        let mut entities = self.all();
        entities.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Catalog {
            entities,
            tags: self.tags(),
            files_root: self.files_root.clone(),
        }
    }

    pub fn save_catalog(&self, path: &Path) -> RegistryResult<()> {
        let raw = serde_json::to_string_pretty(&self.to_catalog())?;
        std::fs::write(path, raw).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn publish(&self, event: EntityEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

impl EntityRegistry for InMemoryHost {
    fn get(&self, id: Uuid) -> Option<ExternalEntity> {
        self.entities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    fn all(&self) -> Vec<ExternalEntity> {
        self.entities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    fn add(&self, entity: ExternalEntity) -> RegistryResult<()> {
        self.entities
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entity.id, entity.clone());
        self.publish(EntityEvent::Added(vec![entity]));
        Ok(())
    }

    fn update(&self, entity: ExternalEntity) -> RegistryResult<()> {
        let old = {
            let mut entities = self.entities.write().unwrap_or_else(|e| e.into_inner());
            match entities.get_mut(&entity.id) {
                Some(slot) => std::mem::replace(slot, entity.clone()),
                None => return Err(RegistryError::EntityNotFound { id: entity.id }),
            }
        };
        self.publish(EntityEvent::Updated(vec![EntityUpdate { old, new: entity }]));
        Ok(())
    }

    fn remove(&self, id: Uuid) -> RegistryResult<Option<ExternalEntity>> {
        let removed = self
            .entities
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        if let Some(entity) = &removed {
            self.publish(EntityEvent::Removed(vec![entity.clone()]));
        } else {
            warn!("Remove requested for unknown entity {}", id);
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<EntityEvent> {
        self.events.subscribe()
    }

    fn full_file_path(&self, relative: &str) -> PathBuf {
        let path = PathBuf::from(relative);
        match &self.files_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

impl TagRegistry for InMemoryHost {
    fn tags(&self) -> Vec<Tag> {
        self.tags.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn add_tag(&self, name: &str) -> RegistryResult<Tag> {
        let tag = Tag::new(name);
        self.tags
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(tag.clone());
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mutations_publish_events() {
        let host = InMemoryHost::new();
        let mut rx = host.subscribe();
        let entity = ExternalEntity::new(Uuid::new_v4(), "Hades");

        host.add(entity.clone()).unwrap();
        let mut renamed = entity.clone();
        renamed.name = "Hades II".to_string();
        host.update(renamed.clone()).unwrap();
        host.remove(entity.id).unwrap();

        assert_eq!(rx.recv().await.unwrap(), EntityEvent::Added(vec![entity.clone()]));
        assert_eq!(
            rx.recv().await.unwrap(),
            EntityEvent::Updated(vec![EntityUpdate {
                old: entity,
                new: renamed.clone()
            }])
        );
        assert_eq!(rx.recv().await.unwrap(), EntityEvent::Removed(vec![renamed]));
    }

    #[test]
    fn test_update_unknown_entity_fails() {
        let host = InMemoryHost::new();
        let result = host.update(ExternalEntity::new(Uuid::new_v4(), "ghost"));
        assert!(matches!(result, Err(RegistryError::EntityNotFound { .. })));
    }

    #[test]
    fn test_catalog_round_trip_and_icon_resolution() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");

        let mut entity = ExternalEntity::new(Uuid::new_v4(), "Celeste");
        entity.icon = Some("icons/celeste.png".to_string());
        let host = InMemoryHost::from_catalog(Catalog {
            entities: vec![entity.clone()],
            tags: vec![Tag::new("[HLTB] Playtime")],
            files_root: Some(dir.path().to_path_buf()),
        });
        host.save_catalog(&path).unwrap();

        let loaded = InMemoryHost::load_catalog(&path).unwrap();
        assert_eq!(loaded.get(entity.id), Some(entity));
        assert_eq!(loaded.tags().len(), 1);
        assert_eq!(
            loaded.full_file_path("icons/celeste.png"),
            dir.path().join("icons/celeste.png")
        );
    }

    #[test]
    fn test_missing_catalog_is_empty() {
        let dir = TempDir::new().unwrap();
        let host = InMemoryHost::load_catalog(&dir.path().join("nope.json")).unwrap();
        assert!(host.all().is_empty());
    }
}
