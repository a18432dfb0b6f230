//! Host-side entities this crate reads and annotates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An item of the host's own catalog, e.g. a game in a game library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEntity {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
    /// Icon path, relative to the host's file store unless absolute
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

impl ExternalEntity {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            hidden: false,
            icon: None,
            tag_ids: Vec::new(),
        }
    }
}

/// A label attachable to external entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Old and new state of an updated entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityUpdate {
    pub old: ExternalEntity,
    pub new: ExternalEntity,
}

/// Lifecycle notifications published by the host entity registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityEvent {
    Added(Vec<ExternalEntity>),
    Updated(Vec<EntityUpdate>),
    Removed(Vec<ExternalEntity>),
}
