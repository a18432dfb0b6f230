//! Per-entity record model
//!
//! Every plugin stores one record per external entity. The shared identity
//! and lifecycle fields live in [`RecordBase`], which concrete record types
//! embed (usually with `#[serde(flatten)]`) and expose through
//! [`PluginRecord`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

use super::entity::ExternalEntity;

/// Identity and lifecycle fields common to every record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBase {
    /// Same id as the external entity the record belongs to
    pub id: Uuid,
    /// Copy of the external entity's name taken at creation time
    pub name: String,
    /// Whether the record went through add/update at least once
    #[serde(default)]
    pub is_saved: bool,
    /// Set when the external entity is gone but the record is still held
    #[serde(skip)]
    pub is_deleted: bool,
}

impl RecordBase {
    /// Fresh, unsaved base keyed to `entity`
    pub fn for_entity(entity: &ExternalEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name.clone(),
            is_saved: false,
            is_deleted: false,
        }
    }
}

/// Contract every stored record type satisfies.
///
/// `has_data` and `count` are the only payload-specific parts; the rest is
/// derived from [`RecordBase`].
pub trait PluginRecord:
    Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn base(&self) -> &RecordBase;

    fn base_mut(&mut self) -> &mut RecordBase;

    /// True iff the record carries meaningful payload
    fn has_data(&self) -> bool;

    /// Number of payload items, used by [`super::DataGame`]
    fn count(&self) -> usize {
        0
    }

    fn id(&self) -> Uuid {
        self.base().id
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn is_saved(&self) -> bool {
        self.base().is_saved
    }

    fn is_deleted(&self) -> bool {
        self.base().is_deleted
    }

    fn set_saved(&mut self, saved: bool) {
        self.base_mut().is_saved = saved;
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.base_mut().is_deleted = deleted;
    }

    /// Default, empty record keyed to `entity`
    fn for_entity(entity: &ExternalEntity) -> Self {
        let mut record = Self::default();
        *record.base_mut() = RecordBase::for_entity(entity);
        record
    }
}

/// Schemaless record: the payload is an arbitrary JSON document.
///
/// Used by the CLI and handy for plugins whose payload does not need a
/// dedicated type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonRecord {
    #[serde(flatten)]
    pub base: RecordBase,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PluginRecord for JsonRecord {
    fn base(&self) -> &RecordBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut RecordBase {
        &mut self.base
    }

    fn has_data(&self) -> bool {
        match &self.data {
            serde_json::Value::Null => false,
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::Object(fields) => !fields.is_empty(),
            serde_json::Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    fn count(&self) -> usize {
        match &self.data {
            serde_json::Value::Null => 0,
            serde_json::Value::Array(items) => items.len(),
            serde_json::Value::Object(fields) => fields.len(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity() -> ExternalEntity {
        ExternalEntity::new(Uuid::new_v4(), "Outer Wilds")
    }

    #[test]
    fn test_for_entity_is_empty_and_unsaved() {
        let e = entity();
        let record = JsonRecord::for_entity(&e);
        assert_eq!(record.id(), e.id);
        assert_eq!(record.name(), "Outer Wilds");
        assert!(!record.has_data());
        assert!(!record.is_saved());
        assert!(!record.is_deleted());
    }

    #[test]
    fn test_json_record_has_data() {
        let mut record = JsonRecord::for_entity(&entity());
        for (value, expected, count) in [
            (json!(null), false, 0),
            (json!([]), false, 0),
            (json!({}), false, 0),
            (json!(""), false, 1),
            (json!([1, 2, 3]), true, 3),
            (json!({"a": 1}), true, 1),
            (json!(42), true, 1),
        ] {
            record.data = value.clone();
            assert_eq!(record.has_data(), expected, "{value}");
            assert_eq!(record.count(), count, "{value}");
        }
    }

    #[test]
    fn test_deleted_flag_is_not_persisted() {
        let mut record = JsonRecord::for_entity(&entity());
        record.set_deleted(true);
        record.set_saved(true);

        let raw = serde_json::to_string(&record).unwrap();
        let back: JsonRecord = serde_json::from_str(&raw).unwrap();

        assert!(back.is_saved());
        assert!(!back.is_deleted());
    }
}
