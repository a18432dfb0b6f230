//! Plugin-supplied record logic

use async_trait::async_trait;

use crate::errors::StoreResult;
use crate::models::{ExternalEntity, JsonRecord, PluginRecord};
use crate::store::RecordFiles;

/// What a concrete plugin plugs into [`super::PluginDatabase`].
///
/// Only [`RecordProvider::fetch_remote`] is required. Everything else has a
/// default that fits a plugin storing one JSON file per record and tagging
/// entities with the bare plugin prefix.
#[async_trait]
pub trait RecordProvider: Send + Sync + 'static {
    type Record: PluginRecord;

    /// Load every persisted record
    async fn load_all(&self, files: &RecordFiles<Self::Record>) -> StoreResult<Vec<Self::Record>> {
        files.load_all()
    }

    /// Empty record for an entity that has none yet
    fn default_for(&self, entity: &ExternalEntity) -> Self::Record {
        Self::Record::for_entity(entity)
    }

    /// Fetch fresh data for `entity` from the plugin's remote source.
    /// `Ok(None)` means the source has nothing for it.
    async fn fetch_remote(&self, entity: &ExternalEntity) -> anyhow::Result<Option<Self::Record>>;

    /// Label of the data tag for a record that has data; combined with the
    /// plugin prefix
    fn tag_label(&self, _record: &Self::Record) -> String {
        String::new()
    }

    /// Called after every single-record refresh with the record now held
    async fn after_refresh(&self, _record: &Self::Record) {}

    /// Recompute per-entity linkage data after the host added or changed
    /// the entity
    fn link_entity(&self, _entity: &ExternalEntity) {}

    /// Recompute presentation state for the entity in focus
    fn refresh_presentation(&self, _entity: &ExternalEntity, _record: Option<&Self::Record>) {}
}

/// Provider with no remote source: records only ever come from disk.
///
/// Used by the CLI to inspect and maintain an existing database.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheOnlyProvider;

#[async_trait]
impl RecordProvider for CacheOnlyProvider {
    type Record = JsonRecord;

    async fn fetch_remote(&self, _entity: &ExternalEntity) -> anyhow::Result<Option<JsonRecord>> {
        Ok(None)
    }
}
