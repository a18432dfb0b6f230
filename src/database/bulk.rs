//! Bulk workflows
//!
//! Each loop checks its progress handle for cancellation once per item,
//! logs and skips per-item failures, and ends by logging a [`BulkSummary`].
//! Nothing already applied is rolled back on cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{PluginDatabase, RecordProvider};
use crate::errors::{AppError, StoreError, TagResult};
use crate::host::{BulkSummary, Notification, ProgressHandle};
use crate::models::{ExternalEntity, PluginRecord, Tag};

impl<P: RecordProvider> PluginDatabase<P> {
    fn begin(&self, action: &str, cancelable: bool) -> Arc<ProgressHandle> {
        self.host
            .progress
            .begin(&format!("{} - {}", self.settings.name, action), cancelable)
    }

    /// Refresh several records under a new cancelable operation
    pub async fn refresh_many(&self, ids: &[Uuid]) -> BulkSummary {
        let handle = self.begin("Refreshing", true);
        self.refresh_many_with(ids, &handle).await
    }

    /// Refresh several records, reporting to `handle`
    pub async fn refresh_many_with(&self, ids: &[Uuid], handle: &ProgressHandle) -> BulkSummary {
        handle.set_max(ids.len() as u64);
        self.store.begin_batch();

        let mut cancelled = false;
        for id in ids {
            if handle.is_cancelled() {
                cancelled = true;
                break;
            }
            self.refresh(*id).await;
            handle.advance();
        }

        self.store.end_batch();
        let summary = handle.summary("Refresh", cancelled);
        summary.log();
        summary
    }

    /// Refresh entities that have no data yet
    pub async fn refresh_missing(&self, ids: &[Uuid]) -> BulkSummary {
        self.refresh_many(ids).await
    }

    /// Force a remote fetch for each id, optionally only for those whose
    /// record has no data
    pub async fn fetch_selected(&self, ids: &[Uuid], only_missing: bool) -> BulkSummary {
        let handle = self.begin("Getting data", true);
        self.fetch_selected_with(ids, only_missing, &handle).await
    }

    pub async fn fetch_selected_with(
        &self,
        ids: &[Uuid],
        only_missing: bool,
        handle: &ProgressHandle,
    ) -> BulkSummary {
        let selected: Vec<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| !only_missing || !self.store.get(*id).is_some_and(|r| r.has_data()))
            .collect();
        handle.set_max(selected.len() as u64);

        let mut cancelled = false;
        for id in selected {
            if handle.is_cancelled() {
                cancelled = true;
                break;
            }
            if !self.settings.item_delay.is_zero() {
                tokio::time::sleep(self.settings.item_delay).await;
            }
            if self.get(id, false, true).await.is_none() {
                warn!("No record produced for {}", id);
            }
            handle.advance();
        }

        let summary = handle.summary("GetSelectData", cancelled);
        summary.log();
        summary
    }

    /// Remove the record of every known external entity.
    ///
    /// Per-record failures are logged and skipped; false only when the
    /// mutation thread is gone and the loop had to stop.
    pub async fn clear_all(&self) -> bool {
        let handle = self.begin("Clearing data", false);
        let entities = self.known_entities();
        handle.set_max(entities.len() as u64);
        self.store.begin_batch();

        let mut completed = true;
        for entity in entities {
            match self.try_remove(entity.id).await {
                Ok(_) => {}
                Err(AppError::Dispatch(e)) | Err(AppError::Store(StoreError::Dispatch(e))) => {
                    error!("Clearing {} stopped: {}", self.settings.name, e);
                    completed = false;
                    break;
                }
                Err(e) => warn!("Failed to remove data of {}: {}", entity.name, e),
            }
            handle.advance();
        }

        self.store.end_batch();
        handle.summary("ClearDatabase", false).log();
        completed
    }

    /// Retag one entity from its cached record
    pub async fn add_tag(&self, id: Uuid) -> TagResult<bool> {
        let label = self
            .store
            .get(id)
            .and_then(|record| self.data_label(&record));
        self.tags.retag(id, label.as_deref()).await
    }

    /// Strip plugin tags from one entity
    pub async fn remove_tag(&self, id: Uuid) -> TagResult<bool> {
        self.tags.untag(id).await
    }

    /// Retag every visible external entity
    pub async fn add_tag_all(&self) -> BulkSummary {
        let handle = self.begin("Adding tags", true);
        let entities = self
            .host
            .entities
            .all()
            .into_iter()
            .filter(|e| !e.hidden)
            .collect();
        self.retag_entities(entities, &handle).await
    }

    /// Retag a selection, attaching the "no data" tag to entities without
    /// data when `tag_missing` is set. The policy is restored afterwards.
    pub async fn add_tag_selected(&self, ids: &[Uuid], tag_missing: bool) -> BulkSummary {
        let handle = self.begin("Adding tags", true);
        let entities = ids
            .iter()
            .filter_map(|id| self.host.entities.get(*id))
            .collect();

        let previous = self.tags.tag_missing();
        self.tags.set_tag_missing(tag_missing);
        let summary = self.retag_entities(entities, &handle).await;
        self.tags.set_tag_missing(previous);
        summary
    }

    async fn retag_entities(
        &self,
        entities: Vec<ExternalEntity>,
        handle: &ProgressHandle,
    ) -> BulkSummary {
        let labels: HashMap<Uuid, Option<String>> = entities
            .iter()
            .map(|e| {
                let label = self.store.get(e.id).and_then(|r| self.data_label(&r));
                (e.id, label)
            })
            .collect();
        self.tags
            .bulk_retag(
                entities,
                |entity| labels.get(&entity.id).cloned().flatten(),
                self.settings.item_delay,
                handle,
            )
            .await
    }

    /// Strip plugin tags from every visible external entity
    pub async fn remove_tag_all(&self) -> BulkSummary {
        let handle = self.begin("Removing tags", true);
        let entities = self
            .host
            .entities
            .all()
            .into_iter()
            .filter(|e| !e.hidden)
            .collect();
        self.tags.bulk_untag(entities, &handle).await
    }

    /// Id of the reserved "no data" tag, created if absent
    pub async fn no_data_tag(&self) -> TagResult<Uuid> {
        self.tags.no_data_tag().await
    }

    pub fn refresh_tag_cache(&self) {
        self.tags.refresh_cache();
    }

    pub fn plugin_tags(&self) -> Vec<Tag> {
        self.tags.plugin_tags().as_ref().clone()
    }

    /// Delete every cached remote file of the plugin after the configured
    /// grace period
    pub async fn clear_cache(&self) -> bool {
        let handle = self.begin("Clearing cache", false);
        if !self.settings.clear_cache_delay.is_zero() {
            tokio::time::sleep(self.settings.clear_cache_delay).await;
        }

        let result = self.cache.clear().await;
        handle.advance();
        match result {
            Ok(removed) => {
                info!("Cleared {} cached files for {}", removed, self.settings.name);
                true
            }
            Err(e) => {
                error!("Failed to clear cache {}: {}", self.cache.dir().display(), e);
                self.host.notifier.notify(Notification::error(
                    format!("{}-Error-ClearCache", self.settings.name),
                    format!(
                        "{}\nError while deleting cache {}",
                        self.settings.name,
                        self.cache.dir().display()
                    ),
                ));
                false
            }
        }
    }
}
