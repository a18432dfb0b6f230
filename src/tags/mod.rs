//! Plugin tag synchronization
//!
//! A plugin marks external entities with a tag reflecting whether its record
//! for that entity carries data. Tags are named `<prefix> <label>`; every tag
//! whose name starts with the prefix is considered owned by the plugin and is
//! stripped before a new one is attached, so an entity carries at most one
//! plugin tag after a retag.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dispatch::MutationDispatcher;
use crate::errors::{RegistryResult, TagError, TagResult};
use crate::host::{BulkSummary, EntityRegistry, Notification, Notifier, ProgressHandle, TagRegistry};
use crate::models::{ExternalEntity, Tag};

/// Keeps plugin tags on external entities consistent with record state
pub struct TagSynchronizer {
    plugin_name: String,
    prefix: String,
    no_data_label: String,
    tags: Arc<dyn TagRegistry>,
    entities: Arc<dyn EntityRegistry>,
    dispatcher: MutationDispatcher,
    notifier: Arc<dyn Notifier>,
    /// Rebuilt wholesale and swapped, readers never see a partial list
    cache: RwLock<Arc<Vec<Tag>>>,
    /// Completed names ensured by this instance, used when no prefix is set
    ensured: Mutex<HashSet<String>>,
    create_lock: tokio::sync::Mutex<()>,
    tag_missing: AtomicBool,
}

impl TagSynchronizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plugin_name: impl Into<String>,
        prefix: impl Into<String>,
        no_data_label: impl Into<String>,
        tag_missing: bool,
        tags: Arc<dyn TagRegistry>,
        entities: Arc<dyn EntityRegistry>,
        dispatcher: MutationDispatcher,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let sync = Self {
            plugin_name: plugin_name.into(),
            prefix: prefix.into().trim().to_string(),
            no_data_label: no_data_label.into(),
            tags,
            entities,
            dispatcher,
            notifier,
            cache: RwLock::new(Arc::new(Vec::new())),
            ensured: Mutex::new(HashSet::new()),
            create_lock: tokio::sync::Mutex::new(()),
            tag_missing: AtomicBool::new(tag_missing),
        };
        sync.refresh_cache();
        sync
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether entities without data get the "no data" tag
    pub fn tag_missing(&self) -> bool {
        self.tag_missing.load(Ordering::Relaxed)
    }

    pub fn set_tag_missing(&self, value: bool) {
        self.tag_missing.store(value, Ordering::Relaxed);
    }

    /// `<prefix> <label>`, the bare label without a prefix, the bare prefix
    /// without a label
    pub fn completed_name(&self, label: &str) -> String {
        match (self.prefix.is_empty(), label.is_empty()) {
            (true, _) => label.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{} {}", self.prefix, label),
        }
    }

    fn is_plugin_tag(&self, tag: &Tag, ensured: &HashSet<String>) -> bool {
        if self.prefix.is_empty() {
            ensured.contains(&tag.name)
        } else {
            tag.name.starts_with(&self.prefix)
        }
    }

    /// Rebuild the plugin tag list from the registry and publish it
    pub fn refresh_cache(&self) {
        let plugin_tags: Vec<Tag> = {
            let ensured = self.ensured.lock().unwrap_or_else(|e| e.into_inner());
            self.tags
                .tags()
                .into_iter()
                .filter(|t| self.is_plugin_tag(t, &ensured))
                .collect()
        };
        debug!("{} plugin tags cached for {}", plugin_tags.len(), self.plugin_name);
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(plugin_tags);
    }

    /// Snapshot of the tags owned by this plugin
    pub fn plugin_tags(&self) -> Arc<Vec<Tag>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn cached_id(&self, name: &str) -> Option<Uuid> {
        self.plugin_tags().iter().find(|t| t.name == name).map(|t| t.id)
    }

    /// Id of the tag for `label`, creating it in the registry if absent.
    ///
    /// Creation is serialized so concurrent callers never create the same
    /// name twice.
    pub async fn ensure_tag_exists(&self, label: &str) -> TagResult<Uuid> {
        let name = self.completed_name(label);
        self.ensured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.clone());

        if let Some(id) = self.cached_id(&name) {
            return Ok(id);
        }

        let _guard = self.create_lock.lock().await;
        self.refresh_cache();
        if let Some(id) = self.cached_id(&name) {
            return Ok(id);
        }

        let registry = self.tags.clone();
        let create_name = name.clone();
        let created = self
            .dispatcher
            .send(move || registry.add_if_absent(&create_name))
            .await??;
        debug!("Created tag '{}' ({})", created.name, created.id);

        self.refresh_cache();
        self.cached_id(&name)
            .ok_or(TagError::MissingAfterCreate { name })
    }

    /// Ensure the reserved "no data" tag exists
    pub async fn no_data_tag(&self) -> TagResult<Uuid> {
        let label = self.no_data_label.clone();
        self.ensure_tag_exists(&label).await
    }

    /// Tag id matching the record state: the data tag when `data_label` is
    /// `Some`, the "no data" tag under the missing policy, otherwise none
    async fn resolve_tag(&self, data_label: Option<&str>) -> TagResult<Option<Uuid>> {
        match data_label {
            Some(label) => self.ensure_tag_exists(label).await.map(Some),
            None if self.tag_missing() => self.no_data_tag().await.map(Some),
            None => Ok(None),
        }
    }

    fn owned_ids(&self) -> HashSet<Uuid> {
        if self.plugin_tags().is_empty() {
            self.refresh_cache();
        }
        self.plugin_tags().iter().map(|t| t.id).collect()
    }

    /// Attach the tag matching the record state. `data_label` is `Some` when
    /// the record has data. Appends without deduplicating; returns whether a
    /// tag was attached.
    pub async fn add_tag(
        &self,
        entity: &mut ExternalEntity,
        data_label: Option<&str>,
    ) -> TagResult<bool> {
        match self.resolve_tag(data_label).await? {
            Some(tag_id) => {
                entity.tag_ids.push(tag_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Strip every plugin tag from the entity; returns whether any was present
    pub fn remove_tag(&self, entity: &mut ExternalEntity) -> bool {
        strip_tags(entity, &self.owned_ids())
    }

    /// Re-read the entity on the mutation thread, strip plugin tags, append
    /// `tag_id` and write it back if anything changed. False for unknown
    /// entities.
    async fn apply(&self, entity_id: Uuid, tag_id: Option<Uuid>) -> TagResult<bool> {
        let owned = self.owned_ids();
        let registry = self.entities.clone();
        let applied = self
            .dispatcher
            .send(move || -> RegistryResult<Option<bool>> {
                let Some(mut entity) = registry.get(entity_id) else {
                    return Ok(None);
                };
                let before = entity.tag_ids.clone();
                strip_tags(&mut entity, &owned);
                entity.tag_ids.extend(tag_id);
                let changed = entity.tag_ids != before;
                if changed {
                    registry.update(entity)?;
                }
                Ok(Some(changed))
            })
            .await??;

        match applied {
            Some(changed) => {
                if changed {
                    debug!("Tags of {} updated", entity_id);
                }
                Ok(true)
            }
            None => {
                debug!("Entity {} vanished before its tags were written", entity_id);
                Ok(false)
            }
        }
    }

    /// Remove stale plugin tags from the entity and attach the current one in
    /// one write. Returns false for unknown entities.
    pub async fn retag(&self, entity_id: Uuid, data_label: Option<&str>) -> TagResult<bool> {
        if self.entities.get(entity_id).is_none() {
            debug!("Retag skipped, entity {} is unknown", entity_id);
            return Ok(false);
        }
        let tag_id = self.resolve_tag(data_label).await?;
        self.apply(entity_id, tag_id).await
    }

    /// Strip plugin tags from one entity and write it back if it changed.
    /// Returns whether a tag was removed.
    pub async fn untag(&self, entity_id: Uuid) -> TagResult<bool> {
        let owned = self.owned_ids();
        let registry = self.entities.clone();
        let stripped = self
            .dispatcher
            .send(move || -> RegistryResult<bool> {
                let Some(mut entity) = registry.get(entity_id) else {
                    return Ok(false);
                };
                if !strip_tags(&mut entity, &owned) {
                    return Ok(false);
                }
                registry.update(entity)?;
                Ok(true)
            })
            .await??;
        Ok(stripped)
    }

    /// Report a tagging failure for one entity to the user
    pub fn report_failure(&self, entity_name: &str, err: &TagError) {
        error!("Tag insert error with {}: {}", entity_name, err);
        self.notifier.notify(Notification::error(
            format!("{}-Tag-Error", self.plugin_name),
            format!("{}\nTag insert error with {}: {}", self.plugin_name, entity_name, err),
        ));
    }

    /// Retag each entity, pausing `item_delay` before each one. `label_for`
    /// gives the data label for entities whose record has data. Per-entity
    /// failures are reported and skipped.
    pub async fn bulk_retag<F>(
        &self,
        entities: Vec<ExternalEntity>,
        label_for: F,
        item_delay: Duration,
        handle: &ProgressHandle,
    ) -> BulkSummary
    where
        F: Fn(&ExternalEntity) -> Option<String>,
    {
        handle.set_max(entities.len() as u64);
        self.refresh_cache();

        let mut cancelled = false;
        for entity in entities {
            if handle.is_cancelled() {
                cancelled = true;
                break;
            }
            if !item_delay.is_zero() {
                tokio::time::sleep(item_delay).await;
            }
            let label = label_for(&entity);
            if let Err(e) = self.retag(entity.id, label.as_deref()).await {
                self.report_failure(&entity.name, &e);
            }
            handle.advance();
        }

        let summary = handle.summary("AddTagAll", cancelled);
        summary.log();
        summary
    }

    /// Strip plugin tags from each entity
    pub async fn bulk_untag(
        &self,
        entities: Vec<ExternalEntity>,
        handle: &ProgressHandle,
    ) -> BulkSummary {
        handle.set_max(entities.len() as u64);
        self.refresh_cache();

        let mut cancelled = false;
        let mut stripped = 0usize;
        for entity in entities {
            if handle.is_cancelled() {
                cancelled = true;
                break;
            }
            match self.untag(entity.id).await {
                Ok(true) => stripped += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to remove tags from {}: {}", entity.name, e),
            }
            handle.advance();
        }

        info!("Removed plugin tags from {} entities", stripped);
        let summary = handle.summary("RemoveTagAll", cancelled);
        summary.log();
        summary
    }
}

fn strip_tags(entity: &mut ExternalEntity, owned: &HashSet<Uuid>) -> bool {
    let before = entity.tag_ids.len();
    entity.tag_ids.retain(|id| !owned.contains(id));
    entity.tag_ids.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityEvent;
    use crate::host::{InMemoryHost, LogNotifier};
    use std::path::PathBuf;
    use tokio::sync::broadcast;

    /// Hands out a stale snapshot once, then lets a foreign edit land on the
    /// stored entity before the caller writes back
    struct InterleavingRegistry {
        inner: Arc<InMemoryHost>,
        pending: Mutex<Option<Uuid>>,
    }

    impl EntityRegistry for InterleavingRegistry {
        fn get(&self, id: Uuid) -> Option<ExternalEntity> {
            let snapshot = self.inner.get(id);
            if let Some(tag_id) = self.pending.lock().unwrap().take()
                && let Some(mut current) = snapshot.clone()
            {
                current.tag_ids.push(tag_id);
                self.inner.update(current).unwrap();
            }
            snapshot
        }

        fn all(&self) -> Vec<ExternalEntity> {
            self.inner.all()
        }

        fn add(&self, entity: ExternalEntity) -> RegistryResult<()> {
            self.inner.add(entity)
        }

        fn update(&self, entity: ExternalEntity) -> RegistryResult<()> {
            self.inner.update(entity)
        }

        fn remove(&self, id: Uuid) -> RegistryResult<Option<ExternalEntity>> {
            self.inner.remove(id)
        }

        fn subscribe(&self) -> broadcast::Receiver<EntityEvent> {
            self.inner.subscribe()
        }

        fn full_file_path(&self, relative: &str) -> PathBuf {
            self.inner.full_file_path(relative)
        }
    }

    fn setup(prefix: &str, tag_missing: bool) -> (Arc<InMemoryHost>, TagSynchronizer) {
        let host = Arc::new(InMemoryHost::new());
        let sync = TagSynchronizer::new(
            "Test",
            prefix,
            "No data",
            tag_missing,
            host.clone(),
            host.clone(),
            MutationDispatcher::spawn("tags").unwrap(),
            Arc::new(LogNotifier),
        );
        (host, sync)
    }

    #[test]
    fn test_completed_name() {
        let (_, prefixed) = setup("[HLTB]", false);
        assert_eq!(prefixed.completed_name("Done"), "[HLTB] Done");
        assert_eq!(prefixed.completed_name(""), "[HLTB]");

        let (_, bare) = setup("", false);
        assert_eq!(bare.completed_name("Done"), "Done");
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (host, sync) = setup("[SC]", false);
        let a = sync.ensure_tag_exists("Has data").await.unwrap();
        let b = sync.ensure_tag_exists("Has data").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(host.tags().len(), 1);
        assert_eq!(host.tags()[0].name, "[SC] Has data");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_creates_one_tag() {
        let (host, sync) = setup("[SC]", false);
        let sync = Arc::new(sync);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let sync = sync.clone();
            handles.push(tokio::spawn(async move {
                sync.ensure_tag_exists("Race").await.unwrap()
            }));
        }
        let mut ids = HashSet::new();
        for h in handles {
            ids.insert(h.await.unwrap());
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(host.tags().len(), 1);
    }

    #[tokio::test]
    async fn test_add_tag_respects_missing_policy() {
        let (_, sync) = setup("[SC]", false);
        let mut entity = ExternalEntity::new(Uuid::new_v4(), "Hollow Knight");

        assert!(!sync.add_tag(&mut entity, None).await.unwrap());
        assert!(entity.tag_ids.is_empty());

        sync.set_tag_missing(true);
        assert!(sync.add_tag(&mut entity, None).await.unwrap());
        let no_data = sync.no_data_tag().await.unwrap();
        assert_eq!(entity.tag_ids, vec![no_data]);
    }

    #[tokio::test]
    async fn test_remove_then_add_leaves_one_plugin_tag() {
        let (host, sync) = setup("[SC]", true);
        let foreign = host.add_tag("Favorite").unwrap();
        let mut entity = ExternalEntity::new(Uuid::new_v4(), "Tunic");
        entity.tag_ids.push(foreign.id);
        host.add(entity.clone()).unwrap();

        sync.retag(entity.id, None).await.unwrap();
        sync.retag(entity.id, Some("")).await.unwrap();

        let stored = host.get(entity.id).unwrap();
        let owned: HashSet<Uuid> = sync.plugin_tags().iter().map(|t| t.id).collect();
        let plugin: Vec<_> = stored.tag_ids.iter().filter(|id| owned.contains(id)).collect();
        assert_eq!(plugin.len(), 1);
        assert_eq!(*plugin[0], sync.ensure_tag_exists("").await.unwrap());
        assert!(stored.tag_ids.contains(&foreign.id));

        assert!(sync.untag(entity.id).await.unwrap());
        assert_eq!(host.get(entity.id).unwrap().tag_ids, vec![foreign.id]);
    }

    #[tokio::test]
    async fn test_unprefixed_sync_only_owns_ensured_tags() {
        let (host, sync) = setup("", false);
        let foreign = host.add_tag("Backlog").unwrap();
        let mut entity = ExternalEntity::new(Uuid::new_v4(), "Celeste");
        entity.tag_ids.push(foreign.id);
        host.add(entity.clone()).unwrap();

        sync.retag(entity.id, Some("Beaten")).await.unwrap();
        assert_eq!(host.get(entity.id).unwrap().tag_ids.len(), 2);

        sync.untag(entity.id).await.unwrap();
        assert_eq!(host.get(entity.id).unwrap().tag_ids, vec![foreign.id]);
    }

    #[tokio::test]
    async fn test_bulk_retag_stops_on_cancel() {
        let (host, sync) = setup("[SC]", false);
        let entities: Vec<_> = (0..3)
            .map(|i| ExternalEntity::new(Uuid::new_v4(), format!("Game {i}")))
            .collect();
        for e in &entities {
            host.add(e.clone()).unwrap();
        }

        let handle = ProgressHandle::new("retag", true);
        handle.cancel();
        let summary = sync
            .bulk_retag(entities, |_| Some(String::new()), Duration::ZERO, &handle)
            .await;

        assert!(summary.cancelled);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.total, 3);
    }

    #[tokio::test]
    async fn test_retag_keeps_edit_made_after_lookup() {
        let host = Arc::new(InMemoryHost::new());
        let foreign = host.add_tag("Favorite").unwrap();
        let entity = ExternalEntity::new(Uuid::new_v4(), "Outer Wilds");
        host.add(entity.clone()).unwrap();
        let registry = Arc::new(InterleavingRegistry {
            inner: host.clone(),
            pending: Mutex::new(Some(foreign.id)),
        });
        let sync = TagSynchronizer::new(
            "Test",
            "[SC]",
            "No data",
            false,
            host.clone(),
            registry,
            MutationDispatcher::spawn("tags").unwrap(),
            Arc::new(LogNotifier),
        );

        assert!(sync.retag(entity.id, Some("Done")).await.unwrap());

        let stored = host.get(entity.id).unwrap();
        let done = sync.ensure_tag_exists("Done").await.unwrap();
        assert_eq!(stored.tag_ids, vec![foreign.id, done]);
    }

    #[tokio::test]
    async fn test_bulk_retag_waits_between_items() {
        let (host, sync) = setup("[SC]", false);
        let entities: Vec<_> = (0..3)
            .map(|i| ExternalEntity::new(Uuid::new_v4(), format!("Game {i}")))
            .collect();
        for e in &entities {
            host.add(e.clone()).unwrap();
        }

        let handle = ProgressHandle::new("retag", true);
        let started = std::time::Instant::now();
        let summary = sync
            .bulk_retag(
                entities,
                |_| Some("Done".to_string()),
                Duration::from_millis(10),
                &handle,
            )
            .await;

        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!((summary.completed, summary.total), (3, 3));
    }
}
