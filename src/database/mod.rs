//! Plugin record database
//!
//! [`PluginDatabase`] owns the lifecycle of a plugin's records relative to
//! the host's entity catalog. Reads go straight to the in-memory
//! [`EntityStore`]; every mutation of the store or of the host registries is
//! sent to the [`MutationDispatcher`] thread and awaited, so mutations issued
//! from concurrent tasks are applied one at a time.
//!
//! Plugin-specific behaviour (remote fetch, tag labels, presentation hooks)
//! comes from a [`RecordProvider`].

pub mod bulk;
pub mod events;
pub mod provider;
pub mod settings;

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{ContentCache, Downloader};
use crate::dispatch::MutationDispatcher;
use crate::errors::{AppResult, DispatchError, StoreError, StoreResult};
use crate::host::{HostServices, Notification};
use crate::models::{DataGame, ExternalEntity, PluginPaths, PluginRecord};
use crate::store::{EntityStore, RecordFiles};
use crate::tags::TagSynchronizer;

pub use provider::{CacheOnlyProvider, RecordProvider};
pub use settings::DatabaseSettings;

pub struct PluginDatabase<P: RecordProvider> {
    settings: DatabaseSettings,
    paths: PluginPaths,
    provider: Arc<P>,
    store: Arc<EntityStore<P::Record>>,
    host: HostServices,
    tags: TagSynchronizer,
    cache: Arc<ContentCache>,
    dispatcher: MutationDispatcher,
    loaded: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
    focus: RwLock<Option<Uuid>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: RecordProvider> PluginDatabase<P> {
    /// Build a database over `paths`, creating its directories. Nothing is
    /// loaded until [`Self::initialize`].
    pub fn new(
        settings: DatabaseSettings,
        paths: PluginPaths,
        provider: P,
        host: HostServices,
        downloader: Arc<dyn Downloader>,
    ) -> AppResult<Self> {
        paths
            .ensure_created()
            .map_err(|e| StoreError::io(&paths.database_path, e))?;

        let dispatcher = MutationDispatcher::spawn(&settings.name).map_err(|e| {
            DispatchError::Spawn {
                message: e.to_string(),
            }
        })?;

        let store = Arc::new(EntityStore::new(RecordFiles::new(&paths.database_path)));
        let cache = Arc::new(ContentCache::new(&paths.cache_path, downloader));
        let tags = TagSynchronizer::new(
            &settings.name,
            &settings.tag_prefix,
            &settings.no_data_label,
            settings.tag_missing,
            host.tags.clone(),
            host.entities.clone(),
            dispatcher.clone(),
            host.notifier.clone(),
        );

        debug!(
            "Plugin database {} at {}",
            settings.name,
            paths.database_path.display()
        );

        Ok(Self {
            settings,
            paths,
            provider: Arc::new(provider),
            store,
            host,
            tags,
            cache,
            dispatcher,
            loaded: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
            focus: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    pub fn paths(&self) -> &PluginPaths {
        &self.paths
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &EntityStore<P::Record> {
        &self.store
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn tags(&self) -> &TagSynchronizer {
        &self.tags
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Load persisted records and start listening to store and host events.
    ///
    /// Idempotent. Load failures are logged and reported as `false`.
    pub async fn initialize(self: &Arc<Self>) -> bool {
        let _guard = self.init_lock.lock().await;
        if self.is_loaded() {
            info!("Database {} is already initialized", self.settings.name);
            return true;
        }

        let records = match self.provider.load_all(self.store.files()).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to load database {}: {}", self.settings.name, e);
                return false;
            }
        };
        self.store.load(records);

        let mut orphans = 0;
        for id in self.store.ids() {
            if self.host.entities.get(id).is_none() {
                self.store.mark_deleted(id, true);
                orphans += 1;
            }
        }

        self.tags.refresh_cache();
        self.start_listeners();
        self.loaded.store(true, Ordering::Release);

        info!(
            "Database {} loaded with {} records ({} without entity)",
            self.settings.name,
            self.store.len(),
            orphans
        );
        true
    }

    /// Stop reacting to store and host events
    pub fn shutdown(&self) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        for handle in listeners.drain(..) {
            handle.abort();
        }
        debug!("Database {} listeners stopped", self.settings.name);
    }

    /// Run a store mutation on the dispatcher thread
    async fn mutate<R, F>(&self, job: F) -> StoreResult<R>
    where
        F: FnOnce(&EntityStore<P::Record>) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.store.clone();
        self.dispatcher.send(move || job(&store)).await?
    }

    fn default_for(&self, id: Uuid, entity: Option<&ExternalEntity>) -> P::Record {
        match entity {
            Some(entity) => self.provider.default_for(entity),
            None => self.provider.default_for(&ExternalEntity::new(id, "")),
        }
    }

    fn report_error(&self, operation: &str, err: &dyn Display) {
        error!("{} {} failed: {}", self.settings.name, operation, err);
        self.host.notifier.notify(Notification::error(
            format!("{}-Error-{}", self.settings.name, operation),
            format!("{}\n{}", self.settings.name, err),
        ));
    }

    /// Record for `id`.
    ///
    /// Without `force` a stored record is returned as is. With `only_cache`
    /// nothing is fetched and a missing record comes back as an unsaved
    /// default. Otherwise the provider is asked for fresh data, which is
    /// stored when found. `None` only for the nil id.
    pub async fn get(&self, id: Uuid, only_cache: bool, force: bool) -> Option<P::Record> {
        if id.is_nil() {
            warn!("Nil id in get()");
            return None;
        }
        if !force && let Some(record) = self.store.get(id) {
            return Some(record);
        }

        let entity = self.host.entities.get(id);
        let fallback = |entity: Option<&ExternalEntity>| {
            self.store
                .get(id)
                .unwrap_or_else(|| self.default_for(id, entity))
        };

        if only_cache {
            return Some(fallback(entity.as_ref()));
        }
        let Some(entity) = entity else {
            debug!("No external entity {}, nothing to fetch", id);
            return Some(fallback(None));
        };

        match self.provider.fetch_remote(&entity).await {
            Ok(Some(mut record)) => {
                record.base_mut().id = id;
                self.add_or_update(record.clone()).await;
                Some(self.store.get(id).unwrap_or(record))
            }
            Ok(None) => Some(fallback(Some(&entity))),
            Err(e) => {
                warn!("Fetching data for {} failed: {:#}", entity.name, e);
                Some(fallback(Some(&entity)))
            }
        }
    }

    /// Fresh remote data for `id`, never stored. `None` when the entity is
    /// unknown, the source has nothing or the fetch failed.
    pub async fn get_web(&self, id: Uuid) -> Option<P::Record> {
        let entity = self.host.entities.get(id)?;
        match self.provider.fetch_remote(&entity).await {
            Ok(Some(mut record)) => {
                record.base_mut().id = id;
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Fetching data for {} failed: {:#}", entity.name, e);
                None
            }
        }
    }

    /// Owned copy of the cached record; changing it never affects the store
    pub async fn get_clone(&self, id: Uuid) -> Option<P::Record> {
        self.get(id, true, false).await
    }

    /// Stored record only, no default
    pub fn get_only_cache(&self, id: Uuid) -> Option<P::Record> {
        self.store.get(id)
    }

    fn data_label(&self, record: &P::Record) -> Option<String> {
        record
            .has_data()
            .then(|| self.provider.tag_label(record))
    }

    async fn sync_tags(&self, record: &P::Record) {
        if !self.settings.tag_sync_enabled {
            return;
        }
        debug!("RemoveTag & AddTag for {} with {}", record.name(), record.id());
        let label = self.data_label(record);
        if let Err(e) = self.tags.retag(record.id(), label.as_deref()).await {
            self.tags.report_failure(record.name(), &e);
        }
    }

    pub async fn add(&self, mut record: P::Record) -> bool {
        if record.id().is_nil() {
            warn!("Record with nil id in add()");
            return false;
        }
        record.set_saved(true);

        let item = record.clone();
        if let Err(e) = self.mutate(move |store| store.add(item)).await {
            self.report_error("Add", &e);
            return false;
        }
        self.sync_tags(&record).await;
        true
    }

    pub async fn update(&self, mut record: P::Record) -> bool {
        if record.id().is_nil() {
            warn!("Record with nil id in update()");
            return false;
        }
        record.set_saved(true);

        let item = record.clone();
        if let Err(e) = self.mutate(move |store| store.update(item)).await {
            self.report_error("Update", &e);
            return false;
        }
        self.sync_tags(&record).await;
        true
    }

    /// Add when no record exists for the id, update otherwise. The check
    /// and the write happen in one job on the mutation thread.
    pub async fn add_or_update(&self, mut record: P::Record) -> bool {
        if record.id().is_nil() {
            warn!("Record with nil id in add_or_update()");
            return false;
        }
        record.set_saved(true);

        let item = record.clone();
        match self.mutate(move |store| store.upsert(item)).await {
            Ok(Some(_)) => debug!("Updated record {}", record.id()),
            Ok(None) => debug!("Added record {}", record.id()),
            Err(e) => {
                let operation = if self.store.contains(record.id()) {
                    "Update"
                } else {
                    "Add"
                };
                self.report_error(operation, &e);
                return false;
            }
        }
        self.sync_tags(&record).await;
        true
    }

    async fn try_remove(&self, id: Uuid) -> AppResult<bool> {
        if let Err(e) = self.tags.untag(id).await {
            warn!("Failed to remove tags from {}: {}", id, e);
        }
        if !self.store.contains(id) {
            return Ok(false);
        }
        let removed = self.mutate(move |store| store.remove(id)).await?;
        Ok(removed.is_some())
    }

    /// Strip plugin tags from the entity and drop its record.
    /// False when there was no record.
    pub async fn remove(&self, id: Uuid) -> bool {
        if id.is_nil() {
            warn!("Nil id in remove()");
            return false;
        }
        match self.try_remove(id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Failed to remove record {}: {}", id, e);
                false
            }
        }
    }

    /// Best-effort removal of several records
    pub async fn remove_many(&self, ids: &[Uuid]) -> bool {
        self.store.begin_batch();
        for id in ids {
            self.remove(*id).await;
        }
        self.store.end_batch();
        true
    }

    /// Re-fetch one record and store it when it changed
    pub async fn refresh(&self, id: Uuid) {
        let entity = self.host.entities.get(id);
        info!(
            "Refresh({} - {})",
            entity.as_ref().map(|e| e.name.as_str()).unwrap_or_default(),
            id
        );

        let loaded = self.get(id, true, false).await;
        let remote = match &entity {
            Some(entity) => match self.provider.fetch_remote(entity).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!("Fetching data for {} failed: {:#}", entity.name, e);
                    None
                }
            },
            None => None,
        };

        let current = match remote {
            Some(mut remote) => {
                remote.base_mut().id = id;
                let changed = match &loaded {
                    Some(loaded) => {
                        let mut candidate = remote.clone();
                        candidate.set_saved(loaded.is_saved());
                        candidate.set_deleted(loaded.is_deleted());
                        &candidate != loaded
                    }
                    None => true,
                };
                if changed {
                    self.add_or_update(remote.clone()).await;
                    self.store.get(id).or(Some(remote))
                } else {
                    loaded
                }
            }
            None => loaded,
        };

        if let Some(record) = current {
            self.provider.after_refresh(&record).await;
        }
    }

    /// Remove every record whose external entity no longer exists
    pub async fn reconcile_orphans(&self) -> usize {
        let orphans: Vec<P::Record> = self
            .store
            .items()
            .into_iter()
            .filter(|r| self.host.entities.get(r.id()).is_none())
            .collect();

        self.store.begin_batch();
        let mut removed = 0;
        for record in orphans {
            info!("Delete data for missing entity: {} - {}", record.name(), record.id());
            let id = record.id();
            match self.mutate(move |store| store.remove(id)).await {
                Ok(Some(_)) => removed += 1,
                Ok(None) => {}
                Err(e) => error!("Failed to remove orphan {}: {}", id, e),
            }
        }
        self.store.end_batch();
        removed
    }

    /// Visible entities with no record or a record without data
    pub fn list_missing_or_absent(&self) -> Vec<ExternalEntity> {
        let mut missing: Vec<ExternalEntity> = self
            .host
            .entities
            .all()
            .into_iter()
            .filter(|e| !e.hidden)
            .filter(|e| self.store.get(e.id).is_none_or(|r| !r.has_data()))
            .collect();
        missing.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        missing.dedup_by_key(|e| e.id);
        missing
    }

    /// External entities that currently have a record
    pub fn known_entities(&self) -> Vec<ExternalEntity> {
        self.store
            .ids()
            .into_iter()
            .filter_map(|id| self.host.entities.get(id))
            .collect()
    }

    fn to_data_game(&self, record: &P::Record) -> DataGame {
        let icon = self
            .host
            .entities
            .get(record.id())
            .and_then(|e| e.icon)
            .filter(|icon| !icon.is_empty())
            .map(|icon| self.host.entities.full_file_path(&icon));
        DataGame {
            id: record.id(),
            name: record.name().to_string(),
            icon,
            is_deleted: record.is_deleted(),
            count_data: record.count(),
        }
    }

    /// Read-model of every record
    pub fn data_games(&self) -> Vec<DataGame> {
        self.store
            .items()
            .iter()
            .map(|r| self.to_data_game(r))
            .collect()
    }

    /// Read-model of records whose entity was gone at load time
    pub fn isolated_data_games(&self) -> Vec<DataGame> {
        self.store
            .items()
            .iter()
            .filter(|r| r.is_deleted())
            .map(|r| self.to_data_game(r))
            .collect()
    }

    /// Entity whose presentation follows record changes
    pub fn set_focus(&self, id: Option<Uuid>) {
        *self.focus.write().unwrap_or_else(|e| e.into_inner()) = id;
        if let Some(id) = id {
            self.refresh_focus(id);
        }
    }

    pub fn focus(&self) -> Option<Uuid> {
        *self.focus.read().unwrap_or_else(|e| e.into_inner())
    }

    fn refresh_focus(&self, id: Uuid) {
        if let Some(entity) = self.host.entities.get(id) {
            let record = self.store.get(id);
            self.provider.refresh_presentation(&entity, record.as_ref());
        }
    }
}

impl<P: RecordProvider> Drop for PluginDatabase<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
