//! Keyed record collection with persistence and change notification
//!
//! [`EntityStore`] maps external entity ids to plugin records. Reads may
//! happen from any thread; mutations are expected to arrive through the
//! mutation dispatcher so they are serialized. Every successful mutation is
//! written through to [`RecordFiles`] before it becomes visible in memory,
//! then published as a [`StoreEvent`].

pub mod persistence;

use std::collections::HashMap;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};
use crate::models::PluginRecord;

pub use persistence::RecordFiles;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Old and new payload of an updated record
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate<T> {
    pub old: T,
    pub new: T,
}

/// Change notifications, batched while a batch is open
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent<T> {
    ItemsUpdated(Vec<ItemUpdate<T>>),
    CollectionChanged { added: Vec<T>, removed: Vec<T> },
}

struct PendingEvents<T> {
    depth: usize,
    updated: Vec<ItemUpdate<T>>,
    added: Vec<T>,
    removed: Vec<T>,
}

impl<T> Default for PendingEvents<T> {
    fn default() -> Self {
        Self {
            depth: 0,
            updated: Vec::new(),
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

pub struct EntityStore<T: PluginRecord> {
    items: RwLock<HashMap<Uuid, T>>,
    files: RecordFiles<T>,
    events: broadcast::Sender<StoreEvent<T>>,
    pending: Mutex<PendingEvents<T>>,
}

impl<T: PluginRecord> EntityStore<T> {
    pub fn new(files: RecordFiles<T>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            items: RwLock::new(HashMap::new()),
            files,
            events,
            pending: Mutex::new(PendingEvents::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, T>> {
        self.items.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, T>> {
        self.items.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn files(&self) -> &RecordFiles<T> {
        &self.files
    }

    /// Replace the in-memory contents with already-persisted records.
    /// Publishes nothing.
    pub fn load(&self, records: Vec<T>) {
        let mut items = self.write();
        items.clear();
        items.extend(records.into_iter().map(|r| (r.id(), r)));
        debug!("Store loaded with {} records", items.len());
    }

    pub fn get(&self, id: Uuid) -> Option<T> {
        self.read().get(&id).cloned()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.read().keys().copied().collect()
    }

    /// Snapshot of every record
    pub fn items(&self) -> Vec<T> {
        self.read().values().cloned().collect()
    }

    pub fn add(&self, record: T) -> StoreResult<()> {
        let id = record.id();
        if self.contains(id) {
            return Err(StoreError::AlreadyExists { id });
        }
        self.files.save(&record)?;
        self.write().insert(id, record.clone());
        self.publish_added(record);
        Ok(())
    }

    /// Replace an existing record, returning the previous payload
    pub fn update(&self, record: T) -> StoreResult<T> {
        let id = record.id();
        if !self.contains(id) {
            return Err(StoreError::NotFound { id });
        }
        self.files.save(&record)?;
        let old = self
            .write()
            .insert(id, record.clone())
            .ok_or(StoreError::NotFound { id })?;
        self.publish_updated(ItemUpdate { old: old.clone(), new: record });
        Ok(old)
    }

    /// Add or replace in one step, returning the previous payload if any
    pub fn upsert(&self, record: T) -> StoreResult<Option<T>> {
        let id = record.id();
        self.files.save(&record)?;
        let old = self.write().insert(id, record.clone());
        match &old {
            Some(old) => self.publish_updated(ItemUpdate {
                old: old.clone(),
                new: record,
            }),
            None => self.publish_added(record),
        }
        Ok(old)
    }

    pub fn remove(&self, id: Uuid) -> StoreResult<Option<T>> {
        if !self.contains(id) {
            return Ok(None);
        }
        self.files.delete(id)?;
        let removed = self.write().remove(&id);
        if let Some(record) = &removed {
            self.publish_removed(record.clone());
        }
        Ok(removed)
    }

    /// Flag a record as orphaned without persisting the flag
    pub fn mark_deleted(&self, id: Uuid, deleted: bool) -> bool {
        match self.write().get_mut(&id) {
            Some(record) => {
                record.set_deleted(deleted);
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent<T>> {
        self.events.subscribe()
    }

    /// Hold back notifications until the matching [`Self::end_batch`].
    /// Batches nest.
    pub fn begin_batch(&self) {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).depth += 1;
    }

    /// Close a batch; the outermost close publishes everything accumulated
    pub fn end_batch(&self) {
        let flushed = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.depth = pending.depth.saturating_sub(1);
            if pending.depth > 0 {
                return;
            }
            std::mem::take(&mut *pending)
        };

        if !flushed.updated.is_empty() {
            self.send(StoreEvent::ItemsUpdated(flushed.updated));
        }
        if !flushed.added.is_empty() || !flushed.removed.is_empty() {
            self.send(StoreEvent::CollectionChanged {
                added: flushed.added,
                removed: flushed.removed,
            });
        }
    }

    fn publish_updated(&self, update: ItemUpdate<T>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.depth > 0 {
            pending.updated.push(update);
        } else {
            drop(pending);
            self.send(StoreEvent::ItemsUpdated(vec![update]));
        }
    }

    fn publish_added(&self, record: T) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.depth > 0 {
            pending.added.push(record);
        } else {
            drop(pending);
            self.send(StoreEvent::CollectionChanged {
                added: vec![record],
                removed: Vec::new(),
            });
        }
    }

    fn publish_removed(&self, record: T) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.depth > 0 {
            pending.removed.push(record);
        } else {
            drop(pending);
            self.send(StoreEvent::CollectionChanged {
                added: Vec::new(),
                removed: vec![record],
            });
        }
    }

    fn send(&self, event: StoreEvent<T>) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}
