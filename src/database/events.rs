//! Reactions to store and host entity events

use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::{PluginDatabase, RecordProvider};
use crate::models::{EntityEvent, PluginRecord};
use crate::store::StoreEvent;

impl<P: RecordProvider> PluginDatabase<P> {
    /// Subscribe before spawning so no event published after
    /// initialization is missed
    pub(super) fn start_listeners(self: &Arc<Self>) {
        let entity_events = self.host.entities.subscribe();
        let store_events = self.store.subscribe();
        let weak = Arc::downgrade(self);

        let entity_task = tokio::spawn(Self::drain_entity_events(weak.clone(), entity_events));
        let store_task = tokio::spawn(Self::drain_store_events(weak, store_events));

        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend([entity_task, store_task]);
    }

    async fn drain_entity_events(
        db: Weak<Self>,
        mut rx: tokio::sync::broadcast::Receiver<EntityEvent>,
    ) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(db) = db.upgrade() else { break };
                    db.handle_entity_event(event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} entity events, reconciling orphans", skipped);
                    let Some(db) = db.upgrade() else { break };
                    db.reconcile_orphans().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Entity event listener stopped");
    }

    async fn drain_store_events(
        db: Weak<Self>,
        mut rx: tokio::sync::broadcast::Receiver<StoreEvent<P::Record>>,
    ) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(db) = db.upgrade() else { break };
                    db.handle_store_event(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Missed {} store events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Store event listener stopped");
    }

    /// Apply one host entity event. Events are handled one at a time in
    /// publication order.
    pub async fn handle_entity_event(&self, event: EntityEvent) {
        match event {
            EntityEvent::Added(entities) => {
                for entity in &entities {
                    self.provider.link_entity(entity);
                }
            }
            EntityEvent::Updated(updates) => {
                let focus = self.focus();
                for update in &updates {
                    if focus == Some(update.new.id) {
                        let record = self.store.get(update.new.id);
                        self.provider
                            .refresh_presentation(&update.new, record.as_ref());
                    }
                    self.provider.link_entity(&update.new);
                }
            }
            EntityEvent::Removed(entities) => {
                for entity in &entities {
                    debug!("Entity {} removed from host", entity.id);
                    self.remove(entity.id).await;
                }
            }
        }
    }

    fn handle_store_event(&self, event: &StoreEvent<P::Record>) {
        let Some(focus) = self.focus() else {
            return;
        };
        let touches_focus = match event {
            StoreEvent::ItemsUpdated(updates) => updates.iter().any(|u| u.new.id() == focus),
            StoreEvent::CollectionChanged { .. } => true,
        };
        if touches_focus {
            self.refresh_focus(focus);
        }
    }
}
