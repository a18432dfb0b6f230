use async_trait::async_trait;
use plugin_db::cache::HttpDownloader;
use plugin_db::config::CacheConfig;
use plugin_db::database::{DatabaseSettings, PluginDatabase, RecordProvider};
use plugin_db::host::{EntityRegistry, HostServices, InMemoryHost};
use plugin_db::models::{ExternalEntity, JsonRecord, PluginPaths, PluginRecord};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Serves payloads from a map and counts hook invocations
#[derive(Default)]
struct ScriptedProvider {
    remote: Mutex<HashMap<Uuid, Value>>,
    fetches: AtomicUsize,
    refreshed: AtomicUsize,
    presented: Mutex<Vec<Uuid>>,
}

impl ScriptedProvider {
    fn serve(&self, id: Uuid, data: Value) {
        self.remote.lock().unwrap().insert(id, data);
    }
}

#[async_trait]
impl RecordProvider for ScriptedProvider {
    type Record = JsonRecord;

    async fn fetch_remote(&self, entity: &ExternalEntity) -> anyhow::Result<Option<JsonRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let data = self.remote.lock().unwrap().get(&entity.id).cloned();
        Ok(data.map(|data| {
            let mut record = JsonRecord::for_entity(entity);
            record.data = data;
            record
        }))
    }

    async fn after_refresh(&self, _record: &JsonRecord) {
        self.refreshed.fetch_add(1, Ordering::SeqCst);
    }

    fn refresh_presentation(&self, entity: &ExternalEntity, _record: Option<&JsonRecord>) {
        self.presented.lock().unwrap().push(entity.id);
    }
}

fn open(dir: &TempDir, host: Arc<InMemoryHost>) -> Arc<PluginDatabase<ScriptedProvider>> {
    let settings = DatabaseSettings::new("Lifecycle")
        .with_delays(Duration::ZERO, Duration::ZERO);
    let paths = PluginPaths::new(
        "Lifecycle",
        Some(dir.path()),
        &dir.path().join("user"),
        &dir.path().join("cache"),
    );
    let downloader = Arc::new(HttpDownloader::new(&CacheConfig::default()).unwrap());
    Arc::new(
        PluginDatabase::new(
            settings,
            paths,
            ScriptedProvider::default(),
            HostServices::in_memory(host),
            downloader,
        )
        .unwrap(),
    )
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn record(entity: &ExternalEntity, data: Value) -> JsonRecord {
    let mut record = JsonRecord::for_entity(entity);
    record.data = data;
    record
}

#[tokio::test]
async fn test_add_or_update_keeps_one_record_and_persists_last_payload() {
    let dir = TempDir::new().unwrap();
    let entity = ExternalEntity::new(Uuid::new_v4(), "Disco Elysium");
    let host = Arc::new(InMemoryHost::with_entities([entity.clone()]));

    let db = open(&dir, host.clone());
    assert!(db.initialize().await);
    assert!(db.add_or_update(record(&entity, json!({ "v": 1 }))).await);
    assert!(db.add_or_update(record(&entity, json!({ "v": 2 }))).await);
    assert_eq!(db.store().len(), 1);
    db.shutdown();
    drop(db);

    let reopened = open(&dir, host);
    assert!(reopened.initialize().await);
    let stored = reopened.get_only_cache(entity.id).unwrap();
    assert_eq!(stored.data, json!({ "v": 2 }));
    assert!(stored.is_saved());
}

#[tokio::test]
async fn test_host_removal_drops_record() {
    let dir = TempDir::new().unwrap();
    let entity = ExternalEntity::new(Uuid::new_v4(), "Pentiment");
    let host = Arc::new(InMemoryHost::with_entities([entity.clone()]));
    let db = open(&dir, host.clone());
    db.initialize().await;
    db.add(record(&entity, json!([1]))).await;

    host.remove(entity.id).unwrap();

    let store_db = db.clone();
    assert!(eventually(move || !store_db.store().contains(entity.id)).await);
    assert!(!db.paths().database_path.join(format!("{}.json", entity.id)).exists());
}

#[tokio::test]
async fn test_refresh_updates_only_changed_records() {
    let dir = TempDir::new().unwrap();
    let same = ExternalEntity::new(Uuid::new_v4(), "Same");
    let changed = ExternalEntity::new(Uuid::new_v4(), "Changed");
    let host = Arc::new(InMemoryHost::with_entities([same.clone(), changed.clone()]));
    let db = open(&dir, host);
    db.initialize().await;

    db.add(record(&same, json!([1]))).await;
    db.add(record(&changed, json!([1]))).await;
    db.provider().serve(same.id, json!([1]));
    db.provider().serve(changed.id, json!([1, 2]));

    let mut events = db.store().subscribe();
    let summary = db.refresh_many(&[same.id, changed.id]).await;

    assert_eq!((summary.completed, summary.total), (2, 2));
    assert!(!summary.cancelled);
    assert_eq!(db.provider().refreshed.load(Ordering::SeqCst), 2);
    assert_eq!(db.get_only_cache(changed.id).unwrap().data, json!([1, 2]));
    assert_eq!(db.get_only_cache(same.id).unwrap().data, json!([1]));

    match events.try_recv().unwrap() {
        plugin_db::store::StoreEvent::ItemsUpdated(updates) => {
            assert_eq!(updates.len(), 1);
            assert_eq!(updates[0].new.id(), changed.id);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_selected_only_missing() {
    let dir = TempDir::new().unwrap();
    let full = ExternalEntity::new(Uuid::new_v4(), "Full");
    let empty = ExternalEntity::new(Uuid::new_v4(), "Empty");
    let host = Arc::new(InMemoryHost::with_entities([full.clone(), empty.clone()]));
    let db = open(&dir, host);
    db.initialize().await;

    db.add(record(&full, json!([1]))).await;
    db.provider().serve(full.id, json!([9, 9]));
    db.provider().serve(empty.id, json!(["fresh"]));

    let summary = db.fetch_selected(&[full.id, empty.id], true).await;

    assert_eq!(summary.total, 1);
    assert_eq!(db.provider().fetches.load(Ordering::SeqCst), 1);
    assert_eq!(db.get_only_cache(full.id).unwrap().data, json!([1]));
    assert_eq!(db.get_only_cache(empty.id).unwrap().data, json!(["fresh"]));
    assert!(db.list_missing_or_absent().is_empty());
}

#[tokio::test]
async fn test_clear_all_keeps_orphans() {
    let dir = TempDir::new().unwrap();
    let known = ExternalEntity::new(Uuid::new_v4(), "Known");
    let host = Arc::new(InMemoryHost::with_entities([known.clone()]));
    let db = open(&dir, host);
    db.initialize().await;

    let orphan = ExternalEntity::new(Uuid::new_v4(), "Orphan");
    db.add(record(&known, json!([1]))).await;
    db.add(record(&orphan, json!([1]))).await;

    assert!(db.clear_all().await);
    assert!(!db.store().contains(known.id));
    assert!(db.store().contains(orphan.id));

    assert_eq!(db.reconcile_orphans().await, 1);
    assert!(db.store().is_empty());
}

#[tokio::test]
async fn test_focus_follows_record_changes() {
    let dir = TempDir::new().unwrap();
    let focused = ExternalEntity::new(Uuid::new_v4(), "Focused");
    let other = ExternalEntity::new(Uuid::new_v4(), "Other");
    let host = Arc::new(InMemoryHost::with_entities([focused.clone(), other.clone()]));
    let db = open(&dir, host);
    db.initialize().await;
    db.add(record(&focused, json!([1]))).await;
    db.add(record(&other, json!([1]))).await;

    db.set_focus(Some(focused.id));
    assert_eq!(db.provider().presented.lock().unwrap().len(), 1);

    db.update(record(&other, json!([2]))).await;
    db.update(record(&focused, json!([2]))).await;

    let watched = db.clone();
    assert!(eventually(move || watched.provider().presented.lock().unwrap().len() >= 2).await);
    assert!(
        db.provider()
            .presented
            .lock()
            .unwrap()
            .iter()
            .all(|id| *id == focused.id)
    );
}

#[tokio::test]
async fn test_clear_cache_removes_cached_files() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir, Arc::new(InMemoryHost::new()));
    db.initialize().await;

    let cached = db.paths().cache_path.join("0123.jpg");
    std::fs::write(&cached, b"img").unwrap();

    assert!(db.clear_cache().await);
    assert!(!cached.exists());
    assert!(db.paths().cache_path.is_dir());
}
