//! One JSON file per record under the plugin database directory.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};
use crate::models::PluginRecord;

const RECORD_EXTENSION: &str = "json";

/// Reads and writes `<dir>/<id>.json` record files
#[derive(Debug, Clone)]
pub struct RecordFiles<T> {
    dir: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T: PluginRecord> RecordFiles<T> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _record: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    /// Load every record file. A missing directory is an empty database; an
    /// unreadable or malformed file fails the whole load.
    pub fn load_all(&self) -> StoreResult<Vec<T>> {
        if !self.dir.exists() {
            debug!("Record directory {} does not exist yet", self.dir.display());
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let raw = std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            let record: T = serde_json::from_str(&raw).map_err(|source| {
                StoreError::Serialization {
                    path: path.clone(),
                    source,
                }
            })?;
            records.push(record);
        }

        debug!("Loaded {} records from {}", records.len(), self.dir.display());
        Ok(records)
    }

    /// Write a record atomically: temp file in the same directory, then rename
    pub fn save(&self, record: &T) -> StoreResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.path_for(record.id());

        let raw = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Serialization {
            path: path.clone(),
            source,
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        tmp.write_all(&raw).map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        trace!("Saved record {} to {}", record.id(), path.display());
        Ok(())
    }

    /// Delete a record file; absent files are fine
    pub fn delete(&self, id: Uuid) -> StoreResult<()> {
        let path = self.path_for(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalEntity, JsonRecord};
    use serde_json::json;
    use tempfile::TempDir;

    fn record(name: &str) -> JsonRecord {
        let mut r = JsonRecord::for_entity(&ExternalEntity::new(Uuid::new_v4(), name));
        r.data = json!({ "hours": 12 });
        r.set_saved(true);
        r
    }

    #[test]
    fn test_save_load_delete() {
        let dir = TempDir::new().unwrap();
        let files = RecordFiles::<JsonRecord>::new(dir.path().join("db"));

        assert!(files.load_all().unwrap().is_empty());

        let a = record("Tunic");
        let b = record("Inside");
        files.save(&a).unwrap();
        files.save(&b).unwrap();
        assert!(files.path_for(a.id()).exists());

        let mut loaded = files.load_all().unwrap();
        loaded.sort_by(|x, y| x.name().cmp(y.name()));
        assert_eq!(loaded, vec![b.clone(), a.clone()]);

        files.delete(a.id()).unwrap();
        files.delete(a.id()).unwrap();
        assert_eq!(files.load_all().unwrap(), vec![b]);
    }

    #[test]
    fn test_malformed_file_fails_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(format!("{}.json", Uuid::new_v4())), "{ nope").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = RecordFiles::<JsonRecord>::new(dir.path());
        assert!(matches!(
            files.load_all(),
            Err(StoreError::Serialization { .. })
        ));
    }
}
