use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Read-model joining a record with its entity's icon. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataGame {
    pub id: Uuid,
    pub name: String,
    pub icon: Option<PathBuf>,
    pub is_deleted: bool,
    pub count_data: usize,
}
