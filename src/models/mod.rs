//! Domain models shared across the crate.

pub mod data_game;
pub mod entity;
pub mod paths;
pub mod record;

pub use data_game::DataGame;
pub use entity::{EntityEvent, EntityUpdate, ExternalEntity, Tag};
pub use paths::PluginPaths;
pub use record::{JsonRecord, PluginRecord, RecordBase};
