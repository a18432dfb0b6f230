/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Plugin defaults
pub const DEFAULT_PLUGIN_NAME: &str = "PluginDatabase";
pub const DEFAULT_TAG_PREFIX: &str = "";
pub const DEFAULT_TAG_SYNC_ENABLED: bool = false;
pub const DEFAULT_TAG_MISSING: bool = false;
pub const DEFAULT_NO_DATA_LABEL: &str = "No data";

// Path defaults
pub const DEFAULT_USER_DATA_ROOT: &str = "./data/user";
pub const DEFAULT_CACHE_ROOT: &str = "./data/cache";
pub const DEFAULT_CATALOG_PATH: &str = "./data/catalog.json";

// Cache defaults
pub const DEFAULT_REQUEST_TIMEOUT: &str = "30s";

// Bulk operation defaults
pub const DEFAULT_ITEM_DELAY: &str = "10ms";
pub const DEFAULT_CLEAR_CACHE_DELAY: &str = "2s";

// Environment
pub const ENV_PREFIX: &str = "PLUGIN_DB_";
pub const DEFAULT_CONFIG_FILE: &str = "plugin-db.toml";
