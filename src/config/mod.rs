use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub plugin: PluginConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
}

/// Per-plugin identity and tagging behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin name, also the directory name under the data and cache roots
    #[serde(default = "default_plugin_name")]
    pub name: String,
    /// Prefix shared by every tag this plugin manages; empty means bare names
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,
    /// Keep a "has data" tag on external entities in sync with their record
    #[serde(default = "default_tag_sync_enabled")]
    pub tag_sync_enabled: bool,
    /// Attach the "no data" tag to entities whose record has no data
    #[serde(default = "default_tag_missing")]
    pub tag_missing: bool,
    /// Reserved suffix of the "no data" tag
    #[serde(default = "default_no_data_label")]
    pub no_data_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_user_data_root")]
    pub user_data_root: PathBuf,
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    /// Defaults to the directory of the running executable
    #[serde(default)]
    pub install_path: Option<PathBuf>,
    /// Host catalog used by the CLI as its external entity registry
    #[serde(default = "default_catalog_path")]
    pub catalog: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(with = "duration_serde::duration", default = "default_request_timeout")]
    pub request_timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Pause between items of a bulk loop
    #[serde(with = "duration_serde::duration", default = "default_item_delay")]
    pub item_delay: Duration,
    /// Grace period before cached files are deleted
    #[serde(with = "duration_serde::duration", default = "default_clear_cache_delay")]
    pub clear_cache_delay: Duration,
}

// Plugin defaults
fn default_plugin_name() -> String {
    DEFAULT_PLUGIN_NAME.to_string()
}

fn default_tag_prefix() -> String {
    DEFAULT_TAG_PREFIX.to_string()
}

fn default_tag_sync_enabled() -> bool {
    DEFAULT_TAG_SYNC_ENABLED
}

fn default_tag_missing() -> bool {
    DEFAULT_TAG_MISSING
}

fn default_no_data_label() -> String {
    DEFAULT_NO_DATA_LABEL.to_string()
}

// Path defaults
fn default_user_data_root() -> PathBuf {
    PathBuf::from(DEFAULT_USER_DATA_ROOT)
}

fn default_cache_root() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_ROOT)
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_PATH)
}

// Cache defaults
fn default_request_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_REQUEST_TIMEOUT).unwrap_or(Duration::from_secs(30))
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

// Bulk defaults
fn default_item_delay() -> Duration {
    humantime::parse_duration(DEFAULT_ITEM_DELAY).unwrap_or(Duration::from_millis(10))
}

fn default_clear_cache_delay() -> Duration {
    humantime::parse_duration(DEFAULT_CLEAR_CACHE_DELAY).unwrap_or(Duration::from_secs(2))
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            name: default_plugin_name(),
            tag_prefix: default_tag_prefix(),
            tag_sync_enabled: default_tag_sync_enabled(),
            tag_missing: default_tag_missing(),
            no_data_label: default_no_data_label(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            user_data_root: default_user_data_root(),
            cache_root: default_cache_root(),
            install_path: None,
            catalog: default_catalog_path(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            item_delay: default_item_delay(),
            clear_cache_delay: default_clear_cache_delay(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&config_file)
    }

    /// Load from `config_file`, layering `PLUGIN_DB_*` environment overrides
    /// on top. A missing file is created with the defaults.
    pub fn load_from_file(config_file: impl AsRef<Path>) -> Result<Self> {
        let config_file = config_file.as_ref();
        if !config_file.exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            if let Some(parent) = config_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file.display());
        }

        let config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plugin-db.toml");

        let config = Config::load_from_file(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.plugin.name, DEFAULT_PLUGIN_NAME);
        assert!(!config.plugin.tag_sync_enabled);
        assert_eq!(config.bulk.item_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plugin-db.toml");
        std::fs::write(
            &path,
            r#"
[plugin]
name = "ScreenshotsVisualizer"
tag_prefix = "[SSV]"
tag_sync_enabled = true

[cache]
request_timeout = "5s"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();

        assert_eq!(config.plugin.name, "ScreenshotsVisualizer");
        assert_eq!(config.plugin.tag_prefix, "[SSV]");
        assert!(config.plugin.tag_sync_enabled);
        assert_eq!(config.plugin.no_data_label, DEFAULT_NO_DATA_LABEL);
        assert_eq!(config.cache.request_timeout, Duration::from_secs(5));
        assert_eq!(config.paths.cache_root, PathBuf::from(DEFAULT_CACHE_ROOT));
    }
}
