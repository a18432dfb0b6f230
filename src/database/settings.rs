use std::time::Duration;

use crate::config::Config;

/// Per-instance behaviour of a [`super::PluginDatabase`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub name: String,
    pub tag_prefix: String,
    pub tag_sync_enabled: bool,
    pub tag_missing: bool,
    pub no_data_label: String,
    pub item_delay: Duration,
    pub clear_cache_delay: Duration,
}

impl DatabaseSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from(&Config::default()).with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tags(mut self, prefix: impl Into<String>, sync_enabled: bool) -> Self {
        self.tag_prefix = prefix.into();
        self.tag_sync_enabled = sync_enabled;
        self
    }

    pub fn with_delays(mut self, item_delay: Duration, clear_cache_delay: Duration) -> Self {
        self.item_delay = item_delay;
        self.clear_cache_delay = clear_cache_delay;
        self
    }
}

impl From<&Config> for DatabaseSettings {
    fn from(config: &Config) -> Self {
        Self {
            name: config.plugin.name.clone(),
            tag_prefix: config.plugin.tag_prefix.clone(),
            tag_sync_enabled: config.plugin.tag_sync_enabled,
            tag_missing: config.plugin.tag_missing,
            no_data_label: config.plugin.no_data_label.clone(),
            item_delay: config.bulk.item_delay,
            clear_cache_delay: config.bulk.clear_cache_delay,
        }
    }
}
