//! Directory layout of a plugin instance.

use std::path::{Path, PathBuf};

/// The four directories a plugin works with.
///
/// ```text
/// <user-data-root>/<plugin>/   persisted records
/// <cache-root>/<plugin>/       cached remote files
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginPaths {
    pub plugin_path: PathBuf,
    pub user_data_path: PathBuf,
    pub database_path: PathBuf,
    pub cache_path: PathBuf,
}

impl PluginPaths {
    pub fn new(
        plugin_name: &str,
        install_path: Option<&Path>,
        user_data_root: &Path,
        cache_root: &Path,
    ) -> Self {
        let plugin_path = install_path
            .map(Path::to_path_buf)
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf))
            })
            .unwrap_or_default();

        Self {
            plugin_path,
            user_data_path: user_data_root.to_path_buf(),
            database_path: user_data_root.join(plugin_name),
            cache_path: cache_root.join(plugin_name),
        }
    }

    /// Create the database and cache directories if absent
    pub fn ensure_created(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.database_path)?;
        std::fs::create_dir_all(&self.cache_path)?;
        Ok(())
    }
}
