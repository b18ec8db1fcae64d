//! Settings shared by every plugin of a host.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_directory() -> String {
    "plugins".to_string()
}

/// Plugin settings of the host. Not specific to any plugin; applied across all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Directory that holds every plugin's data folder. Relative paths are
    /// resolved against the working directory when plugins are initialized.
    #[serde(default = "default_directory")]
    pub directory: String,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            directory: default_directory(),
        }
    }
}

impl PluginSettings {
    /// Settings with the given plugins directory.
    pub fn with_directory(directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Absolute plugins root: `directory` as-is when absolute, otherwise joined
    /// onto the current working directory.
    pub fn resolve_root(&self) -> std::io::Result<PathBuf> {
        let dir = PathBuf::from(&self.directory);
        if dir.is_absolute() {
            Ok(dir)
        } else {
            Ok(std::env::current_dir()?.join(dir))
        }
    }
}
