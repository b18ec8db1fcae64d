//! Plugin configuration files.
//!
//! A plugin declares its configuration files as [`ConfigFile`]s; loading one
//! creates the file inside the plugin's data folder when it does not exist yet
//! (from explicit default content, or by encoding the target's current value)
//! and then always decodes the file back into the target. Paths are confined
//! to the data folder and the extension picks the format.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ConfigError, FormatError, PluginError};
use crate::handle::PluginHandle;

// ============================================================================
// Formats
// ============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigFormat {
    /// `.json`. Decoding is relaxed: comments and trailing commas are accepted.
    Json,
    /// `.toml`
    Toml,
    /// `.yml` / `.yaml`
    Yaml,
}

impl ConfigFormat {
    pub const ALL: [ConfigFormat; 3] = [ConfigFormat::Json, ConfigFormat::Toml, ConfigFormat::Yaml];

    /// File extensions (without the dot) recognized for this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ConfigFormat::Json => &["json"],
            ConfigFormat::Toml => &["toml"],
            ConfigFormat::Yaml => &["yml", "yaml"],
        }
    }

    /// Format for an extension, compared case-insensitively.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extensions().contains(&extension.as_str()))
    }

    /// Format of a config file path, based on its extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_extension(&extension).ok_or_else(|| ConfigError::UnknownFormat {
            path: path.to_path_buf(),
            extension: if extension.is_empty() {
                extension
            } else {
                format!(".{extension}")
            },
        })
    }

    /// Serialize a value in this format.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, FormatError> {
        let bytes = match self {
            ConfigFormat::Json => serde_json::to_vec_pretty(value)?,
            ConfigFormat::Toml => toml::to_string_pretty(value)?.into_bytes(),
            ConfigFormat::Yaml => serde_yaml::to_string(value)?.into_bytes(),
        };
        Ok(bytes)
    }

    /// Deserialize a value from bytes in this format.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, FormatError> {
        let value = match self {
            ConfigFormat::Json => json5::from_str(std::str::from_utf8(bytes)?)?,
            ConfigFormat::Toml => toml::from_str(std::str::from_utf8(bytes)?)?,
            ConfigFormat::Yaml => serde_yaml::from_slice(bytes)?,
        };
        Ok(value)
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigFormat::Json => "JSON",
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
        })
    }
}

// ============================================================================
// Config File Declarations
// ============================================================================

/// A configuration file declared by a plugin.
///
/// `path` is relative to the plugin's data folder: for a plugin named `foo`
/// that wants `./plugins/foo/bar.json`, the path is `bar.json`. The decoded
/// file replaces `*value`; use `#[serde(default)]` on the target type to keep
/// defaults for keys missing from the file.
///
/// This is meant for configuration only. Files a plugin rewrites while
/// running should be managed by the plugin itself.
pub struct ConfigFile<'a, T> {
    path: PathBuf,
    default: Option<String>,
    value: &'a mut T,
}

impl<'a, T> ConfigFile<'a, T> {
    pub fn new(path: impl Into<PathBuf>, value: &'a mut T) -> Self {
        Self {
            path: path.into(),
            default: None,
            value,
        }
    }

    /// Content written verbatim when the file does not exist yet, instead of
    /// the encoded current value. It is decoded into the value like any
    /// existing file.
    pub fn with_default(mut self, content: impl Into<String>) -> Self {
        self.default = Some(content.into());
        self
    }
}

/// Type-erased view of a [`ConfigFile`], so files decoding into different
/// types can be loaded together.
pub trait ConfigEntry {
    /// Path relative to the plugin's data folder.
    fn path(&self) -> &Path;

    /// Explicit initial content, if any. Empty content counts as none.
    fn default_content(&self) -> Option<&str>;

    /// Encode the target's current value.
    fn encode_value(&self, format: ConfigFormat) -> Result<Vec<u8>, FormatError>;

    /// Decode `bytes` and store the result in the target.
    fn decode_value(&mut self, format: ConfigFormat, bytes: &[u8]) -> Result<(), FormatError>;
}

impl<T> ConfigEntry for ConfigFile<'_, T>
where
    T: Serialize + DeserializeOwned,
{
    fn path(&self) -> &Path {
        &self.path
    }

    fn default_content(&self) -> Option<&str> {
        self.default.as_deref().filter(|content| !content.is_empty())
    }

    fn encode_value(&self, format: ConfigFormat) -> Result<Vec<u8>, FormatError> {
        format.encode(&*self.value)
    }

    fn decode_value(&mut self, format: ConfigFormat, bytes: &[u8]) -> Result<(), FormatError> {
        *self.value = format.decode(bytes)?;
        Ok(())
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Resolve `relative` lexically and make sure it stays strictly inside the
/// data folder. Returns the normalized relative path.
pub(crate) fn sandboxed_path(relative: &Path) -> Result<PathBuf, ConfigError> {
    if relative.is_absolute() || relative.has_root() {
        return Err(ConfigError::AbsolutePath {
            path: relative.to_path_buf(),
        });
    }

    let outside = || ConfigError::OutsideDataFolder {
        path: relative.to_path_buf(),
    };

    let mut inside = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => inside.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !inside.pop() {
                    return Err(outside());
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ConfigError::AbsolutePath {
                    path: relative.to_path_buf(),
                })
            }
        }
    }

    // Resolving to the data folder itself names a directory, not a file.
    if inside.as_os_str().is_empty() {
        return Err(outside());
    }
    Ok(inside)
}

/// Create (if missing) and decode a single config file of `handle`'s plugin.
pub fn load(handle: &PluginHandle, config: &mut dyn ConfigEntry) -> Result<(), PluginError> {
    let relative = sandboxed_path(config.path())?;
    let format = ConfigFormat::from_path(&relative)?;
    let path = handle.try_data_folder()?.join(&relative);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDirectory {
            path: path.clone(),
            source,
        })?;
    }

    let data = match std::fs::read(&path) {
        Ok(data) => {
            debug!(path = %path.display(), %format, "📄 Loading existing config");
            data
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let data = match config.default_content() {
                Some(content) => content.as_bytes().to_vec(),
                None => config
                    .encode_value(format)
                    .map_err(|source| ConfigError::Encode {
                        path: path.clone(),
                        format,
                        source,
                    })?,
            };
            std::fs::write(&path, &data).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), %format, "📝 Created default config");
            data
        }
        Err(source) => {
            return Err(ConfigError::Read { path, source }.into());
        }
    };

    config
        .decode_value(format, &data)
        .map_err(|source| ConfigError::Decode { path, format, source })?;
    Ok(())
}

/// Load each config in order, halting on (and returning) the first error.
pub fn load_all(handle: &PluginHandle, configs: &mut [&mut dyn ConfigEntry]) -> Result<(), PluginError> {
    for config in configs.iter_mut() {
        load(handle, &mut **config)?;
    }
    Ok(())
}
