//! Error types for the plugin runtime.
//!
//! Misuse of the registry itself (registering late, initializing twice,
//! clashing plugin names) is not represented here: those are programming
//! errors and abort with a panic. Everything in this module is a runtime
//! condition that is handed back to the caller.

use std::path::PathBuf;

use crate::config::ConfigFormat;

/// Boxed error produced by one of the format libraries.
pub type FormatError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while setting up plugins.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// A plugin's `setup` returned an error. Carries the plugin name so the
    /// host can report which plugin stopped the startup.
    #[error("could not set up plugin '{plugin}': {source}")]
    SetupFailed {
        plugin: String,
        #[source]
        source: Box<PluginError>,
    },
    /// The plugin's data folder could not be created.
    #[error("unable to create data folder '{}': {source}", path.display())]
    DataFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The plugins root could not be resolved against the working directory.
    #[error("unable to resolve plugins directory '{}': {source}", path.display())]
    PluginsRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Loading one of the plugin's configuration files failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Free-form failure reported by a plugin's own setup logic.
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
}

/// Errors raised while creating, reading or decoding a plugin config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("plugin config file paths should not be absolute: '{}'", path.display())]
    AbsolutePath { path: PathBuf },

    #[error("plugin config file '{}' is outside of the plugin data folder", path.display())]
    OutsideDataFolder { path: PathBuf },

    #[error("unknown config file extension '{extension}' for '{}'", path.display())]
    UnknownFormat { path: PathBuf, extension: String },

    #[error("could not create directory for config file '{}': {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write config '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode default {format} config '{}': {source}", path.display())]
    Encode {
        path: PathBuf,
        format: ConfigFormat,
        #[source]
        source: FormatError,
    },

    #[error("could not decode {format} config '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        format: ConfigFormat,
        #[source]
        source: FormatError,
    },
}

impl ConfigError {
    /// Path of the config file the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            ConfigError::AbsolutePath { path }
            | ConfigError::OutsideDataFolder { path }
            | ConfigError::UnknownFormat { path, .. }
            | ConfigError::CreateDirectory { path, .. }
            | ConfigError::Read { path, .. }
            | ConfigError::Write { path, .. }
            | ConfigError::Encode { path, .. }
            | ConfigError::Decode { path, .. } => path,
        }
    }
}
