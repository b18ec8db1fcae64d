//! Plugin runtime for the Horizon host.
//!
//! Plugins are compiled into the host and registered before startup. The
//! runtime drives them through two phases:
//!
//! 1. **Setup**: called synchronously, one plugin at a time, in registration
//!    order, before the host starts. Plugins load their configuration files
//!    here.
//! 2. **Run**: after the host has started, every plugin gets its own task and
//!    a shared [`CancellationToken`]. When the host shuts down it cancels the
//!    token and waits until every plugin has returned.
//!
//! ```no_run
//! use plugin_runtime::{CancellationToken, PluginRegistry, PluginSettings};
//!
//! # async fn host(mut registry: PluginRegistry) -> Result<(), plugin_runtime::PluginError> {
//! let runner = registry.initialize(&PluginSettings::default())?;
//! // ... start the server ...
//! let token = CancellationToken::new();
//! let plugins = runner.start(token.clone());
//! // ... server stops ...
//! token.cancel();
//! plugins.wait().await;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::sync::Arc;

pub use tokio_util::sync::CancellationToken;

pub mod config;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod registry;
pub mod settings;

pub use config::{ConfigEntry, ConfigFile, ConfigFormat};
pub use error::{ConfigError, PluginError};
pub use handle::PluginHandle;
pub use lifecycle::{PluginRunner, PluginShutdown};
pub use registry::{LifecycleState, PluginRegistry};
pub use settings::PluginSettings;

// ============================================================================
// Plugin Trait
// ============================================================================

/// A plugin extends the host with its own behaviour. It is set up before the
/// host starts, so things like configuration files can be created and loaded,
/// and then runs alongside the host until shutdown.
#[async_trait]
pub trait Plugin: Send + 'static {
    /// Name of the plugin. It names the plugin's data folder, so it must be a
    /// valid folder name and must not change while the host is running.
    /// Names are unique per host, compared case-insensitively.
    fn name(&self) -> &str;

    /// First stage of plugin initialization. Called synchronously and in the
    /// order plugins were registered, before the host has started. Returning
    /// an error aborts the startup of the host.
    fn setup(&mut self, handle: &PluginHandle) -> Result<(), PluginError>;

    /// Called once the host has started, in a task of its own. `shutdown` is
    /// cancelled when the host shuts down; wait on
    /// [`CancellationToken::cancelled`] to notice it. Returning from this
    /// function means the plugin has stopped running.
    async fn run(&mut self, shutdown: CancellationToken, handle: Arc<PluginHandle>);
}
