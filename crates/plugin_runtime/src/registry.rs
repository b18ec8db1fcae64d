//! Plugin registration and the setup phase.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::PluginError;
use crate::handle::PluginHandle;
use crate::lifecycle::PluginRunner;
use crate::settings::PluginSettings;
use crate::Plugin;

/// Where the plugin subsystem is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Accepting registrations.
    Idle,
    /// Initialization started; plugin names are being validated.
    Initializing,
    /// Plugins are being set up one by one.
    SettingUp,
    /// A plugin failed to set up. Terminal.
    SetupFailed,
    /// Every plugin was set up; waiting for the host to start them.
    Ready,
    /// Plugin tasks are running.
    Running,
    /// Shutdown was requested, or the host started waiting; waiting for plugin
    /// tasks to return.
    ShuttingDown,
    /// Every plugin task returned. Terminal.
    Stopped,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::SetupFailed | LifecycleState::Stopped)
    }
}

/// Ordered collection of the plugins a host runs.
///
/// Registration happens during the host's single-threaded bootstrap. Once
/// [`PluginRegistry::initialize`] has been called the registry is sealed:
/// registering another plugin, or initializing again, is a programming error
/// and panics.
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
    started: AtomicBool,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            plugins: Vec::new(),
            started: AtomicBool::new(false),
            state: Arc::new(state),
        }
    }

    /// Add a plugin to be set up and run by the host.
    ///
    /// # Panics
    ///
    /// Panics if the registry has already been initialized.
    pub fn register<P: Plugin>(&mut self, plugin: P) {
        self.register_boxed(Box::new(plugin));
    }

    /// Same as [`PluginRegistry::register`] for an already boxed plugin.
    pub fn register_boxed(&mut self, plugin: Box<dyn Plugin>) {
        if self.started.load(Ordering::Acquire) {
            panic!(
                "Attempted to add plugin '{}' after plugins have already been loaded.",
                plugin.name()
            );
        }
        debug!("Registered plugin '{}'", plugin.name());
        self.plugins.push(plugin);
    }

    /// Number of plugins registered and not yet handed to a runner.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Names of the registered plugins, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    /// Whether [`PluginRegistry::initialize`] has been called.
    pub fn is_initialized(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver that observes every later state change, including the ones
    /// made by the runner and shutdown handle.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Set up every registered plugin and return the runner that starts them.
    ///
    /// Plugin names are validated first. Then each plugin, in registration
    /// order, gets its handle (logger and data folder under the plugins root
    /// from `settings`) and its `setup` is called. The first failing setup
    /// stops the process: later plugins are not set up, and the error names
    /// the plugin that failed. Nothing already set up is rolled back.
    ///
    /// Each plugin's logger span is a child of the span that is current when
    /// this is called.
    ///
    /// # Panics
    ///
    /// Panics when called more than once, or when two plugins share a name
    /// (case-insensitively) or a name is not a usable folder name.
    pub fn initialize(&mut self, settings: &PluginSettings) -> Result<PluginRunner, PluginError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("Attempting to load plugins twice.");
        }
        self.state.send_replace(LifecycleState::Initializing);

        info!("🔌 Loading {} plugin(s)...", self.plugins.len());
        validate_names(&self.plugins);
        self.state.send_replace(LifecycleState::SettingUp);

        let root = match settings.resolve_root() {
            Ok(root) => root,
            Err(source) => {
                self.state.send_replace(LifecycleState::SetupFailed);
                return Err(PluginError::PluginsRoot {
                    path: settings.directory.clone().into(),
                    source,
                });
            }
        };

        let plugins = std::mem::take(&mut self.plugins);
        let mut ready = Vec::with_capacity(plugins.len());
        for mut plugin in plugins {
            let handle = PluginHandle::new(plugin.name(), &root);
            let result = {
                let _entered = handle.logger().enter();
                debug!("⚙️ Setting up plugin");
                plugin.setup(&handle)
            };

            if let Err(e) = result {
                error!(plugin = %handle.name(), "❌ Plugin setup failed: {}", e);
                self.state.send_replace(LifecycleState::SetupFailed);
                return Err(PluginError::SetupFailed {
                    plugin: handle.name().to_string(),
                    source: Box::new(e),
                });
            }
            ready.push((plugin, Arc::new(handle)));
        }

        info!(
            "✅ {} plugin(s) set up from {}",
            ready.len(),
            root.display()
        );
        self.state.send_replace(LifecycleState::Ready);
        Ok(PluginRunner::new(ready, root, self.state.clone()))
    }
}

/// Make sure every plugin name is a usable folder name and that no two
/// plugins would share a data folder.
fn validate_names(plugins: &[Box<dyn Plugin>]) {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(plugins.len());
    for plugin in plugins {
        let name = plugin.name();
        if !is_valid_folder_name(name) {
            error!("Plugin name '{}' is not a valid folder name", name);
            panic!("Plugin name '{name}' is not a valid folder name.");
        }
        if let Some(existing) = seen.insert(name.to_lowercase(), name) {
            error!("Found multiple plugins with the same name '{}'", name);
            panic!("Found multiple plugins with the same name '{name}' (already registered as '{existing}').");
        }
    }
}

fn is_valid_folder_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(part)), None) if part == name
    ) && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CancellationToken;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn setup(&mut self, _handle: &PluginHandle) -> Result<(), PluginError> {
            Ok(())
        }

        async fn run(&mut self, _shutdown: CancellationToken, _handle: Arc<PluginHandle>) {}
    }

    #[test]
    fn test_valid_folder_names() {
        for name in ["greeter", "My Plugin", "plugin-1.2", "ünïcode"] {
            assert!(is_valid_folder_name(name), "{name} should be valid");
        }
        for name in ["", ".", "..", "a/b", "a\\b", "/abs"] {
            assert!(!is_valid_folder_name(name), "{name} should be invalid");
        }
    }

    #[test]
    fn test_registration_keeps_order() {
        let mut registry = PluginRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.state(), LifecycleState::Idle);

        registry.register(Named("first"));
        registry.register_boxed(Box::new(Named("second")));
        registry.register(Named("third"));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["first", "second", "third"]);
        assert!(!registry.is_initialized());
    }

    #[test]
    #[should_panic(expected = "Found multiple plugins with the same name 'Greeter'")]
    fn test_duplicate_names_ignore_case() {
        validate_names(&[Box::new(Named("greeter")), Box::new(Named("Greeter"))]);
    }

    #[test]
    #[should_panic(expected = "is not a valid folder name")]
    fn test_invalid_name_is_rejected() {
        validate_names(&[Box::new(Named("../escape"))]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(LifecycleState::SetupFailed.is_terminal());
        assert!(LifecycleState::Stopped.is_terminal());
        assert!(!LifecycleState::Running.is_terminal());
        assert!(!LifecycleState::Idle.is_terminal());
    }
}
