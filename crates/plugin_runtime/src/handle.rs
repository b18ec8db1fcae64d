//! Per-plugin state handed to a plugin during setup and run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, Span};

use crate::config::{self, ConfigEntry};
use crate::error::PluginError;

/// Stores information about a registered plugin and gives the plugin access
/// to the host APIs it is allowed to use: its own logger and its sandboxed
/// data folder, including configuration files inside it.
///
/// The host creates one handle per plugin in
/// [`PluginRegistry::initialize`](crate::PluginRegistry::initialize).
#[derive(Debug)]
pub struct PluginHandle {
    name: String,
    span: Span,
    /// Where the plugin's data lives. Read through [`PluginHandle::data_folder`]
    /// so the directory exists before it is used.
    directory: PathBuf,
    directory_created: AtomicBool,
}

impl PluginHandle {
    /// Handle for the plugin `name` with its data folder under `plugins_root`.
    /// Nothing is created on disk until the data folder is first used.
    pub fn new(name: &str, plugins_root: &Path) -> Self {
        Self {
            name: name.to_string(),
            span: tracing::error_span!("plugin", plugin = %name),
            directory: plugins_root.join(name),
            directory_created: AtomicBool::new(false),
        }
    }

    /// Name of the plugin this handle belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Span carrying a `plugin` field with this plugin's name. It is created
    /// at ERROR level so it stays enabled whenever any plugin output is. Setup runs
    /// inside it and the run task is instrumented with it, so plugins rarely
    /// need to enter it by hand; it is exposed for work the plugin spawns itself.
    pub fn logger(&self) -> &Span {
        &self.span
    }

    /// Absolute path of the plugin's data folder, creating it on first use.
    ///
    /// A plugin that cannot get a writable data folder cannot be trusted to
    /// keep working, so a creation failure is logged and then panics. Use
    /// [`PluginHandle::try_data_folder`] to handle the failure instead.
    pub fn data_folder(&self) -> &Path {
        match self.try_data_folder() {
            Ok(path) => path,
            Err(e) => {
                error!(plugin = %self.name, "❌ {}", e);
                panic!("Unable to create data folder for plugin {}: {}", self.name, e);
            }
        }
    }

    /// Like [`PluginHandle::data_folder`] but returns the creation failure.
    pub fn try_data_folder(&self) -> Result<&Path, PluginError> {
        if !self.directory_created.load(Ordering::Acquire) {
            // create_dir_all tolerates an existing directory, so racing callers
            // both succeed and only one of them flips the flag.
            std::fs::create_dir_all(&self.directory).map_err(|source| PluginError::DataFolder {
                path: self.directory.clone(),
                source,
            })?;
            if self
                .directory_created
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                debug!(plugin = %self.name, path = %self.directory.display(), "📁 Data folder ready");
            }
        }
        Ok(&self.directory)
    }

    /// Whether the data folder has been materialized through this handle.
    pub fn is_data_folder_created(&self) -> bool {
        self.directory_created.load(Ordering::Acquire)
    }

    /// Load (creating it first if needed) a single configuration file inside
    /// the data folder.
    pub fn load_config(&self, file: &mut dyn ConfigEntry) -> Result<(), PluginError> {
        config::load(self, file)
    }

    /// Load several configuration files in the order given, stopping at the
    /// first one that fails.
    pub fn load_configs(&self, files: &mut [&mut dyn ConfigEntry]) -> Result<(), PluginError> {
        config::load_all(self, files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn output(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_logger_keeps_plugin_name_at_warn_level() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new("warn"))
            .with(fmt::layer().with_ansi(false).with_writer(move || writer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let root = TempDir::new().unwrap();
            let handle = PluginHandle::new("greeter", root.path());
            let _entered = handle.logger().enter();
            tracing::warn!("something bad");
        });

        let output = captured.output();
        assert!(output.contains("something bad"), "{output}");
        assert!(output.contains("plugin=greeter"), "{output}");
    }

    #[test]
    fn test_data_folder_is_lazy() {
        let root = TempDir::new().unwrap();
        let handle = PluginHandle::new("lazy", root.path());

        assert_eq!(handle.name(), "lazy");
        assert!(!handle.is_data_folder_created());
        assert!(!root.path().join("lazy").exists());

        let folder = handle.data_folder().to_path_buf();
        assert_eq!(folder, root.path().join("lazy"));
        assert!(folder.is_dir());
        assert!(handle.is_data_folder_created());

        // Second call is a plain read.
        assert_eq!(handle.data_folder(), folder.as_path());
    }

    #[test]
    fn test_try_data_folder_reports_failure() {
        let root = TempDir::new().unwrap();
        // A regular file where the plugins root should be makes creation fail.
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let handle = PluginHandle::new("blocked", &blocker);
        let err = handle.try_data_folder().unwrap_err();
        assert!(matches!(err, PluginError::DataFolder { .. }));
        assert!(!handle.is_data_folder_created());
    }

    #[test]
    #[should_panic(expected = "Unable to create data folder for plugin blocked")]
    fn test_data_folder_halts_on_failure() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        PluginHandle::new("blocked", &blocker).data_folder();
    }
}
