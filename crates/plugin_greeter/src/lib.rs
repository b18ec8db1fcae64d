use async_trait::async_trait;
use plugin_runtime::{CancellationToken, ConfigFile, Plugin, PluginError, PluginHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// Sample Plugin: Greeter Plugin
// ============================================================================

/// Greeting settings, stored in `greeter.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreeterSettings {
    /// Message logged once the plugin starts running.
    pub greeting: String,
    /// Seconds between announcements. 0 disables them.
    pub announce_interval_secs: u64,
}

impl Default for GreeterSettings {
    fn default() -> Self {
        Self {
            greeting: "Welcome to Horizon!".to_string(),
            announce_interval_secs: 300,
        }
    }
}

/// Announcements cycled through while running, stored in `announcements.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Announcements {
    pub messages: Vec<String>,
}

impl Default for Announcements {
    fn default() -> Self {
        Self {
            messages: vec![
                "Remember to stay hydrated!".to_string(),
                "Found a bug? Tell an admin.".to_string(),
            ],
        }
    }
}

/// A simple plugin that greets on startup and periodically makes announcements
/// until the host shuts down.
pub struct GreeterPlugin {
    settings: GreeterSettings,
    announcements: Announcements,
    announced: u64,
}

impl GreeterPlugin {
    pub fn new() -> Self {
        Self {
            settings: GreeterSettings::default(),
            announcements: Announcements::default(),
            announced: 0,
        }
    }

    pub fn settings(&self) -> &GreeterSettings {
        &self.settings
    }

    pub fn announcements(&self) -> &Announcements {
        &self.announcements
    }

    /// Number of announcements made so far.
    pub fn announced(&self) -> u64 {
        self.announced
    }

    fn announce(&mut self) {
        if self.announcements.messages.is_empty() {
            return;
        }
        let index = (self.announced as usize) % self.announcements.messages.len();
        info!("📢 {}", self.announcements.messages[index]);
        self.announced += 1;
    }
}

impl Default for GreeterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for GreeterPlugin {
    fn name(&self) -> &str {
        "greeter"
    }

    fn setup(&mut self, handle: &PluginHandle) -> Result<(), PluginError> {
        handle.load_configs(&mut [
            &mut ConfigFile::new("greeter.toml", &mut self.settings),
            &mut ConfigFile::new("announcements.yml", &mut self.announcements),
        ])?;

        if self.announcements.messages.is_empty() && self.settings.announce_interval_secs > 0 {
            warn!("Announcements are enabled but no messages are configured");
        }
        info!(
            "👋 Greeter configured with {} announcement(s)",
            self.announcements.messages.len()
        );
        Ok(())
    }

    async fn run(&mut self, shutdown: CancellationToken, _handle: Arc<PluginHandle>) {
        info!("👋 {}", self.settings.greeting);

        if self.settings.announce_interval_secs == 0 {
            shutdown.cancelled().await;
            return;
        }

        let period = Duration::from_secs(self.settings.announce_interval_secs);
        let Some(first) = tokio::time::Instant::now().checked_add(period) else {
            warn!(
                "Announcement interval of {}s is out of range, announcements disabled",
                self.settings.announce_interval_secs
            );
            shutdown.cancelled().await;
            return;
        };
        let mut interval = tokio::time::interval_at(first, period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => self.announce(),
            }
        }
        info!("👋 Greeter made {} announcement(s), goodbye", self.announced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_runtime::{PluginRegistry, PluginSettings};
    use tempfile::TempDir;

    #[test]
    fn test_setup_creates_default_configs() {
        let root = TempDir::new().unwrap();
        let mut registry = PluginRegistry::new();
        registry.register(GreeterPlugin::new());

        registry
            .initialize(&PluginSettings::with_directory(root.path().to_string_lossy()))
            .unwrap();

        let folder = root.path().join("greeter");
        assert!(folder.join("greeter.toml").is_file());
        assert!(folder.join("announcements.yml").is_file());
    }

    #[test]
    fn test_setup_reads_edited_configs() {
        let root = TempDir::new().unwrap();
        let folder = root.path().join("greeter");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(
            folder.join("greeter.toml"),
            "greeting = \"Howdy\"\nannounce_interval_secs = 0\n",
        )
        .unwrap();
        std::fs::write(folder.join("announcements.yml"), "messages: []\n").unwrap();

        let handle = PluginHandle::new("greeter", root.path());
        let mut plugin = GreeterPlugin::new();
        plugin.setup(&handle).unwrap();

        assert_eq!(plugin.settings().greeting, "Howdy");
        assert_eq!(plugin.settings().announce_interval_secs, 0);
        assert!(plugin.announcements().messages.is_empty());

        plugin.announce();
        assert_eq!(plugin.announced(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let root = TempDir::new().unwrap();
        let mut registry = PluginRegistry::new();
        registry.register(GreeterPlugin::new());

        let token = CancellationToken::new();
        let plugins = registry
            .initialize(&PluginSettings::with_directory(root.path().to_string_lossy()))
            .unwrap()
            .start(token.clone());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), plugins.wait())
            .await
            .expect("greeter should stop once cancelled");
    }

    #[tokio::test]
    async fn test_huge_interval_does_not_kill_run() {
        let root = TempDir::new().unwrap();
        let handle = Arc::new(PluginHandle::new("greeter", root.path()));
        let mut plugin = GreeterPlugin::new();
        plugin.settings.announce_interval_secs = u64::MAX;

        let token = CancellationToken::new();
        let run = tokio::spawn(async move {
            plugin.run(token.clone(), handle).await;
            plugin.announced()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!run.is_finished());

        // The task is still waiting on cancellation rather than having panicked.
        run.abort();
        assert!(run.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_huge_interval_stops_on_cancellation() {
        let root = TempDir::new().unwrap();
        let handle = Arc::new(PluginHandle::new("greeter", root.path()));
        let mut plugin = GreeterPlugin::new();
        plugin.settings.announce_interval_secs = u64::MAX;

        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), plugin.run(token, handle))
            .await
            .expect("greeter should stop once cancelled");
        assert_eq!(plugin.announced(), 0);
    }

    #[test]
    fn test_announcements_cycle() {
        let mut plugin = GreeterPlugin::new();
        for _ in 0..5 {
            plugin.announce();
        }
        assert_eq!(plugin.announced(), 5);
    }
}
