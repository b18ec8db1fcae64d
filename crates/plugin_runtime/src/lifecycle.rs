//! Run phase: starting plugin tasks and waiting for them on shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::handle::PluginHandle;
use crate::registry::LifecycleState;
use crate::Plugin;

/// Plugins that finished their setup and wait to be started.
///
/// Returned by [`PluginRegistry::initialize`](crate::PluginRegistry::initialize).
/// [`PluginRunner::start`] consumes it, so the run phase starts at most once.
pub struct PluginRunner {
    plugins: Vec<(Box<dyn Plugin>, Arc<PluginHandle>)>,
    plugins_root: PathBuf,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl PluginRunner {
    pub(crate) fn new(
        plugins: Vec<(Box<dyn Plugin>, Arc<PluginHandle>)>,
        plugins_root: PathBuf,
        state: Arc<watch::Sender<LifecycleState>>,
    ) -> Self {
        Self {
            plugins,
            plugins_root,
            state,
        }
    }

    /// Names of the plugins, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|(_, handle)| handle.name()).collect()
    }

    /// Absolute directory holding every plugin's data folder.
    pub fn plugins_root(&self) -> &Path {
        &self.plugins_root
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Start the run phase: one task per plugin, each receiving a clone of
    /// `shutdown`. Call this after the host has started. Must be called from
    /// within a Tokio runtime.
    ///
    /// A plugin whose `run` returns is considered stopped; it is not restarted.
    pub fn start(self, shutdown: CancellationToken) -> PluginShutdown {
        let PluginRunner { plugins, state, .. } = self;
        state.send_replace(LifecycleState::Running);
        info!("▶️ Starting {} plugin(s)", plugins.len());

        let mut tasks = Vec::with_capacity(plugins.len());
        for (mut plugin, handle) in plugins {
            let name = handle.name().to_string();
            let span = handle.logger().clone();
            let token = shutdown.clone();

            let task = tokio::spawn(
                async move {
                    debug!("Plugin running");
                    plugin.run(token, handle).await;
                    info!("⏹️ Plugin stopped");
                }
                .instrument(span),
            );
            tasks.push((name, task));
        }

        let monitor = {
            let token = shutdown.clone();
            let state = state.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                state.send_if_modified(|current| {
                    if *current == LifecycleState::Running {
                        *current = LifecycleState::ShuttingDown;
                        true
                    } else {
                        false
                    }
                });
            })
        };

        PluginShutdown {
            tasks,
            shutdown,
            state,
            monitor,
        }
    }
}

/// Handle for waiting on running plugins.
///
/// The host cancels the token passed to [`PluginRunner::start`] when it shuts
/// down and then awaits [`PluginShutdown::wait`]. There is no timeout: the wait
/// lasts as long as the slowest plugin takes to return.
pub struct PluginShutdown {
    tasks: Vec<(String, JoinHandle<()>)>,
    shutdown: CancellationToken,
    state: Arc<watch::Sender<LifecycleState>>,
    monitor: JoinHandle<()>,
}

impl PluginShutdown {
    /// Token shared by every plugin task.
    pub fn token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Names of the plugins whose task has not returned yet.
    pub fn running(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Whether every plugin task has returned.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|(_, task)| task.is_finished())
    }

    /// Wait until every plugin task has returned. A task that panicked counts
    /// as stopped and is logged. The state moves to `ShuttingDown` as soon as
    /// the wait begins, even if the token was never cancelled.
    pub async fn wait(self) {
        let PluginShutdown {
            tasks,
            state,
            monitor,
            ..
        } = self;

        state.send_if_modified(|current| {
            if *current == LifecycleState::Running {
                *current = LifecycleState::ShuttingDown;
                true
            } else {
                false
            }
        });
        info!("⏳ Waiting for {} plugin(s) to stop...", tasks.len());
        for (name, task) in tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    error!(plugin = %name, "💥 Plugin panicked while running");
                }
                Err(e) => {
                    warn!(plugin = %name, "Plugin task ended abnormally: {}", e);
                }
            }
        }

        monitor.abort();
        state.send_replace(LifecycleState::Stopped);
        info!("🛑 All plugins stopped");
    }

    /// Cancel the shared token and wait for every plugin to stop.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.wait().await;
    }
}
