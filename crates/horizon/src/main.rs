//! Main entry point for the Horizon plugin host
//!
//! Loads the host configuration, sets up logging, drives the compiled-in
//! plugins through setup and run, and shuts them down in order on exit.

mod cli;
mod config;
mod signals;

use anyhow::{Context, Result};
use plugin_runtime::{PluginRegistry, PluginRunner};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::CliArgs;
use config::{AppConfig, LoggingSettings};

// ============================================================================
// Logging Setup
// ============================================================================

/// Initialize logging system
fn setup_logging(config: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(fmt::layer().json().with_target(false).with_thread_names(true))
            .try_init()
            .context("failed to install JSON log subscriber")?;
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(false).with_thread_names(true))
            .try_init()
            .context("failed to install log subscriber")?;
    }

    info!("🔧 Logging initialized with level: {}", config.level);
    Ok(())
}

// ============================================================================
// Plugins
// ============================================================================

/// Registers every plugin compiled into this host, in setup order.
fn register_plugins(registry: &mut PluginRegistry) {
    registry.register(plugin_greeter::GreeterPlugin::new());
}

// ============================================================================
// Application
// ============================================================================

/// The host: plugins are set up when it is created and run while it runs.
pub struct Application {
    config: AppConfig,
    registry: PluginRegistry,
    runner: PluginRunner,
}

impl Application {
    /// Load configuration, set up logging and run the setup phase of every
    /// plugin. A plugin that fails to set up aborts the startup.
    pub async fn new(args: CliArgs) -> Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        config.apply_overrides(&args);
        if let Err(e) = config.validate() {
            anyhow::bail!("Configuration validation failed: {}", e);
        }

        setup_logging(&config.logging)?;

        info!("🚀 {} starting", config.server.name);
        info!(
            "📂 Config: {} | Plugins: {}",
            args.config_path.display(),
            config.plugins.directory
        );

        let mut registry = PluginRegistry::new();
        register_plugins(&mut registry);

        let runner = registry
            .initialize(&config.plugins)
            .context("Error loading plugins")?;

        Ok(Self {
            config,
            registry,
            runner,
        })
    }

    /// Start the plugins, wait for a shutdown signal, then stop every plugin
    /// before returning.
    pub async fn run(self) -> Result<()> {
        let Application {
            config,
            registry,
            runner,
        } = self;

        let shutdown = CancellationToken::new();
        let plugins = runner.start(shutdown.clone());
        info!(
            "✅ {} is now running with {} plugin(s) ({:?})",
            config.server.name,
            plugins.running().len(),
            registry.state()
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        signals::cancel_on_signal(shutdown.clone())
            .await
            .context("failed to listen for shutdown signals")?;

        info!("🛑 Shutdown signal received, stopping plugins...");
        plugins.shutdown().await;

        info!("👋 {} shutdown complete ({:?})", config.server.name, registry.state());
        Ok(())
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start: {:?}", e);
            eprintln!("❌ Failed to start: {:?}", e);
            std::process::exit(1);
        }
    }
}
