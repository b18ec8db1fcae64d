//! Signal handling for graceful shutdown.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Waits for a termination signal (SIGINT or SIGTERM on Unix, Ctrl+C on
/// Windows) and then cancels `shutdown`. Returns early, without a signal,
/// if `shutdown` is cancelled by someone else first.
pub async fn cancel_on_signal(shutdown: CancellationToken) -> std::io::Result<()> {
    tokio::select! {
        result = wait_for_signal() => {
            result?;
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
    Ok(())
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}
