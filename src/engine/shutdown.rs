// src/engine/shutdown.rs

//! OS signal handling for the service runner.
//!
//! On Unix any of `SIGINT`, `SIGTERM` or `SIGQUIT` ends the wait; elsewhere
//! only Ctrl-C does.

/// Resolves once the process is asked to terminate.
///
/// Fails only if the signal listeners cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
