use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::control::ControlEvent;
use crate::error::{GatewayError, Result};

fn install(kind: SignalKind, name: &str) -> Result<tokio::signal::unix::Signal> {
    signal(kind).map_err(|e| {
        GatewayError::Io(std::io::Error::other(format!("Failed to setup {name} handler: {e}")))
    })
}

/// Translate process signals into control events.
///
/// SIGTERM and SIGINT request termination, SIGHUP a reload and SIGCHLD a
/// reap. The task ends when the receiving side is dropped.
pub fn spawn_signal_listener(tx: mpsc::Sender<ControlEvent>) -> Result<JoinHandle<()>> {
    let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
    let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;
    let mut sighup = install(SignalKind::hangup(), "SIGHUP")?;
    let mut sigchld = install(SignalKind::child(), "SIGCHLD")?;

    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = sigterm.recv() => ControlEvent::Terminate,
                _ = sigint.recv() => ControlEvent::Terminate,
                _ = sighup.recv() => ControlEvent::Reload,
                _ = sigchld.recv() => ControlEvent::ChildExited,
            };
            debug!(?event, "signal received");
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }))
}
