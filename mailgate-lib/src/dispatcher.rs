use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::context::GatewayContext;
use crate::control::{handle_event, ControlEvent};
use crate::listener::SocketSet;
use crate::worker::{drain_workers, Accepted, DrainOutcome, WorkerSpawner};

/// Summary of a dispatcher run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections handed to workers
    pub accepted: u64,
    pub drain: DrainOutcome,
}

/// Accept loop: waits on every listening socket, hands connections to the
/// spawner and applies control events between waits.
pub struct Dispatcher {
    sockets: SocketSet,
    ctx: Arc<GatewayContext>,
    spawner: Arc<dyn WorkerSpawner>,
    control: mpsc::Receiver<ControlEvent>,
}

impl Dispatcher {
    pub fn new(
        sockets: SocketSet,
        ctx: Arc<GatewayContext>,
        spawner: Arc<dyn WorkerSpawner>,
        control: mpsc::Receiver<ControlEvent>,
    ) -> Self {
        Self { sockets, ctx, spawner, control }
    }

    /// Serve until the quit flag is set, then drain the workers.
    pub async fn run(mut self) -> ShutdownReport {
        let quit = self.ctx.quit_token().clone();
        let mut accepted: u64 = 0;
        let mut control_open = true;
        info!(
            sockets = self.sockets.len(),
            model = self.spawner.model().as_str(),
            "POP3/IMAP Gateway ready"
        );

        while !quit.is_cancelled() {
            let poll = self.ctx.config().timeout.accept_poll();
            tokio::select! {
                biased;
                _ = quit.cancelled() => break,
                event = self.control.recv(), if control_open => match event {
                    Some(event) => handle_event(&self.ctx, self.spawner.as_ref(), event),
                    None => control_open = false,
                },
                ready = timeout(poll, self.sockets.accept()) => match ready {
                    Err(_) => {
                        // Idle wake-up: pick up exited workers even without SIGCHLD.
                        self.spawner.reap();
                    }
                    Ok((service, Err(e))) => {
                        warn!(service = service.name(), error = %e, "Unable to accept {} socket connection.", service.name());
                    }
                    Ok((service, Ok((stream, peer)))) => {
                        if quit.is_cancelled() {
                            debug!(%peer, "shutting down, dropping new connection");
                            break;
                        }
                        let guard = self.ctx.workers().register();
                        let conn = Accepted { stream, peer, service };
                        match self.spawner.spawn(conn, guard) {
                            Ok(()) => {
                                accepted += 1;
                                debug!(%peer, service = service.name(), workers = self.ctx.workers().live(), "connection dispatched");
                            }
                            Err(e) => warn!(%peer, error = %e, "Could not create worker for {} request", service.name()),
                        }
                    }
                },
            }
        }

        info!("POP3/IMAP Gateway will now exit");
        drop(self.sockets);
        self.spawner.terminate_all();
        let timeouts = self.ctx.config().timeout.clone();
        let drain = drain_workers(
            self.ctx.workers(),
            self.spawner.as_ref(),
            timeouts.drain_poll(),
            timeouts.drain_polls,
        )
        .await;
        ShutdownReport { accepted, drain }
    }
}
