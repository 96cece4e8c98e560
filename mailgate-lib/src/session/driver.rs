use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::session::channel::{Channel, ReadOutcome};
use crate::session::handler::{CommandOutcome, Farewell, ProtocolHandler};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Greeting,
    AwaitingCommand,
    Continuation,
    Closing,
    Closed,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    HandshakeFailed,
    GreetingFailed,
    Timeout,
    ClientDisconnected,
    NetworkError,
    EndOfSession,
    Shutdown,
}

/// TLS handshake to run before the greeting
#[derive(Clone)]
pub struct TlsStart {
    pub acceptor: TlsAcceptor,
    pub timeout: Duration,
    /// Context generation the acceptor was taken from
    pub generation: u64,
}

pub struct SessionSettings {
    /// Length of one idle tick
    pub tick: Duration,
    /// Advertised host name passed to the greeting
    pub hostname: String,
    pub tls: Option<TlsStart>,
    pub quit: CancellationToken,
}

/// Runs one connection from handshake to close
pub struct SessionDriver<S> {
    channel: Channel<S>,
    handler: Box<dyn ProtocolHandler>,
    settings: SessionSettings,
    state: SessionState,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> SessionDriver<S> {
    pub fn new(channel: Channel<S>, handler: Box<dyn ProtocolHandler>, settings: SessionSettings) -> Self {
        let state = if settings.tls.is_some() {
            SessionState::Handshaking
        } else {
            SessionState::Greeting
        };
        Self { channel, handler, settings, state }
    }

    fn enter(&mut self, next: SessionState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }

    /// Drive the session to completion and release the connection.
    pub async fn run(mut self) -> SessionEnd {
        let end = self.drive().await;

        self.enter(SessionState::Closing);
        self.handler.close(&mut self.channel, false).await;
        self.channel.shutdown().await;
        self.enter(SessionState::Closed);
        debug!(?end, protocol = %self.handler.protocol(), peer = %self.channel.peer(), "session closed");
        end
    }

    async fn drive(&mut self) -> SessionEnd {
        if let Some(tls) = self.settings.tls.take() {
            self.enter(SessionState::Handshaking);
            if let Err(e) = self.channel.enable_tls(&tls.acceptor, tls.timeout).await {
                warn!(error = %e, generation = tls.generation, "TLS handshake failed");
                return SessionEnd::HandshakeFailed;
            }
            debug!(generation = tls.generation, "TLS established");
        }

        self.enter(SessionState::Greeting);
        if let Err(e) = self.handler.send_greeting(&mut self.channel, &self.settings.hostname).await {
            warn!(error = %e, "Unable to send greeting");
            return SessionEnd::GreetingFailed;
        }

        self.enter(SessionState::AwaitingCommand);
        let mut idle_ticks: u32 = 0;
        loop {
            if self.settings.quit.is_cancelled() {
                return SessionEnd::Shutdown;
            }

            let line = match self.channel.read_line(self.settings.tick, &self.settings.quit).await {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Timeout => {
                    idle_ticks = idle_ticks.saturating_add(1);
                    if idle_ticks < self.handler.max_idle_ticks() {
                        continue;
                    }
                    let _ = self.handler.farewell(&mut self.channel, Farewell::Timeout).await;
                    info!(idle_ticks, "Connection closed because of timeout");
                    return SessionEnd::Timeout;
                }
                ReadOutcome::Cancelled => continue,
                ReadOutcome::Closed => {
                    info!(peer = %self.channel.peer(), "Client disconnected");
                    return SessionEnd::ClientDisconnected;
                }
                ReadOutcome::Failed(e) => {
                    warn!(peer = %self.channel.peer(), error = %e, "Failed to read line");
                    return SessionEnd::NetworkError;
                }
            };
            idle_ticks = 0;

            if self.settings.quit.is_cancelled() {
                let _ = self.handler.farewell(&mut self.channel, Farewell::ShuttingDown).await;
                info!("Closing session, gateway is shutting down");
                return SessionEnd::Shutdown;
            }

            if self.handler.in_continuation() {
                self.enter(SessionState::Continuation);
                let outcome = self.handler.dispatch_continuation(&mut self.channel, &line).await;
                if outcome != CommandOutcome::Continue {
                    debug!(?outcome, "continuation finished");
                }
                self.enter(SessionState::AwaitingCommand);
                continue;
            }

            match self.handler.dispatch_command(&mut self.channel, &line).await {
                CommandOutcome::Continue => {}
                CommandOutcome::Failed(reason) => {
                    warn!(%reason, "Failed to execute command");
                }
                CommandOutcome::NetworkError => {
                    warn!("Connection error");
                    return SessionEnd::NetworkError;
                }
                CommandOutcome::EndOfSession => {
                    debug!("Disconnecting client");
                    return SessionEnd::EndOfSession;
                }
            }
        }
    }
}
