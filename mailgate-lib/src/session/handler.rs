use async_trait::async_trait;
use std::io;

use crate::config::Config;
use crate::protocol::ProtocolKind;
use crate::session::channel::ResponseSink;

/// What the driver should do after a command was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    /// The client asked to leave (QUIT, LOGOUT) or was disconnected by the
    /// handler
    EndOfSession,
    /// Writing the response failed
    NetworkError,
    /// Handler-side failure; the session keeps going
    Failed(String),
}

/// Why the driver is closing a session that is still healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Farewell {
    Timeout,
    ShuttingDown,
}

/// Protocol-specific half of a session.
///
/// The driver owns the connection and the loop; the handler owns the grammar
/// and the per-session protocol state.
#[async_trait]
pub trait ProtocolHandler: Send {
    fn protocol(&self) -> ProtocolKind;

    /// Idle ticks after which the session is closed
    fn max_idle_ticks(&self) -> u32;

    /// Whether the next line belongs to a command still in progress
    fn in_continuation(&self) -> bool;

    async fn send_greeting(&mut self, out: &mut dyn ResponseSink, hostname: &str) -> io::Result<()>;

    async fn dispatch_command(&mut self, out: &mut dyn ResponseSink, line: &str) -> CommandOutcome;

    async fn dispatch_continuation(&mut self, out: &mut dyn ResponseSink, line: &str) -> CommandOutcome;

    async fn farewell(&mut self, out: &mut dyn ResponseSink, reason: Farewell) -> io::Result<()>;

    /// Orderly close. `send_error` asks for an error line to the client
    /// before the connection is dropped.
    async fn close(&mut self, out: &mut dyn ResponseSink, send_error: bool);
}

/// Facts about a session a handler is created for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub protocol: ProtocolKind,
    pub tls: bool,
    pub peer: String,
}

/// Creates one handler per accepted connection
pub trait HandlerFactory: Send + Sync {
    fn create(&self, info: &SessionInfo, config: &Config) -> Box<dyn ProtocolHandler>;
}
