pub mod channel;
pub mod driver;
pub mod handler;

pub use channel::{Channel, ReadOutcome, ResponseSink, Transport};
pub use driver::{SessionDriver, SessionEnd, SessionSettings, SessionState, TlsStart};
pub use handler::{CommandOutcome, Farewell, HandlerFactory, ProtocolHandler, SessionInfo};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info_span, warn, Instrument};

use crate::context::GatewayContext;
use crate::listener::ServiceKind;

/// Run one accepted connection as a session of `service`.
///
/// Configuration and TLS generation are captured once here; later reloads do
/// not affect this session.
pub async fn run_session<S>(ctx: &GatewayContext, stream: S, peer: String, service: ServiceKind) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let span = info_span!("session", %peer, service = service.name());
    async move {
        let config = ctx.config();
        let tls = if service.tls() {
            match ctx.tls() {
                Some(manager) => {
                    let generation = manager.current();
                    Some(TlsStart {
                        acceptor: generation.acceptor.clone(),
                        timeout: config.timeout.tls_handshake(),
                        generation: generation.id,
                    })
                }
                None => {
                    warn!("No TLS context available for a TLS service");
                    return SessionEnd::HandshakeFailed;
                }
            }
        } else {
            None
        };

        let info = SessionInfo { protocol: service.protocol(), tls: service.tls(), peer: peer.clone() };
        let handler = ctx.handlers().create(&info, &config);
        let channel = Channel::new(stream, peer, config.timeout.max_line_bytes);
        let settings = SessionSettings {
            tick: config.timeout.tick(),
            hostname: ctx.hostname().to_string(),
            tls,
            quit: ctx.quit_token().clone(),
        };
        SessionDriver::new(channel, handler, settings).run().await
    }
    .instrument(span)
    .await
}
