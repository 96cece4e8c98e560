use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::time::timeout;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

/// Underlying byte stream of a session, before or after the TLS upgrade
pub enum Transport<S> {
    Plain(S),
    Tls(Box<TlsStream<S>>),
    Closed,
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for Transport<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Transport::Closed => Poll::Ready(Ok(())),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for Transport<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, data),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, data),
            Transport::Closed => Poll::Ready(Err(io::ErrorKind::BrokenPipe.into())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Transport::Closed => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Transport::Closed => Poll::Ready(Ok(())),
        }
    }
}

/// Result of one bounded wait for an input line
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete line, without the trailing CRLF
    Line(String),
    /// Nothing complete arrived within the tick
    Timeout,
    /// The peer closed the connection
    Closed,
    /// Socket error, or a line longer than the configured maximum
    Failed(io::Error),
    /// The wait was interrupted by the shutdown flag
    Cancelled,
}

/// Where protocol handlers write their responses
#[async_trait]
pub trait ResponseSink: Send {
    async fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// Line-oriented connection to one client
pub struct Channel<S> {
    io: BufReader<Transport<S>>,
    pending: Vec<u8>,
    peer: String,
    max_line: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Channel<S> {
    pub fn new(stream: S, peer: impl Into<String>, max_line: usize) -> Self {
        Self {
            io: BufReader::new(Transport::Plain(stream)),
            pending: Vec::new(),
            peer: peer.into(),
            max_line,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Run the server side of the TLS handshake on the plain stream.
    ///
    /// On failure the channel is left closed.
    pub async fn enable_tls(&mut self, acceptor: &TlsAcceptor, limit: Duration) -> io::Result<()> {
        let stream = match std::mem::replace(self.io.get_mut(), Transport::Closed) {
            Transport::Plain(stream) => stream,
            other => {
                *self.io.get_mut() = other;
                return Err(io::Error::other("TLS already negotiated"));
            }
        };
        match timeout(limit, acceptor.accept(stream)).await {
            Ok(Ok(tls)) => {
                *self.io.get_mut() = Transport::Tls(Box::new(tls));
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out")),
        }
    }

    /// Wait up to `tick` for a complete line.
    ///
    /// Bytes of an incomplete line are kept for the next call.
    pub async fn read_line(&mut self, tick: Duration, quit: &CancellationToken) -> ReadOutcome {
        let limit = self.max_line;
        let result = tokio::select! {
            biased;
            _ = quit.cancelled() => return ReadOutcome::Cancelled,
            res = timeout(tick, read_bounded(&mut self.io, &mut self.pending, limit)) => res,
        };

        match result {
            Err(_) => ReadOutcome::Timeout,
            Ok(Err(e)) => ReadOutcome::Failed(e),
            Ok(Ok(0)) => ReadOutcome::Closed,
            Ok(Ok(_)) => {
                if !self.pending.ends_with(b"\n") && self.pending.len() > limit {
                    self.pending.clear();
                    return ReadOutcome::Failed(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("line exceeds {limit} bytes"),
                    ));
                }
                let raw = std::mem::take(&mut self.pending);
                ReadOutcome::Line(decode_line(&raw))
            }
        }
    }

    pub async fn shutdown(&mut self) {
        let _ = self.io.get_mut().shutdown().await;
        *self.io.get_mut() = Transport::Closed;
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> ResponseSink for Channel<S> {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let transport = self.io.get_mut();
        transport.write_all(format!("{line}\r\n").as_bytes()).await?;
        transport.flush().await
    }
}

async fn read_bounded<R>(reader: &mut R, pending: &mut Vec<u8>, limit: usize) -> io::Result<usize>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let room = limit.saturating_add(1).saturating_sub(pending.len()).max(1) as u64;
    reader.take(room).read_until(b'\n', pending).await
}

fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
