use std::io::Read;
use std::net::SocketAddr;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UnixStream};
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{Config, ProcessModel};
use crate::context::GatewayContext;
use crate::error::{GatewayError, Result};
use crate::listener::ServiceKind;
use crate::session::{run_session, SessionEnd};
use crate::sys;
use crate::tls::{TlsContextManager, TlsMaterial};
use crate::worker::{Accepted, WorkerGuard, WorkerSpawner};

/// Everything a worker process needs besides the connection on its stdin.
///
/// Sent as one JSON document over a socket the child finds at
/// [`sys::LAUNCH_FD`]; the parent closes its end after writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerLaunch {
    pub config: Config,
    pub service: ServiceKind,
    pub peer: String,
    pub hostname: String,
    /// Material of the TLS generation current at accept time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsMaterial>,
}

impl WorkerLaunch {
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| GatewayError::Worker(format!("Failed to encode launch envelope: {e}")))
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| GatewayError::Worker(format!("Invalid launch envelope: {e}")))
    }

    /// Read the envelope the gateway wrote to this process.
    pub fn receive() -> Result<Self> {
        let fd = sys::take_inherited_fd(sys::LAUNCH_FD).map_err(|e| {
            GatewayError::Worker(format!(
                "No launch channel on fd {} ({e}); the worker mode is started by the gateway",
                sys::LAUNCH_FD
            ))
        })?;
        let mut raw = String::new();
        StdUnixStream::from(fd)
            .read_to_string(&mut raw)
            .map_err(|e| GatewayError::Worker(format!("Unable to read launch envelope: {e}")))?;
        Self::decode(&raw)
    }
}

struct ChildEntry {
    child: Child,
    pid: u32,
    peer: SocketAddr,
    _guard: WorkerGuard,
}

/// Runs each session in a re-executed copy of the gateway binary.
///
/// The connection becomes the child's stdin. The parent keeps the listening
/// sockets, which are close-on-exec and never reach the child.
pub struct ProcessSpawner {
    ctx: Arc<GatewayContext>,
    exe: PathBuf,
    children: Mutex<Vec<ChildEntry>>,
}

impl ProcessSpawner {
    pub fn new(ctx: Arc<GatewayContext>) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| GatewayError::Spawn(format!("Cannot locate the gateway executable: {e}")))?;
        Ok(Self::with_executable(ctx, exe))
    }

    pub fn with_executable(ctx: Arc<GatewayContext>, exe: impl Into<PathBuf>) -> Self {
        Self { ctx, exe: exe.into(), children: Mutex::new(Vec::new()) }
    }

    pub fn live_children(&self) -> usize {
        self.children.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn launch(&self, conn: &Accepted) -> WorkerLaunch {
        WorkerLaunch {
            config: (*self.ctx.config()).clone(),
            service: conn.service,
            peer: conn.peer.to_string(),
            hostname: self.ctx.hostname().to_string(),
            tls: if conn.service.tls() {
                self.ctx.tls().map(|m| m.current().material.clone())
            } else {
                None
            },
        }
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn model(&self) -> ProcessModel {
        ProcessModel::Process
    }

    fn spawn(&self, conn: Accepted, guard: WorkerGuard) -> Result<()> {
        let envelope = self.launch(&conn).encode()?;
        let Accepted { stream, peer, service } = conn;
        let fd: OwnedFd = stream.into_std()?.into();
        let (launch_tx, launch_rx) = StdUnixStream::pair()?;

        let mut command = Command::new(&self.exe);
        command.arg("worker").stdin(Stdio::from(fd)).stdout(Stdio::null()).stderr(Stdio::inherit());
        sys::inherit_fd(&mut command, launch_rx.as_raw_fd(), sys::LAUNCH_FD);
        let child = command
            .spawn()
            .map_err(|e| GatewayError::Spawn(format!("Could not create {} process: {e}", service.name())))?;
        drop(launch_rx);

        let Some(pid) = child.id() else {
            return Err(GatewayError::Spawn("worker exited before it was tracked".into()));
        };
        launch_tx.set_nonblocking(true)?;
        let launch_tx = UnixStream::from_std(launch_tx)?;
        tokio::spawn(async move {
            if let Err(e) = send_envelope(launch_tx, envelope).await {
                warn!(pid, error = %e, "Unable to hand the launch envelope to the worker");
            }
        });
        info!(pid, %peer, "Starting worker process for {} request", service.name());
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ChildEntry { child, pid, peer, _guard: guard });
        Ok(())
    }

    fn reap(&self) -> usize {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        let before = children.len();
        children.retain_mut(|entry| match entry.child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = entry.pid, peer = %entry.peer, %status, "worker process exited");
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(pid = entry.pid, error = %e, "Unable to query worker process, forgetting it");
                false
            }
        });
        before - children.len()
    }

    fn terminate_all(&self) {
        let children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        for entry in children.iter() {
            if let Err(e) = sys::send_terminate(entry.pid) {
                debug!(pid = entry.pid, error = %e, "Unable to signal worker process");
            }
        }
    }
}

async fn send_envelope(mut tx: UnixStream, envelope: String) -> std::io::Result<()> {
    tx.write_all(envelope.as_bytes()).await?;
    tx.shutdown().await
}

/// Entry point of a worker process: serve the session on stdin and return.
pub async fn run_worker(launch: WorkerLaunch) -> Result<SessionEnd> {
    let fd = std::io::stdin().as_fd().try_clone_to_owned()?;
    let std_stream = std::net::TcpStream::from(fd);
    std_stream.set_nonblocking(true)?;
    let stream = TcpStream::from_std(std_stream)?;

    let tls = match launch.tls {
        Some(material) => Some(TlsContextManager::from_material(material)?),
        None => None,
    };
    let ctx = GatewayContext::new(launch.config).with_tls(tls).with_hostname(launch.hostname);

    let quit = ctx.quit_token().clone();
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut hup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = term.recv() => break,
                _ = int.recv() => break,
                _ = hup.recv() => debug!("worker ignores reload requests"),
            }
        }
        quit.cancel();
    });

    let span = info_span!("worker", pid = std::process::id());
    Ok(run_session(&ctx, stream, launch.peer, launch.service).instrument(span).await)
}
