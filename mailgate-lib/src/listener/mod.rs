mod bind;
mod plan;

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::Poll;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::tls::TlsContextManager;

pub use bind::{BindHost, BindSpec};
pub use plan::{plan_listeners, without_tls, ListenerSpec, ServiceKind};

/// A listening socket and what it serves
#[derive(Debug)]
pub struct BoundListener {
    pub listener: TcpListener,
    pub spec: ListenerSpec,
    pub local_addr: SocketAddr,
}

/// All sockets the dispatcher waits on
#[derive(Debug, Default)]
pub struct SocketSet {
    listeners: Vec<BoundListener>,
    next: AtomicUsize,
}

impl SocketSet {
    pub fn new(listeners: Vec<BoundListener>) -> Self {
        Self { listeners, next: AtomicUsize::new(0) }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundListener> {
        self.listeners.iter()
    }

    /// Local address of every socket serving `service`
    pub fn local_addrs(&self, service: ServiceKind) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter(|l| l.spec.service == service)
            .map(|l| l.local_addr)
            .collect()
    }

    /// Wait until any socket has a pending connection and accept it.
    ///
    /// Sockets are scanned starting after the last one that produced a
    /// connection. With no sockets this never completes.
    pub async fn accept(&self) -> (ServiceKind, io::Result<(TcpStream, SocketAddr)>) {
        poll_fn(|cx| {
            let count = self.listeners.len();
            let start = self.next.load(Ordering::Relaxed);
            for offset in 0..count {
                let idx = (start + offset) % count;
                let bound = &self.listeners[idx];
                if let Poll::Ready(res) = bound.listener.poll_accept(cx) {
                    self.next.store((idx + 1) % count, Ordering::Relaxed);
                    return Poll::Ready((bound.spec.service, res));
                }
            }
            Poll::Pending
        })
        .await
    }
}

/// Sockets plus the TLS context loaded for them
pub struct ListenerSetup {
    pub sockets: SocketSet,
    pub tls: Option<TlsContextManager>,
}

/// Open every configured listener.
///
/// TLS services are dropped when the TLS context cannot be loaded. Ending up
/// with no listener at all, or failing to bind any one of them, is fatal.
pub async fn build_socket_set(config: &Config) -> Result<ListenerSetup> {
    let mut plan = plan_listeners(config).map_err(GatewayError::Config)?;

    let mut tls = None;
    if plan.iter().any(|s| s.service.tls()) {
        let loaded = match &config.tls {
            Some(tls_cfg) => TlsContextManager::load(tls_cfg),
            None => Err(GatewayError::Tls("no [tls] section configured".into())),
        };
        match loaded {
            Ok(manager) => tls = Some(manager),
            Err(e) => {
                error!(error = %e, "Error loading SSL context, POP3S and IMAPS will be disabled");
                plan = without_tls(plan);
            }
        }
    }

    if plan.is_empty() {
        error!("POP3, POP3S, IMAP and IMAPS are all four disabled");
        return Err(GatewayError::NoListeners);
    }

    let mut listeners = Vec::with_capacity(plan.len());
    for spec in plan {
        let listener = spec.bind.bind().await.map_err(|source| {
            error!(service = spec.service.name(), bind = %spec.bind, error = %source, "Could not listen");
            GatewayError::Bind { spec: format!("{} {}", spec.service.name(), spec.bind), source }
        })?;
        let local_addr = listener.local_addr()?;
        info!(service = spec.service.name(), %local_addr, "Listening");
        listeners.push(BoundListener { listener, spec, local_addr });
    }

    Ok(ListenerSetup { sockets: SocketSet::new(listeners), tls })
}
