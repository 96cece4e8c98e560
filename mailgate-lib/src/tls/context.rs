use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::config::TlsConfig;
use crate::error::Result;
use crate::tls::acceptor::{build_acceptor, TlsMaterial};

/// One loaded TLS context.
///
/// Sessions keep the generation they started with, so a reload never
/// changes the settings of an established connection.
pub struct TlsGeneration {
    pub id: u64,
    pub acceptor: TlsAcceptor,
    pub material: TlsMaterial,
}

/// Process-wide TLS context, replaceable at runtime
pub struct TlsContextManager {
    current: ArcSwap<TlsGeneration>,
    next_id: AtomicU64,
}

impl TlsContextManager {
    /// Read the configured files and build the first generation.
    pub fn load(cfg: &TlsConfig) -> Result<Self> {
        Self::from_material(TlsMaterial::read(cfg)?)
    }

    /// Build the first generation from material handed over by the parent.
    pub fn from_material(material: TlsMaterial) -> Result<Self> {
        let acceptor = build_acceptor(&material)?;
        let first = TlsGeneration { id: 1, acceptor, material };
        Ok(Self { current: ArcSwap::from_pointee(first), next_id: AtomicU64::new(2) })
    }

    /// Build a new generation from `cfg` and make it current.
    ///
    /// On failure the current generation stays in place.
    pub fn reload(&self, cfg: &TlsConfig) -> Result<u64> {
        let material = TlsMaterial::read(cfg)?;
        let acceptor = build_acceptor(&material)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.current.store(Arc::new(TlsGeneration { id, acceptor, material }));
        info!(generation = id, "Reloaded SSL context");
        Ok(id)
    }

    pub fn current(&self) -> Arc<TlsGeneration> {
        self.current.load_full()
    }
}
