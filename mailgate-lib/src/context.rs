use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::protocol::GatewayHandlers;
use crate::session::HandlerFactory;
use crate::sys;
use crate::telemetry::LogHandle;
use crate::tls::TlsContextManager;
use crate::worker::WorkerCounter;

/// Process-wide state shared by the dispatcher, the control plane and every
/// session.
pub struct GatewayContext {
    quit: CancellationToken,
    config: ArcSwap<Config>,
    config_path: Option<PathBuf>,
    host_override: Option<String>,
    tls: Option<TlsContextManager>,
    workers: Arc<WorkerCounter>,
    log: Option<LogHandle>,
    hostname: String,
    handlers: Arc<dyn HandlerFactory>,
}

impl GatewayContext {
    pub fn new(config: Config) -> Self {
        let hostname = advertised_hostname(&config);
        Self {
            quit: CancellationToken::new(),
            config: ArcSwap::from_pointee(config),
            config_path: None,
            host_override: None,
            tls: None,
            workers: Arc::new(WorkerCounter::new()),
            log: None,
            hostname,
            handlers: Arc::new(GatewayHandlers),
        }
    }

    /// File re-read on reload
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Store location given on the command line, kept across reloads
    pub fn with_host_override(mut self, host: Option<String>) -> Self {
        self.host_override = host;
        self
    }

    pub fn with_tls(mut self, tls: Option<TlsContextManager>) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_log_handle(mut self, log: Option<LogHandle>) -> Self {
        self.log = log;
        self
    }

    pub fn with_handlers(mut self, handlers: Arc<dyn HandlerFactory>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Snapshot of the configuration currently in force
    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    pub fn replace_config(&self, config: Config) {
        self.config.store(Arc::new(config));
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn host_override(&self) -> Option<&str> {
        self.host_override.as_deref()
    }

    pub fn tls(&self) -> Option<&TlsContextManager> {
        self.tls.as_ref()
    }

    pub fn workers(&self) -> &Arc<WorkerCounter> {
        &self.workers
    }

    pub fn log_handle(&self) -> Option<&LogHandle> {
        self.log.as_ref()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn handlers(&self) -> &Arc<dyn HandlerFactory> {
        &self.handlers
    }

    pub fn quit_token(&self) -> &CancellationToken {
        &self.quit
    }

    pub fn is_quitting(&self) -> bool {
        self.quit.is_cancelled()
    }

    pub fn request_shutdown(&self) {
        self.quit.cancel();
    }
}

/// Host name shown to clients: the configured one, else the system's.
pub fn advertised_hostname(config: &Config) -> String {
    let configured = config.server_hostname.trim();
    if !configured.is_empty() {
        return configured.to_string();
    }
    sys::hostname().unwrap_or_else(|| "localhost".to_string())
}
