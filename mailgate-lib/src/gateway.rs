use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Config, ProcessModel};
use crate::context::GatewayContext;
use crate::control::spawn_signal_listener;
use crate::dispatcher::{Dispatcher, ShutdownReport};
use crate::error::Result;
use crate::listener::build_socket_set;
use crate::sys::{raise_fd_limit, DESIRED_FILEDES};
use crate::telemetry::LogHandle;
use crate::worker::{ProcessSpawner, TaskSpawner, WorkerSpawner};

/// Startup parameters that do not come from the configuration file
#[derive(Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    /// `--host` value, re-applied after every reload
    pub host_override: Option<String>,
    pub log: Option<LogHandle>,
}

/// Bind the listeners and serve until a termination request.
pub async fn run(config: Config, options: RunOptions) -> Result<ShutdownReport> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        model = config.process_model.as_str(),
        "Starting mailgate POP3/IMAP gateway"
    );
    if config.bypass_auth {
        warn!("WARNING: Authentication is bypassed. Any login is accepted without a password check.");
    }

    let setup = build_socket_set(&config).await?;

    if let Err((e, current)) = raise_fd_limit(DESIRED_FILEDES) {
        warn!(
            error = %e,
            current,
            desired = DESIRED_FILEDES,
            "Unable to raise the open file descriptor limit; fewer concurrent sessions are possible"
        );
    }

    let model = config.process_model;
    let mut ctx = GatewayContext::new(config)
        .with_tls(setup.tls)
        .with_host_override(options.host_override)
        .with_log_handle(options.log);
    if let Some(path) = options.config_path {
        ctx = ctx.with_config_path(path);
    }
    let ctx = Arc::new(ctx);

    let (tx, rx) = mpsc::channel(16);
    let signals = spawn_signal_listener(tx)?;

    let spawner: Arc<dyn WorkerSpawner> = match model {
        ProcessModel::Thread => Arc::new(TaskSpawner::new(Arc::clone(&ctx))),
        ProcessModel::Process => Arc::new(ProcessSpawner::new(Arc::clone(&ctx))?),
    };

    let report = Dispatcher::new(setup.sockets, Arc::clone(&ctx), spawner, rx).run().await;
    signals.abort();
    info!(accepted = report.accepted, drain = ?report.drain, "Gateway stopped");
    Ok(report)
}
