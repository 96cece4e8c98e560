mod signals;

use tracing::{debug, error, info, warn};

use crate::config::load_from_path;
use crate::context::GatewayContext;
use crate::error::{GatewayError, Result};
use crate::worker::WorkerSpawner;

pub use signals::spawn_signal_listener;

/// Requests delivered to the dispatcher's main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Terminate,
    Reload,
    ChildExited,
}

/// What a successful reload changed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReloadReport {
    /// New TLS generation, if the TLS context was rebuilt
    pub tls_generation: Option<u64>,
    /// Why the TLS context was kept, if rebuilding it failed
    pub tls_error: Option<String>,
    pub log_level: Option<String>,
}

/// Apply one control event. Only the dispatcher loop calls this.
pub fn handle_event(ctx: &GatewayContext, spawner: &dyn WorkerSpawner, event: ControlEvent) {
    match event {
        ControlEvent::Terminate => {
            info!("Termination requested");
            ctx.request_shutdown();
        }
        ControlEvent::Reload => {
            let _ = reload(ctx);
        }
        ControlEvent::ChildExited => {
            let reaped = spawner.reap();
            if reaped > 0 {
                debug!(reaped, workers = ctx.workers().live(), "reaped worker processes");
            }
        }
    }
}

/// Re-read the configuration file and apply it.
///
/// A configuration that cannot be loaded leaves everything as it was. A TLS
/// context that cannot be rebuilt keeps the previous generation.
pub fn reload(ctx: &GatewayContext) -> Result<ReloadReport> {
    let Some(path) = ctx.config_path() else {
        warn!("No configuration file to reload");
        return Err(GatewayError::Config("no configuration file to reload".into()));
    };

    let mut next = match load_from_path(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "Unable to reload configuration file, continuing with current settings.");
            return Err(e);
        }
    };

    let current = ctx.config();
    if next.process_model != current.process_model {
        warn!(
            configured = next.process_model.as_str(),
            active = current.process_model.as_str(),
            "process_model only takes effect at startup"
        );
        next.process_model = current.process_model;
    }
    if let Some(host) = ctx.host_override() {
        next.server_socket = host.to_string();
    }

    let mut report = ReloadReport::default();
    if let Some(log) = ctx.log_handle() {
        match log.set_level(&next.logging.level) {
            Ok(()) => report.log_level = Some(next.logging.level.clone()),
            Err(e) => warn!(error = %e, "Keeping the current log level"),
        }
    }

    match (ctx.tls(), &next.tls) {
        (Some(manager), Some(tls_cfg)) => match manager.reload(tls_cfg) {
            Ok(generation) => report.tls_generation = Some(generation),
            Err(e) => {
                error!(error = %e, "Error reloading SSL context");
                report.tls_error = Some(e.to_string());
            }
        },
        (None, Some(_)) => debug!("TLS settings present but no TLS listener is active"),
        _ => {}
    }

    ctx.replace_config(next);
    info!(path = %path.display(), "Configuration reloaded");
    Ok(report)
}
