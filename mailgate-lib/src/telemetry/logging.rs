use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::{GatewayError, Result};

/// Handle used by the control plane to change the active log level
#[derive(Clone)]
pub struct LogHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Replace the active filter with `level` (any `EnvFilter` directive string)
    pub fn set_level(&self, level: &str) -> Result<()> {
        let filter = EnvFilter::try_new(level)
            .map_err(|e| GatewayError::Config(format!("Invalid log level '{level}': {e}")))?;
        self.inner
            .reload(filter)
            .map_err(|e| GatewayError::Config(format!("Failed to apply log level: {e}")))
    }
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins over the configured level at startup. Later reloads always
/// apply the configured level.
pub fn init_tracing(logging: &LoggingConfig) -> Result<LogHandle> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(logging.show_target)
        .with_writer(std::io::stderr);

    let subscriber = Registry::default().with(filter_layer).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| GatewayError::Config(format!("Failed to set global tracing subscriber: {e}")))?;

    Ok(LogHandle { inner: handle })
}

/// Log a diagnostic record before the process goes down on a panic.
pub fn install_panic_hook(program: &'static str, version: &'static str) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(
            pid = std::process::id(),
            program,
            version,
            %info,
            "fatal error, process is terminating"
        );
        previous(info);
    }));
}
