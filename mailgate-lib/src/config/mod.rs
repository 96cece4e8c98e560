mod listen;
mod loader;
mod root;
mod telemetry;
mod timeout;
mod tls;
mod validator;

pub use listen::{EnableMode, ProcessModel, ServiceListen};
pub use loader::{dump_config, load_from_path, parse_config};
pub use root::Config;
pub use telemetry::LoggingConfig;
pub use timeout::TimeoutConfig;
pub use tls::{ClientAuth, TlsConfig, TlsOptions, TlsVersion};
