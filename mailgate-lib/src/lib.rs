// All FFI is confined to `sys`, which opts back in.
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod listener;
pub mod protocol;
pub mod session;
pub mod sys;
pub mod telemetry;
pub mod tls;
pub mod worker;

pub use config::{dump_config, load_from_path, Config, ProcessModel, TlsConfig};
pub use context::GatewayContext;
pub use control::{ControlEvent, ReloadReport};
pub use dispatcher::{Dispatcher, ShutdownReport};
pub use error::{GatewayError, Result};
pub use gateway::{run, RunOptions};
pub use listener::{build_socket_set, ServiceKind, SocketSet};
pub use session::{run_session, SessionEnd};
pub use tls::TlsContextManager;
pub use worker::{run_worker, DrainOutcome, WorkerLaunch};
