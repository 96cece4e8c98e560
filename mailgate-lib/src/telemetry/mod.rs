pub mod logging;

pub use logging::{init_tracing, install_panic_hook, LogHandle};
