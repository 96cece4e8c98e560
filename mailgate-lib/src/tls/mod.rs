pub mod acceptor;
pub mod cipher_suites;
pub mod context;

pub use acceptor::{build_acceptor, TlsMaterial};
pub use cipher_suites::{resolve_cipher_suites, supported_cipher_suites};
pub use context::{TlsContextManager, TlsGeneration};
