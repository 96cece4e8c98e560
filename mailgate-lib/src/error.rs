use thiserror::Error;

/// Errors that can occur while starting or running the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No private key found in key file")]
    NoPrivateKey,

    #[error("POP3, POP3S, IMAP and IMAPS are all four disabled")]
    NoListeners,

    #[error("Failed to listen on {spec}: {source}")]
    Bind {
        spec: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not create worker: {0}")]
    Spawn(String),

    #[error("Worker launch error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
