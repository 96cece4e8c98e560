use serde::{Deserialize, Serialize};

use super::listen::{ProcessModel, ServiceListen};
use super::telemetry::LoggingConfig;
use super::timeout::TimeoutConfig;
use super::tls::TlsConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// Concurrency model: "thread" or "process"
    /// Only read at startup
    /// Default: "thread"
    #[serde(default)]
    pub process_model: ProcessModel,
    /// Legacy bind address used with `enable = "yes"` and the `port` directive
    /// Default: empty (all addresses)
    #[serde(default)]
    pub server_bind: String,
    /// Location of the backend message store
    /// Default: "http://localhost:236/"
    #[serde(default = "default_server_socket")]
    pub server_socket: String,
    /// Host name advertised in greetings
    /// Default: empty (use the system host name)
    #[serde(default)]
    pub server_hostname: String,
    /// Append " on <hostname>" to protocol greetings
    /// Default: false
    #[serde(default)]
    pub server_hostname_greeting: bool,
    /// Accept any credentials without asking the store
    /// Default: false
    #[serde(default)]
    pub bypass_auth: bool,
    /// Refuse cleartext credentials on sessions without TLS
    /// Default: false
    #[serde(default)]
    pub disable_plaintext_auth: bool,
    /// Failed commands after which a session is disconnected
    /// Default: 10
    #[serde(default = "default_max_fail_commands")]
    pub max_fail_commands: u32,
    /// POP3 listeners
    #[serde(default)]
    pub pop3: ServiceListen,
    /// POP3 over TLS listeners
    #[serde(default)]
    pub pop3s: ServiceListen,
    /// IMAP listeners
    #[serde(default)]
    pub imap: ServiceListen,
    /// IMAP over TLS listeners
    #[serde(default)]
    pub imaps: ServiceListen,
    /// TLS material for POP3S and IMAPS (optional)
    /// Without it, TLS listeners are dropped at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Timeout configuration
    #[serde(default)]
    pub timeout: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            process_model: ProcessModel::default(),
            server_bind: String::new(),
            server_socket: default_server_socket(),
            server_hostname: String::new(),
            server_hostname_greeting: false,
            bypass_auth: false,
            disable_plaintext_auth: false,
            max_fail_commands: default_max_fail_commands(),
            pop3: ServiceListen::default(),
            pop3s: ServiceListen::default(),
            imap: ServiceListen::default(),
            imaps: ServiceListen::default(),
            tls: None,
            logging: LoggingConfig::default(),
            timeout: TimeoutConfig::default(),
        }
    }
}

fn default_server_socket() -> String {
    "http://localhost:236/".to_string()
}

fn default_max_fail_commands() -> u32 {
    10
}
