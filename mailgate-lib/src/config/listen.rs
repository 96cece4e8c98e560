use serde::{Deserialize, Serialize};

/// How a protocol/security combination is enabled
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnableMode {
    /// Never listen, whatever `listen` says
    #[serde(alias = "false", alias = "off")]
    No,
    /// Listen on `listen` plus the legacy `[server_bind]:port` address
    #[serde(alias = "true", alias = "on")]
    Yes,
    /// Listen on `listen`; plaintext POP3/IMAP fall back to their well-known port
    #[default]
    Auto,
}

/// Per-service listener directives
///
/// ```toml
/// [imaps]
/// enable = "auto"
/// listen = ["*:993", "[::1]:1993"]
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct ServiceListen {
    /// Default: "auto"
    #[serde(default)]
    pub enable: EnableMode,
    /// Legacy port directive, only read when `enable = "yes"`
    /// Default: the service's well-known port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Bind specifications: "host:port", "[addr]:port" or "*:port"
    /// Default: empty
    #[serde(default)]
    pub listen: Vec<String>,
}

impl ServiceListen {
    pub fn disabled() -> Self {
        Self { enable: EnableMode::No, port: None, listen: Vec::new() }
    }

    pub fn on<S: AsRef<str>>(specs: &[S]) -> Self {
        Self {
            enable: EnableMode::Auto,
            port: None,
            listen: specs.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }
}

/// Concurrency model used for sessions
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessModel {
    /// One task per connection inside the gateway process (default)
    #[default]
    Thread,
    /// One child process per connection
    #[serde(alias = "fork")]
    Process,
}

impl ProcessModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessModel::Thread => "thread",
            ProcessModel::Process => "process",
        }
    }
}
