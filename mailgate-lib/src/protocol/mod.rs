pub mod auth;
pub mod imap;
pub mod pop3;
pub mod sasl;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::session::{HandlerFactory, ProtocolHandler, SessionInfo};

pub use auth::{AuthResult, Authenticator, BypassAuthenticator, StoreAuthenticator};
pub use imap::ImapHandler;
pub use pop3::Pop3Handler;

/// Mail access protocol spoken on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Pop3,
    Imap,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtocolKind::Pop3 => "POP3",
            ProtocolKind::Imap => "IMAP",
        })
    }
}

/// Per-session settings both handlers read from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    pub tls: bool,
    pub max_idle_ticks: u32,
    /// 0 disables the limit
    pub max_fail_commands: u32,
    pub disable_plaintext_auth: bool,
    pub hostname_greeting: bool,
}

impl HandlerSettings {
    pub fn for_session(info: &SessionInfo, config: &Config) -> Self {
        let max_idle_ticks = match info.protocol {
            ProtocolKind::Pop3 => config.timeout.pop3_idle_ticks,
            ProtocolKind::Imap => config.timeout.imap_idle_ticks,
        };
        Self {
            tls: info.tls,
            max_idle_ticks,
            max_fail_commands: config.max_fail_commands,
            disable_plaintext_auth: config.disable_plaintext_auth,
            hostname_greeting: config.server_hostname_greeting,
        }
    }

    /// Whether cleartext credentials may be sent on this session
    pub fn plaintext_allowed(&self) -> bool {
        self.tls || !self.disable_plaintext_auth
    }

    pub(crate) fn greeting_suffix(&self, hostname: &str) -> String {
        if self.hostname_greeting && !hostname.is_empty() {
            format!(" on {hostname}")
        } else {
            String::new()
        }
    }
}

/// Counts failed commands against `max_fail_commands`
#[derive(Debug, Clone, Copy)]
pub(crate) struct FailureBudget {
    used: u32,
    max: u32,
}

impl FailureBudget {
    pub(crate) fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    /// Record one failure; true once the budget is spent
    pub(crate) fn strike(&mut self) -> bool {
        self.used = self.used.saturating_add(1);
        self.max != 0 && self.used >= self.max
    }
}

/// Default handler factory: POP3 or IMAP with the configured authenticator
#[derive(Debug, Default, Clone, Copy)]
pub struct GatewayHandlers;

impl HandlerFactory for GatewayHandlers {
    fn create(&self, info: &SessionInfo, config: &Config) -> Box<dyn ProtocolHandler> {
        let auth: Arc<dyn Authenticator> = if config.bypass_auth {
            Arc::new(BypassAuthenticator)
        } else {
            Arc::new(StoreAuthenticator::new(config.server_socket.clone()))
        };
        let settings = HandlerSettings::for_session(info, config);
        match info.protocol {
            ProtocolKind::Pop3 => Box::new(Pop3Handler::new(settings, auth)),
            ProtocolKind::Imap => Box::new(ImapHandler::new(settings, auth)),
        }
    }
}
