use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::config::{Config, EnableMode, ServiceListen};
use crate::listener::bind::{BindHost, BindSpec};
use crate::protocol::ProtocolKind;

/// One protocol/security combination the gateway can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Pop3,
    Pop3s,
    Imap,
    Imaps,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] =
        [ServiceKind::Pop3, ServiceKind::Pop3s, ServiceKind::Imap, ServiceKind::Imaps];

    pub fn protocol(self) -> ProtocolKind {
        match self {
            ServiceKind::Pop3 | ServiceKind::Pop3s => ProtocolKind::Pop3,
            ServiceKind::Imap | ServiceKind::Imaps => ProtocolKind::Imap,
        }
    }

    /// Whether the session starts with a TLS handshake
    pub fn tls(self) -> bool {
        matches!(self, ServiceKind::Pop3s | ServiceKind::Imaps)
    }

    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Pop3 => "POP3",
            ServiceKind::Pop3s => "POP3s",
            ServiceKind::Imap => "IMAP",
            ServiceKind::Imaps => "IMAPs",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            ServiceKind::Pop3 => 110,
            ServiceKind::Pop3s => 995,
            ServiceKind::Imap => 143,
            ServiceKind::Imaps => 993,
        }
    }

    /// Listener used in "auto" mode when no `listen` entry is given
    fn implicit_listen(self) -> Option<BindSpec> {
        match self {
            ServiceKind::Pop3 | ServiceKind::Imap => Some(BindSpec::any(self.default_port())),
            ServiceKind::Pop3s | ServiceKind::Imaps => None,
        }
    }

    fn directives(self, config: &Config) -> &ServiceListen {
        match self {
            ServiceKind::Pop3 => &config.pop3,
            ServiceKind::Pop3s => &config.pop3s,
            ServiceKind::Imap => &config.imap,
            ServiceKind::Imaps => &config.imaps,
        }
    }
}

/// A bind specification tagged with the service it carries
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerSpec {
    pub service: ServiceKind,
    pub bind: BindSpec,
}

/// Resolve the listen, enable and legacy port directives into the set of
/// sockets to open. Duplicates within a service collapse into one entry.
pub fn plan_listeners(config: &Config) -> Result<Vec<ListenerSpec>, String> {
    let mut plan = BTreeSet::new();
    for service in ServiceKind::ALL {
        for bind in service_binds(service, config)? {
            plan.insert(ListenerSpec { service, bind });
        }
    }
    Ok(plan.into_iter().collect())
}

fn service_binds(service: ServiceKind, config: &Config) -> Result<BTreeSet<BindSpec>, String> {
    let directives = service.directives(config);
    let mut binds = BTreeSet::new();
    if directives.enable == EnableMode::No {
        return Ok(binds);
    }
    for spec in &directives.listen {
        binds.insert(BindSpec::parse(spec)?);
    }
    match directives.enable {
        EnableMode::Yes => {
            let port = directives.port.unwrap_or_else(|| service.default_port());
            binds.insert(BindSpec { host: legacy_host(&config.server_bind), port });
        }
        EnableMode::Auto if binds.is_empty() => binds.extend(service.implicit_listen()),
        _ => {}
    }
    Ok(binds)
}

fn legacy_host(server_bind: &str) -> BindHost {
    let trimmed = server_bind.trim().trim_start_matches('[').trim_end_matches(']');
    match trimmed {
        "" | "*" => BindHost::Any,
        other => match other.parse::<IpAddr>() {
            Ok(ip) => BindHost::Addr(ip),
            Err(_) => BindHost::Name(other.to_string()),
        },
    }
}

/// Remove the TLS services from a plan, used when no TLS context could be
/// loaded.
pub fn without_tls(plan: Vec<ListenerSpec>) -> Vec<ListenerSpec> {
    plan.into_iter().filter(|s| !s.service.tls()).collect()
}
