use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tracing::debug;

const LISTEN_BACKLOG: i32 = 1024;

/// Host part of a bind specification
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindHost {
    /// Every local address, IPv6 and IPv4 when the system allows it
    Any,
    Addr(IpAddr),
    /// Resolved at bind time
    Name(String),
}

/// One "host:port" listen directive
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindSpec {
    pub host: BindHost,
    pub port: u16,
}

impl BindSpec {
    pub fn any(port: u16) -> Self {
        Self { host: BindHost::Any, port }
    }

    /// Parse "[addr]:port", "host:port" or "*:port".
    ///
    /// "[]:port" and "[*]:port" mean every address. A bare IPv6 address must
    /// be bracketed.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        let (host, port) = if let Some(rest) = spec.strip_prefix('[') {
            let (addr, tail) = rest
                .split_once(']')
                .ok_or_else(|| format!("missing ']' in '{spec}'"))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| format!("missing port in '{spec}'"))?;
            let host = match addr {
                "" | "*" => BindHost::Any,
                a => BindHost::Addr(
                    a.parse::<IpAddr>()
                        .map_err(|e| format!("invalid address '{a}' in '{spec}': {e}"))?,
                ),
            };
            (host, port)
        } else {
            let (host, port) = spec
                .rsplit_once(':')
                .ok_or_else(|| format!("missing port in '{spec}'"))?;
            let host = match host {
                "" | "*" => BindHost::Any,
                h if h.contains(':') => {
                    return Err(format!("IPv6 address in '{spec}' must be enclosed in brackets"))
                }
                h => match h.parse::<IpAddr>() {
                    Ok(ip) => BindHost::Addr(ip),
                    Err(_) => BindHost::Name(h.to_string()),
                },
            };
            (host, port)
        };

        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid port '{port}' in '{spec}'"))?;
        if port == 0 {
            return Err(format!("port must be > 0 in '{spec}'"));
        }
        Ok(Self { host, port })
    }

    /// Create, bind and listen on the socket(s) behind this spec.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        let std_listener = match &self.host {
            BindHost::Any => {
                let v6 = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), self.port);
                match bind_socket(v6, true) {
                    Ok(l) => l,
                    Err(e) => {
                        debug!(error = %e, port = self.port, "dual-stack bind failed, using IPv4 only");
                        bind_socket(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port), false)?
                    }
                }
            }
            BindHost::Addr(ip) => bind_socket(SocketAddr::new(*ip, self.port), false)?,
            BindHost::Name(name) => {
                let mut last_err = None;
                let mut bound = None;
                for addr in tokio::net::lookup_host((name.as_str(), self.port)).await? {
                    match bind_socket(addr, false) {
                        Ok(l) => {
                            bound = Some(l);
                            break;
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                match bound {
                    Some(l) => l,
                    None => {
                        return Err(last_err.unwrap_or_else(|| {
                            io::Error::new(io::ErrorKind::NotFound, format!("{name} did not resolve"))
                        }))
                    }
                }
            }
        };
        TcpListener::from_std(std_listener)
    }
}

impl fmt::Display for BindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            BindHost::Any => write!(f, "*:{}", self.port),
            BindHost::Addr(IpAddr::V6(ip)) => write!(f, "[{ip}]:{}", self.port),
            BindHost::Addr(IpAddr::V4(ip)) => write!(f, "{ip}:{}", self.port),
            BindHost::Name(name) => write!(f, "{name}:{}", self.port),
        }
    }
}

fn bind_socket(addr: SocketAddr, dual_stack: bool) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(!dual_stack)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}
