use async_trait::async_trait;
use tracing::debug;

/// Answer from the credential check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Accepted,
    Rejected,
    /// The backend could not be asked
    Unavailable(String),
}

/// Checks a username/password pair against the message store
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> AuthResult;
}

/// Accepts every login (`bypass_auth`)
#[derive(Debug, Default, Clone, Copy)]
pub struct BypassAuthenticator;

#[async_trait]
impl Authenticator for BypassAuthenticator {
    async fn authenticate(&self, username: &str, _password: &str) -> AuthResult {
        debug!(%username, "authentication bypassed");
        AuthResult::Accepted
    }
}

/// Logs in against the message store at `server_socket`.
///
/// The store session API lives outside the gateway; without a connector
/// every attempt is reported as unavailable.
#[derive(Debug, Clone)]
pub struct StoreAuthenticator {
    server_socket: String,
}

impl StoreAuthenticator {
    pub fn new(server_socket: impl Into<String>) -> Self {
        Self { server_socket: server_socket.into() }
    }
}

#[async_trait]
impl Authenticator for StoreAuthenticator {
    async fn authenticate(&self, username: &str, _password: &str) -> AuthResult {
        debug!(%username, server = %self.server_socket, "no store connector available");
        AuthResult::Unavailable(format!("no store connector for {}", self.server_socket))
    }
}
