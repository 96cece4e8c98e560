use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::protocol::sasl::decode_plain;
use crate::protocol::{AuthResult, Authenticator, FailureBudget, HandlerSettings, ProtocolKind};
use crate::session::{CommandOutcome, Farewell, ProtocolHandler, ResponseSink};

const MAILBOX_COMMANDS: &[&str] = &["STAT", "LIST", "RETR", "DELE", "RSET", "TOP", "UIDL", "LAST"];

/// POP3 session state (RFC 1939, RFC 5034)
pub struct Pop3Handler {
    settings: HandlerSettings,
    auth: Arc<dyn Authenticator>,
    failures: FailureBudget,
    /// Name given with USER, waiting for PASS
    user: Option<String>,
    /// Authenticated user
    logged_in: Option<String>,
    /// AUTH PLAIN sent without an initial response
    awaiting_plain: bool,
}

impl Pop3Handler {
    pub fn new(settings: HandlerSettings, auth: Arc<dyn Authenticator>) -> Self {
        let failures = FailureBudget::new(settings.max_fail_commands);
        Self { settings, auth, failures, user: None, logged_in: None, awaiting_plain: false }
    }

    pub fn logged_in_user(&self) -> Option<&str> {
        self.logged_in.as_deref()
    }

    async fn command(&mut self, out: &mut dyn ResponseSink, line: &str) -> io::Result<CommandOutcome> {
        let (verb, args) = match line.split_once(' ') {
            Some((verb, args)) => (verb, args.trim()),
            None => (line.trim(), ""),
        };
        let verb = verb.to_ascii_uppercase();

        match verb.as_str() {
            "CAPA" => {
                out.write_line("+OK Capability list follows").await?;
                for cap in self.capabilities() {
                    out.write_line(cap).await?;
                }
                out.write_line(".").await?;
                Ok(CommandOutcome::Continue)
            }
            "NOOP" => {
                out.write_line("+OK").await?;
                Ok(CommandOutcome::Continue)
            }
            "QUIT" => {
                out.write_line("+OK Signing off").await?;
                Ok(CommandOutcome::EndOfSession)
            }
            "USER" => self.user(out, args).await,
            "PASS" => self.pass(out, args).await,
            "AUTH" => self.auth(out, args).await,
            v if MAILBOX_COMMANDS.contains(&v) => {
                if self.logged_in.is_none() {
                    return self.fail(out, "-ERR Not authenticated").await;
                }
                out.write_line("-ERR [SYS/TEMP] Mailbox access is not available").await?;
                Ok(CommandOutcome::Continue)
            }
            _ => self.fail(out, "-ERR Invalid command").await,
        }
    }

    fn capabilities(&self) -> Vec<&'static str> {
        let mut caps = vec!["TOP", "UIDL", "RESP-CODES", "AUTH-RESP-CODE", "PIPELINING"];
        if self.logged_in.is_none() && self.settings.plaintext_allowed() {
            caps.push("USER");
            caps.push("SASL PLAIN");
        }
        caps
    }

    async fn user(&mut self, out: &mut dyn ResponseSink, args: &str) -> io::Result<CommandOutcome> {
        if self.logged_in.is_some() {
            return self.fail(out, "-ERR Already authenticated").await;
        }
        if !self.settings.plaintext_allowed() {
            return self.fail(out, "-ERR [AUTH] Plaintext authentication disallowed on non-secure connections").await;
        }
        if args.is_empty() {
            return self.fail(out, "-ERR Missing username").await;
        }
        self.user = Some(args.to_string());
        out.write_line("+OK Waiting for password").await?;
        Ok(CommandOutcome::Continue)
    }

    async fn pass(&mut self, out: &mut dyn ResponseSink, args: &str) -> io::Result<CommandOutcome> {
        if self.logged_in.is_some() {
            return self.fail(out, "-ERR Already authenticated").await;
        }
        let Some(user) = self.user.take() else {
            return self.fail(out, "-ERR Give username first").await;
        };
        self.login(out, user, args).await
    }

    async fn auth(&mut self, out: &mut dyn ResponseSink, args: &str) -> io::Result<CommandOutcome> {
        if args.is_empty() {
            out.write_line("+OK").await?;
            out.write_line("PLAIN").await?;
            out.write_line(".").await?;
            return Ok(CommandOutcome::Continue);
        }
        if self.logged_in.is_some() {
            return self.fail(out, "-ERR Already authenticated").await;
        }
        if !self.settings.plaintext_allowed() {
            return self.fail(out, "-ERR [AUTH] Plaintext authentication disallowed on non-secure connections").await;
        }
        let (mechanism, initial) = match args.split_once(' ') {
            Some((m, rest)) => (m, Some(rest.trim())),
            None => (args, None),
        };
        if !mechanism.eq_ignore_ascii_case("PLAIN") {
            return self.fail(out, "-ERR Unsupported authentication mechanism").await;
        }
        match initial {
            // "=" is an empty initial response
            Some("=") => self.plain(out, "").await,
            Some(response) => self.plain(out, response).await,
            None => {
                self.awaiting_plain = true;
                out.write_line("+ ").await?;
                Ok(CommandOutcome::Continue)
            }
        }
    }

    async fn plain(&mut self, out: &mut dyn ResponseSink, response: &str) -> io::Result<CommandOutcome> {
        match decode_plain(response) {
            Ok(creds) => self.login(out, creds.username, &creds.password).await,
            Err(e) => {
                debug!(?e, "invalid AUTH PLAIN response");
                self.fail(out, "-ERR [AUTH] Invalid AUTH PLAIN response").await
            }
        }
    }

    async fn login(&mut self, out: &mut dyn ResponseSink, user: String, password: &str) -> io::Result<CommandOutcome> {
        match self.auth.authenticate(&user, password).await {
            AuthResult::Accepted => {
                info!(%user, "POP3 login");
                self.logged_in = Some(user);
                out.write_line("+OK Logged in").await?;
                Ok(CommandOutcome::Continue)
            }
            AuthResult::Rejected => {
                warn!(%user, "Failed to login");
                self.fail(out, "-ERR [AUTH] Wrong username or password").await
            }
            AuthResult::Unavailable(reason) => {
                warn!(%user, %reason, "Authentication backend unavailable");
                out.write_line("-ERR [SYS/TEMP] Authentication service unavailable").await?;
                Ok(CommandOutcome::Failed(reason))
            }
        }
    }

    /// Send an error reply and charge it against the failure budget.
    async fn fail(&mut self, out: &mut dyn ResponseSink, reply: &str) -> io::Result<CommandOutcome> {
        out.write_line(reply).await?;
        if self.failures.strike() {
            out.write_line("-ERR Too many invalid commands").await?;
            return Ok(CommandOutcome::EndOfSession);
        }
        Ok(CommandOutcome::Continue)
    }
}

fn network(result: io::Result<CommandOutcome>) -> CommandOutcome {
    result.unwrap_or_else(|e| {
        debug!(error = %e, "write failed");
        CommandOutcome::NetworkError
    })
}

#[async_trait]
impl ProtocolHandler for Pop3Handler {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Pop3
    }

    fn max_idle_ticks(&self) -> u32 {
        self.settings.max_idle_ticks
    }

    fn in_continuation(&self) -> bool {
        self.awaiting_plain
    }

    async fn send_greeting(&mut self, out: &mut dyn ResponseSink, hostname: &str) -> io::Result<()> {
        let suffix = self.settings.greeting_suffix(hostname);
        out.write_line(&format!("+OK mailgate POP3 gateway ready{suffix}")).await
    }

    async fn dispatch_command(&mut self, out: &mut dyn ResponseSink, line: &str) -> CommandOutcome {
        network(self.command(out, line).await)
    }

    async fn dispatch_continuation(&mut self, out: &mut dyn ResponseSink, line: &str) -> CommandOutcome {
        self.awaiting_plain = false;
        if line.trim() == "*" {
            return network(self.fail(out, "-ERR Authentication aborted").await);
        }
        network(self.plain(out, line).await)
    }

    async fn farewell(&mut self, out: &mut dyn ResponseSink, reason: Farewell) -> io::Result<()> {
        match reason {
            Farewell::Timeout => out.write_line("-ERR Connection closed because of timeout").await,
            Farewell::ShuttingDown => out.write_line("-ERR Server shutting down").await,
        }
    }

    async fn close(&mut self, out: &mut dyn ResponseSink, send_error: bool) {
        if send_error {
            let _ = out.write_line("-ERR Connection error").await;
        }
        self.user = None;
        self.awaiting_plain = false;
        if let Some(user) = self.logged_in.take() {
            debug!(%user, "POP3 session released");
        }
    }
}
