use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::protocol::sasl::decode_plain;
use crate::protocol::{AuthResult, Authenticator, FailureBudget, HandlerSettings, ProtocolKind};
use crate::session::{CommandOutcome, Farewell, ProtocolHandler, ResponseSink};

const MAILBOX_COMMANDS: &[&str] = &[
    "SELECT", "EXAMINE", "CREATE", "DELETE", "RENAME", "SUBSCRIBE", "UNSUBSCRIBE", "LIST", "LSUB",
    "STATUS", "APPEND", "CHECK", "CLOSE", "EXPUNGE", "SEARCH", "FETCH", "STORE", "COPY", "MOVE",
    "UID", "IDLE", "NAMESPACE", "GETQUOTAROOT", "GETQUOTA", "GETACL", "ENABLE", "UNSELECT", "ID",
];

/// IMAP4rev1 pre-mailbox session state (RFC 3501)
pub struct ImapHandler {
    settings: HandlerSettings,
    auth: Arc<dyn Authenticator>,
    failures: FailureBudget,
    logged_in: Option<String>,
    /// Tag of an AUTHENTICATE PLAIN waiting for its response
    pending_tag: Option<String>,
}

impl ImapHandler {
    pub fn new(settings: HandlerSettings, auth: Arc<dyn Authenticator>) -> Self {
        let failures = FailureBudget::new(settings.max_fail_commands);
        Self { settings, auth, failures, logged_in: None, pending_tag: None }
    }

    pub fn logged_in_user(&self) -> Option<&str> {
        self.logged_in.as_deref()
    }

    fn capability(&self) -> String {
        let mut caps = String::from("IMAP4rev1 LITERAL+ ID ENABLE IDLE NAMESPACE");
        if self.logged_in.is_none() {
            if self.settings.plaintext_allowed() {
                caps.push_str(" AUTH=PLAIN SASL-IR");
            } else {
                caps.push_str(" LOGINDISABLED");
            }
        }
        caps
    }

    async fn command(&mut self, out: &mut dyn ResponseSink, line: &str) -> io::Result<CommandOutcome> {
        let line = line.trim_end();
        let Some((tag, rest)) = line.split_once(' ') else {
            if line.is_empty() {
                return self.fail(out, "* BAD Empty command line").await;
            }
            return self.fail(out, &format!("{line} BAD Missing command")).await;
        };
        if !valid_tag(tag) {
            return self.fail(out, "* BAD Invalid tag").await;
        }
        let (verb, args) = match rest.split_once(' ') {
            Some((verb, args)) => (verb, args.trim()),
            None => (rest.trim(), ""),
        };
        let verb = verb.to_ascii_uppercase();

        match verb.as_str() {
            "CAPABILITY" => {
                out.write_line(&format!("* CAPABILITY {}", self.capability())).await?;
                out.write_line(&format!("{tag} OK CAPABILITY completed")).await?;
                Ok(CommandOutcome::Continue)
            }
            "NOOP" => {
                out.write_line(&format!("{tag} OK NOOP completed")).await?;
                Ok(CommandOutcome::Continue)
            }
            "LOGOUT" => {
                out.write_line("* BYE mailgate IMAP gateway signing off").await?;
                out.write_line(&format!("{tag} OK LOGOUT completed")).await?;
                Ok(CommandOutcome::EndOfSession)
            }
            "LOGIN" => self.login_command(out, tag, args).await,
            "AUTHENTICATE" => self.authenticate(out, tag, args).await,
            v if MAILBOX_COMMANDS.contains(&v) => {
                if self.logged_in.is_none() {
                    return self
                        .fail(out, &format!("{tag} BAD Command not valid in non-authenticated state"))
                        .await;
                }
                out.write_line(&format!("{tag} NO [UNAVAILABLE] Mailbox access is not available"))
                    .await?;
                Ok(CommandOutcome::Continue)
            }
            _ => self.fail(out, &format!("{tag} BAD Command not recognized")).await,
        }
    }

    async fn login_command(&mut self, out: &mut dyn ResponseSink, tag: &str, args: &str) -> io::Result<CommandOutcome> {
        if self.logged_in.is_some() {
            return self.fail(out, &format!("{tag} BAD Already authenticated")).await;
        }
        if !self.settings.plaintext_allowed() {
            return self
                .fail(out, &format!("{tag} NO [PRIVACYREQUIRED] Plaintext authentication disallowed on non-secure connections"))
                .await;
        }
        let Some([user, password]) = parse_astrings(args).and_then(|v| <[String; 2]>::try_from(v).ok()) else {
            return self.fail(out, &format!("{tag} BAD Invalid arguments")).await;
        };
        self.login(out, tag, user, &password, "LOGIN").await
    }

    async fn authenticate(&mut self, out: &mut dyn ResponseSink, tag: &str, args: &str) -> io::Result<CommandOutcome> {
        if self.logged_in.is_some() {
            return self.fail(out, &format!("{tag} BAD Already authenticated")).await;
        }
        if !self.settings.plaintext_allowed() {
            return self
                .fail(out, &format!("{tag} NO [PRIVACYREQUIRED] Plaintext authentication disallowed on non-secure connections"))
                .await;
        }
        let (mechanism, initial) = match args.split_once(' ') {
            Some((m, rest)) => (m, Some(rest.trim())),
            None => (args, None),
        };
        if mechanism.is_empty() {
            return self.fail(out, &format!("{tag} BAD Missing authentication mechanism")).await;
        }
        if !mechanism.eq_ignore_ascii_case("PLAIN") {
            return self.fail(out, &format!("{tag} NO Unsupported authentication mechanism")).await;
        }
        match initial {
            Some("=") => self.plain(out, tag, "").await,
            Some(response) => self.plain(out, tag, response).await,
            None => {
                self.pending_tag = Some(tag.to_string());
                out.write_line("+ ").await?;
                Ok(CommandOutcome::Continue)
            }
        }
    }

    async fn plain(&mut self, out: &mut dyn ResponseSink, tag: &str, response: &str) -> io::Result<CommandOutcome> {
        match decode_plain(response) {
            Ok(creds) => self.login(out, tag, creds.username, &creds.password, "AUTHENTICATE").await,
            Err(e) => {
                debug!(?e, "invalid AUTHENTICATE PLAIN response");
                self.fail(out, &format!("{tag} BAD Invalid SASL response")).await
            }
        }
    }

    async fn login(
        &mut self,
        out: &mut dyn ResponseSink,
        tag: &str,
        user: String,
        password: &str,
        command: &str,
    ) -> io::Result<CommandOutcome> {
        match self.auth.authenticate(&user, password).await {
            AuthResult::Accepted => {
                info!(%user, "IMAP login");
                self.logged_in = Some(user);
                out.write_line(&format!("{tag} OK [CAPABILITY {}] {command} completed", self.capability()))
                    .await?;
                Ok(CommandOutcome::Continue)
            }
            AuthResult::Rejected => {
                warn!(%user, "Failed to login");
                self.fail(out, &format!("{tag} NO [AUTHENTICATIONFAILED] Authentication failed")).await
            }
            AuthResult::Unavailable(reason) => {
                warn!(%user, %reason, "Authentication backend unavailable");
                out.write_line(&format!("{tag} NO [UNAVAILABLE] Authentication service unavailable"))
                    .await?;
                Ok(CommandOutcome::Failed(reason))
            }
        }
    }

    /// Send an error reply and charge it against the failure budget.
    async fn fail(&mut self, out: &mut dyn ResponseSink, reply: &str) -> io::Result<CommandOutcome> {
        out.write_line(reply).await?;
        if self.failures.strike() {
            out.write_line("* BYE Too many invalid commands").await?;
            return Ok(CommandOutcome::EndOfSession);
        }
        Ok(CommandOutcome::Continue)
    }
}

fn valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .bytes()
            .all(|b| b.is_ascii_graphic() && !matches!(b, b'(' | b')' | b'{' | b'*' | b'%' | b'"' | b'\\' | b'+'))
}

/// Split IMAP astrings: atoms and quoted strings. Literals are not accepted.
pub fn parse_astrings(input: &str) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.peek() == Some(&' ') {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            return Some(out);
        };
        let mut word = String::new();
        match first {
            '"' => {
                chars.next();
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => word.push(chars.next()?),
                        c => word.push(c),
                    }
                }
                if !matches!(chars.peek(), None | Some(' ')) {
                    return None;
                }
            }
            '{' => return None,
            _ => {
                while let Some(&c) = chars.peek() {
                    if c == ' ' {
                        break;
                    }
                    if matches!(c, '"' | '(' | ')' | '{') {
                        return None;
                    }
                    word.push(c);
                    chars.next();
                }
            }
        }
        out.push(word);
    }
}

fn network(result: io::Result<CommandOutcome>) -> CommandOutcome {
    result.unwrap_or_else(|e| {
        debug!(error = %e, "write failed");
        CommandOutcome::NetworkError
    })
}

#[async_trait]
impl ProtocolHandler for ImapHandler {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Imap
    }

    fn max_idle_ticks(&self) -> u32 {
        self.settings.max_idle_ticks
    }

    fn in_continuation(&self) -> bool {
        self.pending_tag.is_some()
    }

    async fn send_greeting(&mut self, out: &mut dyn ResponseSink, hostname: &str) -> io::Result<()> {
        let suffix = self.settings.greeting_suffix(hostname);
        out.write_line(&format!("* OK [CAPABILITY {}] mailgate IMAP gateway ready{suffix}", self.capability()))
            .await
    }

    async fn dispatch_command(&mut self, out: &mut dyn ResponseSink, line: &str) -> CommandOutcome {
        network(self.command(out, line).await)
    }

    async fn dispatch_continuation(&mut self, out: &mut dyn ResponseSink, line: &str) -> CommandOutcome {
        let Some(tag) = self.pending_tag.take() else {
            return network(self.command(out, line).await);
        };
        if line.trim() == "*" {
            return network(self.fail(out, &format!("{tag} BAD Authentication aborted")).await);
        }
        network(self.plain(out, &tag, line).await)
    }

    async fn farewell(&mut self, out: &mut dyn ResponseSink, reason: Farewell) -> io::Result<()> {
        match reason {
            Farewell::Timeout => out.write_line("* BYE Connection closed because of timeout").await,
            Farewell::ShuttingDown => out.write_line("* BYE server shutting down").await,
        }
    }

    async fn close(&mut self, out: &mut dyn ResponseSink, send_error: bool) {
        if send_error {
            let _ = out.write_line("* BYE Connection error").await;
        }
        self.pending_tag = None;
        if let Some(user) = self.logged_in.take() {
            debug!(%user, "IMAP session released");
        }
    }
}
