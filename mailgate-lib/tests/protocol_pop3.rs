mod helpers;

use std::sync::Arc;

use async_trait::async_trait;
use helpers::{alice, BrokenSink, MemorySink};
use mailgate_lib::protocol::{AuthResult, Authenticator, HandlerSettings, Pop3Handler};
use mailgate_lib::session::{CommandOutcome, Farewell, ProtocolHandler};

fn settings() -> HandlerSettings {
    HandlerSettings {
        tls: false,
        max_idle_ticks: 5,
        max_fail_commands: 10,
        disable_plaintext_auth: false,
        hostname_greeting: false,
    }
}

async fn run(handler: &mut Pop3Handler, out: &mut MemorySink, line: &str) -> CommandOutcome {
    if handler.in_continuation() {
        handler.dispatch_continuation(out, line).await
    } else {
        handler.dispatch_command(out, line).await
    }
}

#[tokio::test]
async fn greeting_names_host_only_when_asked() {
    let mut out = MemorySink::default();

    let mut plain = Pop3Handler::new(settings(), alice());
    plain.send_greeting(&mut out, "mx.example.org").await.ok();
    assert_eq!(out.take(), vec!["+OK mailgate POP3 gateway ready"]);

    let mut named = Pop3Handler::new(HandlerSettings { hostname_greeting: true, ..settings() }, alice());
    named.send_greeting(&mut out, "mx.example.org").await.ok();
    assert_eq!(out.take(), vec!["+OK mailgate POP3 gateway ready on mx.example.org"]);
}

#[tokio::test]
async fn user_pass_login() {
    let mut h = Pop3Handler::new(settings(), alice());
    let mut out = MemorySink::default();

    assert_eq!(run(&mut h, &mut out, "user alice").await, CommandOutcome::Continue);
    assert_eq!(run(&mut h, &mut out, "PASS s3cret").await, CommandOutcome::Continue);
    assert_eq!(out.take(), vec!["+OK Waiting for password", "+OK Logged in"]);
    assert_eq!(h.logged_in_user(), Some("alice"));

    run(&mut h, &mut out, "STAT").await;
    assert_eq!(out.take(), vec!["-ERR [SYS/TEMP] Mailbox access is not available"]);

    assert_eq!(run(&mut h, &mut out, "QUIT").await, CommandOutcome::EndOfSession);
    assert_eq!(out.take(), vec!["+OK Signing off"]);
}

#[tokio::test]
async fn wrong_password_and_pass_without_user() {
    let mut h = Pop3Handler::new(settings(), alice());
    let mut out = MemorySink::default();

    run(&mut h, &mut out, "PASS s3cret").await;
    run(&mut h, &mut out, "USER alice").await;
    run(&mut h, &mut out, "PASS nope").await;
    // the username is consumed by a failed PASS
    run(&mut h, &mut out, "PASS s3cret").await;
    assert_eq!(
        out.take(),
        vec![
            "-ERR Give username first",
            "+OK Waiting for password",
            "-ERR [AUTH] Wrong username or password",
            "-ERR Give username first",
        ]
    );
    assert_eq!(h.logged_in_user(), None);
}

#[tokio::test]
async fn mailbox_commands_need_login() {
    let mut h = Pop3Handler::new(settings(), alice());
    let mut out = MemorySink::default();
    run(&mut h, &mut out, "RETR 1").await;
    assert_eq!(out.take(), vec!["-ERR Not authenticated"]);
}

#[tokio::test]
async fn capabilities_follow_login_and_plaintext_policy() {
    let mut out = MemorySink::default();

    let mut h = Pop3Handler::new(settings(), alice());
    run(&mut h, &mut out, "CAPA").await;
    let caps = out.take();
    assert_eq!(caps.first().map(String::as_str), Some("+OK Capability list follows"));
    assert_eq!(caps.last().map(String::as_str), Some("."));
    assert!(caps.iter().any(|c| c == "USER"));
    assert!(caps.iter().any(|c| c == "SASL PLAIN"));

    run(&mut h, &mut out, "USER alice").await;
    run(&mut h, &mut out, "PASS s3cret").await;
    out.take();
    run(&mut h, &mut out, "CAPA").await;
    assert!(!out.take().iter().any(|c| c == "USER"));

    let strict = HandlerSettings { disable_plaintext_auth: true, ..settings() };
    let mut h = Pop3Handler::new(strict.clone(), alice());
    run(&mut h, &mut out, "CAPA").await;
    assert!(!out.take().iter().any(|c| c == "USER" || c == "SASL PLAIN"));

    let mut h = Pop3Handler::new(HandlerSettings { tls: true, ..strict }, alice());
    run(&mut h, &mut out, "CAPA").await;
    assert!(out.take().iter().any(|c| c == "USER"));
}

#[tokio::test]
async fn plaintext_refused_on_cleartext_when_disabled() {
    let strict = HandlerSettings { disable_plaintext_auth: true, ..settings() };
    let mut h = Pop3Handler::new(strict, alice());
    let mut out = MemorySink::default();

    run(&mut h, &mut out, "USER alice").await;
    run(&mut h, &mut out, "AUTH PLAIN AGFsaWNlAHMzY3JldA==").await;
    let refusal = "-ERR [AUTH] Plaintext authentication disallowed on non-secure connections";
    assert_eq!(out.take(), vec![refusal, refusal]);
    assert_eq!(h.logged_in_user(), None);
}

#[tokio::test]
async fn auth_plain_with_initial_response() {
    let mut h = Pop3Handler::new(settings(), alice());
    let mut out = MemorySink::default();

    run(&mut h, &mut out, "AUTH").await;
    assert_eq!(out.take(), vec!["+OK", "PLAIN", "."]);

    run(&mut h, &mut out, "AUTH PLAIN AGFsaWNlAHMzY3JldA==").await;
    assert_eq!(out.take(), vec!["+OK Logged in"]);
    assert_eq!(h.logged_in_user(), Some("alice"));
}

#[tokio::test]
async fn auth_plain_continuation() {
    let mut h = Pop3Handler::new(settings(), alice());
    let mut out = MemorySink::default();

    run(&mut h, &mut out, "AUTH PLAIN").await;
    assert!(h.in_continuation());
    assert_eq!(out.take(), vec!["+ "]);

    run(&mut h, &mut out, "AGFsaWNlAHdyb25n").await;
    assert!(!h.in_continuation());
    assert_eq!(out.take(), vec!["-ERR [AUTH] Wrong username or password"]);

    run(&mut h, &mut out, "AUTH PLAIN").await;
    run(&mut h, &mut out, "*").await;
    assert_eq!(out.take(), vec!["+ ", "-ERR Authentication aborted"]);

    run(&mut h, &mut out, "AUTH PLAIN").await;
    run(&mut h, &mut out, "not base64!").await;
    assert_eq!(out.take(), vec!["+ ", "-ERR [AUTH] Invalid AUTH PLAIN response"]);

    // "=" is an empty initial response, not a request for a challenge
    run(&mut h, &mut out, "AUTH PLAIN =").await;
    assert!(!h.in_continuation());
    assert_eq!(out.take(), vec!["-ERR [AUTH] Invalid AUTH PLAIN response"]);

    run(&mut h, &mut out, "AUTH CRAM-MD5").await;
    assert_eq!(out.take(), vec!["-ERR Unsupported authentication mechanism"]);
}

#[tokio::test]
async fn failure_budget_ends_session() {
    let mut h = Pop3Handler::new(HandlerSettings { max_fail_commands: 3, ..settings() }, alice());
    let mut out = MemorySink::default();

    assert_eq!(run(&mut h, &mut out, "XYZZY").await, CommandOutcome::Continue);
    assert_eq!(run(&mut h, &mut out, "NOOP").await, CommandOutcome::Continue);
    assert_eq!(run(&mut h, &mut out, "FOO").await, CommandOutcome::Continue);
    assert_eq!(run(&mut h, &mut out, "BAR").await, CommandOutcome::EndOfSession);
    assert_eq!(
        out.take(),
        vec![
            "-ERR Invalid command",
            "+OK",
            "-ERR Invalid command",
            "-ERR Invalid command",
            "-ERR Too many invalid commands",
        ]
    );
}

struct Offline;

#[async_trait]
impl Authenticator for Offline {
    async fn authenticate(&self, _username: &str, _password: &str) -> AuthResult {
        AuthResult::Unavailable("store offline".into())
    }
}

#[tokio::test]
async fn unavailable_store_is_a_handler_failure() {
    let mut h = Pop3Handler::new(settings(), Arc::new(Offline));
    let mut out = MemorySink::default();

    run(&mut h, &mut out, "USER alice").await;
    let outcome = run(&mut h, &mut out, "PASS s3cret").await;
    assert_eq!(outcome, CommandOutcome::Failed("store offline".into()));
    assert_eq!(out.take().last().map(String::as_str), Some("-ERR [SYS/TEMP] Authentication service unavailable"));
}

#[tokio::test]
async fn write_failure_is_a_network_error() {
    let mut h = Pop3Handler::new(settings(), alice());
    assert_eq!(h.dispatch_command(&mut BrokenSink, "NOOP").await, CommandOutcome::NetworkError);
}

#[tokio::test]
async fn farewells_and_close() {
    let mut h = Pop3Handler::new(settings(), alice());
    let mut out = MemorySink::default();

    h.farewell(&mut out, Farewell::Timeout).await.ok();
    h.farewell(&mut out, Farewell::ShuttingDown).await.ok();
    h.close(&mut out, true).await;
    assert_eq!(
        out.take(),
        vec!["-ERR Connection closed because of timeout", "-ERR Server shutting down", "-ERR Connection error"]
    );

    run(&mut h, &mut out, "USER alice").await;
    run(&mut h, &mut out, "PASS s3cret").await;
    h.close(&mut out, false).await;
    assert_eq!(h.logged_in_user(), None);
}
