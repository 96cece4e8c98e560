mod helpers;

use helpers::{free_port, quiet_config, TestCert, TestResult};
use mailgate_lib::config::{EnableMode, ServiceListen, TlsConfig};
use mailgate_lib::listener::{build_socket_set, ServiceKind};
use mailgate_lib::GatewayError;

#[tokio::test]
async fn all_services_disabled_is_fatal() {
    let mut cfg = quiet_config();
    // listen entries are vetoed by enable = "no"
    cfg.pop3 = ServiceListen { enable: EnableMode::No, port: None, listen: vec!["127.0.0.1:1110".into()] };

    let result = build_socket_set(&cfg).await;
    assert!(matches!(result, Err(GatewayError::NoListeners)));
}

#[tokio::test]
async fn metadata_matches_configuration() -> TestResult {
    let (pop3_port, imap_a, imap_b) = (free_port()?, free_port()?, free_port()?);
    let mut cfg = quiet_config();
    cfg.pop3 = ServiceListen::on(&[&format!("127.0.0.1:{pop3_port}")]);
    cfg.imap = ServiceListen::on(&[&format!("127.0.0.1:{imap_a}"), &format!("127.0.0.1:{imap_b}")]);

    let setup = build_socket_set(&cfg).await?;
    assert!(setup.tls.is_none());
    assert_eq!(setup.sockets.len(), 3);

    let pop3 = setup.sockets.local_addrs(ServiceKind::Pop3);
    assert_eq!(pop3.len(), 1);
    assert_eq!(pop3[0].port(), pop3_port);

    let mut imap: Vec<u16> = setup.sockets.local_addrs(ServiceKind::Imap).iter().map(|a| a.port()).collect();
    imap.sort_unstable();
    let mut expected = vec![imap_a, imap_b];
    expected.sort_unstable();
    assert_eq!(imap, expected);

    for bound in setup.sockets.iter() {
        assert!(!bound.spec.service.tls());
    }
    Ok(())
}

#[tokio::test]
async fn tls_services_dropped_when_context_fails() -> TestResult {
    let (pop3_port, imaps_port) = (free_port()?, free_port()?);
    let mut cfg = quiet_config();
    cfg.pop3 = ServiceListen::on(&[&format!("127.0.0.1:{pop3_port}")]);
    cfg.imaps = ServiceListen::on(&[&format!("127.0.0.1:{imaps_port}")]);
    cfg.tls = Some(TlsConfig {
        cert_path: "/nonexistent/cert.pem".into(),
        key_path: "/nonexistent/key.pem".into(),
        client_auth: Default::default(),
        options: Default::default(),
    });

    let setup = build_socket_set(&cfg).await?;
    assert!(setup.tls.is_none());
    assert_eq!(setup.sockets.len(), 1);
    assert!(setup.sockets.local_addrs(ServiceKind::Imaps).is_empty());
    assert_eq!(setup.sockets.local_addrs(ServiceKind::Pop3)[0].port(), pop3_port);
    Ok(())
}

#[tokio::test]
async fn dropping_tls_services_can_leave_nothing() -> TestResult {
    let mut cfg = quiet_config();
    cfg.pop3s = ServiceListen::on(&[&format!("127.0.0.1:{}", free_port()?)]);
    // no [tls] section at all

    let result = build_socket_set(&cfg).await;
    assert!(matches!(result, Err(GatewayError::NoListeners)));
    Ok(())
}

#[tokio::test]
async fn tls_services_bound_with_valid_context() -> TestResult {
    let cert = TestCert::generate("listener")?;
    let mut cfg = quiet_config();
    cfg.pop3s = ServiceListen::on(&[&format!("127.0.0.1:{}", free_port()?)]);
    cfg.imaps = ServiceListen::on(&[&format!("127.0.0.1:{}", free_port()?)]);
    cfg.tls = Some(cert.tls_config());

    let setup = build_socket_set(&cfg).await?;
    let tls = setup.tls.ok_or("tls context missing")?;
    assert_eq!(tls.current().id, 1);
    assert_eq!(setup.sockets.len(), 2);
    assert!(setup.sockets.iter().all(|b| b.spec.service.tls()));
    Ok(())
}

#[tokio::test]
async fn bind_failure_is_fatal() -> TestResult {
    let taken = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = taken.local_addr()?.port();
    let mut cfg = quiet_config();
    cfg.pop3 = ServiceListen::on(&[&format!("127.0.0.1:{}", free_port()?)]);
    cfg.imap = ServiceListen::on(&[&format!("127.0.0.1:{port}")]);

    let result = build_socket_set(&cfg).await;
    match result {
        Err(GatewayError::Bind { spec, .. }) => assert!(spec.contains(&port.to_string())),
        Err(other) => return Err(format!("unexpected error: {other}").into()),
        Ok(_) => return Err("bind unexpectedly succeeded".into()),
    }
    drop(taken);
    Ok(())
}

#[tokio::test]
async fn accepts_from_any_socket() -> TestResult {
    let (pop3_port, imap_port) = (free_port()?, free_port()?);
    let mut cfg = quiet_config();
    cfg.pop3 = ServiceListen::on(&[&format!("127.0.0.1:{pop3_port}")]);
    cfg.imap = ServiceListen::on(&[&format!("127.0.0.1:{imap_port}")]);
    let setup = build_socket_set(&cfg).await?;

    let _client = tokio::net::TcpStream::connect(("127.0.0.1", imap_port)).await?;
    let (service, accepted) = setup.sockets.accept().await;
    assert_eq!(service, ServiceKind::Imap);
    accepted?;

    let _client = tokio::net::TcpStream::connect(("127.0.0.1", pop3_port)).await?;
    let (service, accepted) = setup.sockets.accept().await;
    assert_eq!(service, ServiceKind::Pop3);
    accepted?;
    Ok(())
}
