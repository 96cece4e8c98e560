//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mailgate_lib::config::{Config, ServiceListen, TlsConfig};
use mailgate_lib::protocol::{AuthResult, Authenticator};
use mailgate_lib::session::ResponseSink;
use rustls_pki_types::CertificateDer;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Temporary file holding `contents`, removed on drop
pub fn temp_file(contents: &str) -> TestResult<NamedTempFile> {
    let file = NamedTempFile::new()?;
    std::fs::write(file.path(), contents)?;
    Ok(file)
}

/// Self-signed certificate for "localhost" in temporary PEM files
pub struct TestCert {
    _cert_file: NamedTempFile,
    _key_file: NamedTempFile,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub der: CertificateDer<'static>,
}

impl TestCert {
    pub fn generate(name: &str) -> TestResult<Self> {
        let rcgen::CertifiedKey { cert, signing_key } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
        let cert_file = tempfile::Builder::new().prefix(name).suffix(".crt").tempfile()?;
        let key_file = tempfile::Builder::new().prefix(name).suffix(".key").tempfile()?;
        std::fs::write(cert_file.path(), cert.pem())?;
        std::fs::write(key_file.path(), signing_key.serialize_pem())?;
        Ok(Self {
            cert_path: cert_file.path().to_path_buf(),
            key_path: key_file.path().to_path_buf(),
            _cert_file: cert_file,
            _key_file: key_file,
            der: CertificateDer::from(cert.der().to_vec()),
        })
    }

    pub fn tls_config(&self) -> TlsConfig {
        TlsConfig {
            cert_path: path_str(&self.cert_path),
            key_path: path_str(&self.key_path),
            client_auth: Default::default(),
            options: Default::default(),
        }
    }
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A loopback port that was free a moment ago
pub fn free_port() -> TestResult<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Every service disabled; tests switch on what they need
pub fn quiet_config() -> Config {
    Config {
        pop3: ServiceListen::disabled(),
        pop3s: ServiceListen::disabled(),
        imap: ServiceListen::disabled(),
        imaps: ServiceListen::disabled(),
        server_hostname: "gw.test".into(),
        ..Config::default()
    }
}

/// Collects handler output in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

impl MemorySink {
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

#[async_trait]
impl ResponseSink for MemorySink {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

/// Sink whose writes always fail
pub struct BrokenSink;

#[async_trait]
impl ResponseSink for BrokenSink {
    async fn write_line(&mut self, _line: &str) -> io::Result<()> {
        Err(io::ErrorKind::BrokenPipe.into())
    }
}

/// Accepts exactly one username/password pair
pub struct StaticAuth {
    pub user: &'static str,
    pub password: &'static str,
}

#[async_trait]
impl Authenticator for StaticAuth {
    async fn authenticate(&self, username: &str, password: &str) -> AuthResult {
        if username == self.user && password == self.password {
            AuthResult::Accepted
        } else {
            AuthResult::Rejected
        }
    }
}

pub fn alice() -> Arc<dyn Authenticator> {
    Arc::new(StaticAuth { user: "alice", password: "s3cret" })
}

/// Line-based client side of a test connection
pub struct LineClient<S> {
    io: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineClient<S> {
    pub fn new(stream: S) -> Self {
        Self { io: BufReader::new(stream) }
    }

    pub fn into_inner(self) -> S {
        self.io.into_inner()
    }

    /// Next line without CRLF, or None at end of stream
    pub async fn line(&mut self) -> TestResult<Option<String>> {
        let mut buf = String::new();
        if self.io.read_line(&mut buf).await? == 0 {
            return Ok(None);
        }
        Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string()))
    }

    pub async fn expect_line(&mut self) -> TestResult<String> {
        self.line().await?.ok_or_else(|| "connection closed".into())
    }

    pub async fn send(&mut self, line: &str) -> TestResult {
        let stream = self.io.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> TestResult {
        let stream = self.io.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// Client connector trusting only `trusted`
pub fn tls_connector(trusted: &CertificateDer<'static>) -> TestResult<tokio_rustls::TlsConnector> {
    use tokio_rustls::rustls::{crypto::aws_lc_rs, ClientConfig, RootCertStore};

    let mut roots = RootCertStore::empty();
    roots.add(trusted.clone())?;
    let config = ClientConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(tokio_rustls::TlsConnector::from(Arc::new(config)))
}

/// Leaf certificate presented by the server on a client TLS stream
pub fn served_cert<S>(stream: &tokio_rustls::client::TlsStream<S>) -> Option<CertificateDer<'static>> {
    let (_, conn) = stream.get_ref();
    conn.peer_certificates()
        .and_then(|certs| certs.first())
        .map(|c| c.clone().into_owned())
}
