use std::fmt;
use std::sync::Arc;

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use tokio_rustls::rustls::crypto::aws_lc_rs;
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{version, RootCertStore, ServerConfig, SupportedProtocolVersion};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::config::{ClientAuth, TlsConfig, TlsVersion};
use crate::error::{GatewayError, Result};
use crate::tls::cipher_suites::{resolve_cipher_suites, supported_cipher_suites};

/// Certificate, key and CA bundle as read from disk, together with the
/// settings they were read for.
///
/// Carried to worker processes so they never touch the key files themselves.
#[derive(Clone, Serialize, Deserialize)]
pub struct TlsMaterial {
    pub config: TlsConfig,
    pub cert_pem: String,
    pub key_pem: String,
    pub client_ca_pem: Option<String>,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("config", &self.config)
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .field("client_ca_pem", &self.client_ca_pem.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl TlsMaterial {
    pub fn read(cfg: &TlsConfig) -> Result<Self> {
        debug!(cert = %cfg.cert_path, key = %cfg.key_path, "Reading TLS certificate and private key");
        let cert_pem = read_pem_file(&cfg.cert_path, "certificate")?;
        let key_pem = read_pem_file(&cfg.key_path, "private key")?;
        let client_ca_pem = match cfg.client_auth.ca_cert_path() {
            Some(path) => Some(read_pem_file(path, "client CA bundle")?),
            None => None,
        };
        Ok(Self { config: cfg.clone(), cert_pem, key_pem, client_ca_pem })
    }
}

fn read_pem_file(path: &str, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| GatewayError::Tls(format!("Unable to load the {what} [{path}]: {e}")))
}

fn parse_certs(pem: &str, what: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, rustls_pki_types::pem::Error>>()
        .map_err(|e| GatewayError::Tls(format!("Unable to parse the {what}: {e}")))?;
    if certs.is_empty() {
        return Err(GatewayError::Tls(format!("No {what} found")));
    }
    Ok(certs)
}

fn protocol_versions(versions: &[TlsVersion]) -> Vec<&'static SupportedProtocolVersion> {
    let mut out = Vec::with_capacity(2);
    if versions.contains(&TlsVersion::V1_3) {
        out.push(&version::TLS13);
    }
    if versions.contains(&TlsVersion::V1_2) {
        out.push(&version::TLS12);
    }
    out
}

/// Build a server-side acceptor from already-read material.
pub fn build_acceptor(material: &TlsMaterial) -> Result<TlsAcceptor> {
    let cfg = &material.config;
    let certs = parse_certs(&material.cert_pem, "certificates")?;
    let key = PrivateKeyDer::from_pem_slice(material.key_pem.as_bytes())
        .map_err(|_| GatewayError::NoPrivateKey)?;

    let mut provider = aws_lc_rs::default_provider();
    if !cfg.options.cipher_suites.is_empty() {
        provider.cipher_suites = resolve_cipher_suites(&cfg.options.cipher_suites).map_err(|name| {
            GatewayError::Tls(format!(
                "Cipher suite '{name}' is not supported. Supported cipher suites: {}",
                supported_cipher_suites().join(", ")
            ))
        })?;
    }
    let provider = Arc::new(provider);

    let versions = protocol_versions(&cfg.options.versions);
    if versions.is_empty() {
        return Err(GatewayError::Tls("No TLS protocol version enabled".into()));
    }
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&versions)
        .map_err(|e| GatewayError::Tls(format!("Invalid TLS protocol settings: {e}")))?;

    let builder = match (&cfg.client_auth, &material.client_ca_pem) {
        (ClientAuth::Disabled, _) => builder.with_no_client_auth(),
        (_, None) => {
            return Err(GatewayError::Tls("Client authentication requires a CA bundle".into()))
        }
        (mode, Some(ca_pem)) => {
            let mut roots = RootCertStore::empty();
            for ca in parse_certs(ca_pem, "client CA certificates")? {
                roots
                    .add(ca)
                    .map_err(|e| GatewayError::Tls(format!("Invalid client CA certificate: {e}")))?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
            let verifier = if matches!(mode, ClientAuth::Optional { .. }) {
                verifier.allow_unauthenticated()
            } else {
                verifier
            };
            let verifier = verifier
                .build()
                .map_err(|e| GatewayError::Tls(format!("Failed to build client verifier: {e}")))?;
            builder.with_client_cert_verifier(verifier)
        }
    };

    let mut server = builder
        .with_single_cert(certs, key)
        .map_err(|e| GatewayError::Tls(format!("Failed to build TLS config: {e}")))?;
    server.ignore_client_order = cfg.options.prefer_server_ciphers;

    Ok(TlsAcceptor::from(Arc::new(server)))
}
