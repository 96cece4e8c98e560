use serde::{Deserialize, Serialize};

/// TLS version configuration
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    /// TLS 1.2
    #[serde(rename = "1.2")]
    V1_2,
    /// TLS 1.3
    #[serde(rename = "1.3")]
    V1_3,
}

/// Protocol and cipher policy for the TLS listeners
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// Allowed TLS versions
    /// Options: ["1.2"], ["1.3"], or ["1.2", "1.3"]
    /// Default: ["1.2", "1.3"]
    #[serde(default = "default_tls_versions")]
    pub versions: Vec<TlsVersion>,
    /// Allowed cipher suites (by rustls name)
    ///
    /// Default: empty (provider defaults)
    /// See `supported_cipher_suites()` for the complete list.
    #[serde(default)]
    pub cipher_suites: Vec<String>,
    /// Choose the cipher suite by server preference instead of client order
    /// Default: false
    #[serde(default)]
    pub prefer_server_ciphers: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            versions: default_tls_versions(),
            cipher_suites: Vec::new(),
            prefer_server_ciphers: false,
        }
    }
}

fn default_tls_versions() -> Vec<TlsVersion> {
    vec![TlsVersion::V1_2, TlsVersion::V1_3]
}

/// Client certificate verification mode
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuth {
    /// Client certificates are not requested (default)
    #[default]
    Disabled,
    /// Client certificates are requested and verified when presented
    Optional {
        /// Path to the CA bundle (PEM) used to verify client certificates
        ca_cert_path: String,
    },
    /// Clients must present a certificate signed by one of the given CAs
    Required {
        /// Path to the CA bundle (PEM) used to verify client certificates
        ca_cert_path: String,
    },
}

impl ClientAuth {
    pub fn ca_cert_path(&self) -> Option<&str> {
        match self {
            ClientAuth::Disabled => None,
            ClientAuth::Optional { ca_cert_path } | ClientAuth::Required { ca_cert_path } => {
                Some(ca_cert_path)
            }
        }
    }
}

/// TLS termination configuration for POP3S and IMAPS
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the certificate chain (PEM format)
    /// Read on startup and on every reload
    pub cert_path: String,
    /// Path to the private key (PEM format)
    /// Read on startup and on every reload
    pub key_path: String,
    /// Client certificate verification
    /// Default: disabled
    #[serde(default)]
    pub client_auth: ClientAuth,
    /// Controls TLS versions and cipher suites
    #[serde(default)]
    pub options: TlsOptions,
}
