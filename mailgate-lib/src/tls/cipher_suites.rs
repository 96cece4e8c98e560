use tokio_rustls::rustls::crypto::aws_lc_rs::cipher_suite as cs;
use tokio_rustls::rustls::SupportedCipherSuite;

/// Suites offered by the aws-lc-rs provider, keyed by their rustls name
fn suites() -> [(&'static str, SupportedCipherSuite); 9] {
    [
        ("TLS13_AES_128_GCM_SHA256", cs::TLS13_AES_128_GCM_SHA256),
        ("TLS13_AES_256_GCM_SHA384", cs::TLS13_AES_256_GCM_SHA384),
        ("TLS13_CHACHA20_POLY1305_SHA256", cs::TLS13_CHACHA20_POLY1305_SHA256),
        ("TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", cs::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256),
        ("TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", cs::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384),
        (
            "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
            cs::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        ),
        ("TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", cs::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256),
        ("TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", cs::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384),
        (
            "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
            cs::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ),
    ]
}

pub fn supported_cipher_suites() -> Vec<&'static str> {
    suites().iter().map(|(name, _)| *name).collect()
}

/// Map configured names to provider suites, keeping the configured order.
///
/// Returns the first unknown name as the error.
pub fn resolve_cipher_suites(names: &[String]) -> Result<Vec<SupportedCipherSuite>, String> {
    let known = suites();
    names
        .iter()
        .map(|name| {
            known
                .iter()
                .find(|(label, _)| *label == name.as_str())
                .map(|(_, suite)| *suite)
                .ok_or_else(|| name.clone())
        })
        .collect()
}
