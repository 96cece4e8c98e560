use crate::config::{Config, ServiceListen};
use crate::listener::BindSpec;

pub fn validate(config: &Config) -> Result<(), String> {
    for (name, service) in [
        ("pop3", &config.pop3),
        ("pop3s", &config.pop3s),
        ("imap", &config.imap),
        ("imaps", &config.imaps),
    ] {
        validate_service(name, service)?;
    }

    let timeout = &config.timeout;
    if timeout.tick_secs == 0 {
        return Err("timeout.tick_secs must be > 0".into());
    }
    if timeout.pop3_idle_ticks == 0 || timeout.imap_idle_ticks == 0 {
        return Err("idle tick limits must be > 0".into());
    }
    if timeout.accept_poll_secs == 0 {
        return Err("timeout.accept_poll_secs must be > 0".into());
    }
    if timeout.tls_handshake_secs == 0 {
        return Err("timeout.tls_handshake_secs must be > 0".into());
    }
    if timeout.max_line_bytes < 512 {
        return Err("timeout.max_line_bytes must be at least 512".into());
    }

    if let Some(tls) = &config.tls {
        if tls.cert_path.trim().is_empty() || tls.key_path.trim().is_empty() {
            return Err("tls.cert_path and tls.key_path cannot be empty".into());
        }
        if tls.options.versions.is_empty() {
            return Err("tls.options.versions cannot be empty".into());
        }
        if let Some(ca) = tls.client_auth.ca_cert_path() {
            if ca.trim().is_empty() {
                return Err("tls.client_auth.ca_cert_path cannot be empty".into());
            }
        }
    }
    Ok(())
}

fn validate_service(name: &str, service: &ServiceListen) -> Result<(), String> {
    if service.port == Some(0) {
        return Err(format!("{name}.port must be > 0"));
    }
    for spec in &service.listen {
        BindSpec::parse(spec).map_err(|e| format!("{name}.listen: {e}"))?;
    }
    Ok(())
}
