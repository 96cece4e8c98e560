use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Credentials carried by a SASL PLAIN response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainCredentials {
    pub authzid: Option<String>,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlainError {
    Base64,
    Malformed,
}

/// Decode a base64 `[authzid] NUL authcid NUL passwd` response.
pub fn decode_plain(response: &str) -> Result<PlainCredentials, PlainError> {
    let decoded = STANDARD.decode(response.trim()).map_err(|_| PlainError::Base64)?;
    let mut parts = decoded.split(|b| *b == 0);
    let (Some(authzid), Some(username), Some(password), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(PlainError::Malformed);
    };
    if username.is_empty() {
        return Err(PlainError::Malformed);
    }
    let text = |b: &[u8]| String::from_utf8(b.to_vec()).map_err(|_| PlainError::Malformed);
    Ok(PlainCredentials {
        authzid: if authzid.is_empty() { None } else { Some(text(authzid)?) },
        username: text(username)?,
        password: text(password)?,
    })
}
