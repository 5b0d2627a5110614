use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

/// Seconds a signed request stays valid.
pub const REQUEST_EXPIRE_SECS: i64 = 600;

const SCHEME: &str = "EXO2-HMAC-SHA256";

/// API key and secret for one account.
#[derive(Clone)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    pub fn new(key: &str, secret: &str) -> Self {
        Self {
            key: key.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Builds the `Authorization` header value for a request.
    ///
    /// The signed message is the method and path, the body, the values of
    /// every single-valued query argument (sorted by name), an empty header
    /// section, and the expiry timestamp, joined by newlines.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
        expires: i64,
    ) -> Result<String, InvalidLength> {
        let (names, values) = signed_query_args(url);

        let message = format!(
            "{} {}\n{}\n{}\n\n{}",
            method,
            url.path(),
            String::from_utf8_lossy(body),
            values,
            expires
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())?;
        mac.update(message.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let mut header = format!("{} credential={}", SCHEME, self.key);
        if !names.is_empty() {
            header.push_str(&format!(",signed-query-args={}", names.join(";")));
        }
        header.push_str(&format!(",expires={},signature={}", expires, signature));
        Ok(header)
    }

    pub fn sign_now(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
    ) -> Result<String, InvalidLength> {
        let expires = chrono::Utc::now().timestamp() + REQUEST_EXPIRE_SECS;
        self.sign(method, url, body, expires)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

fn signed_query_args(url: &Url) -> (Vec<String>, String) {
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    let mut names: Vec<String> = pairs
        .iter()
        .map(|(name, _)| name.clone())
        .filter(|name| pairs.iter().filter(|(n, _)| n == name).count() == 1)
        .collect();
    names.sort();

    let values = names
        .iter()
        .filter_map(|name| pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str()))
        .collect::<String>();

    (names, values)
}

/// Masks credential-bearing headers before they reach a log line.
pub fn redact_header(name: &str, value: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower == "authorization" || (lower.starts_with("x-") && lower.ends_with("-signature")) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}
