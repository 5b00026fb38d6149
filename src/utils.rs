//! Address validation and request signing helpers.

use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use crate::errors::SendError;

type HmacSha256 = Hmac<Sha256>;

/// Headers covered by the HMAC signature, in signing order.
pub const SIGNED_HEADERS: &str = "x-ms-date;host;x-ms-content-sha256";

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("email pattern compiles")
    })
}

/// Validates email format (RFC 5322 simplified).
pub fn is_valid_email(email: &str) -> bool {
    if !email_pattern().is_match(email) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.len() > 64 || domain.len() > 255 {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((_, tld)) => tld.len() >= 2,
        None => false,
    }
}

/// Base64 SHA-256 digest of a request body.
pub fn content_hash(body: &[u8]) -> String {
    B64.encode(Sha256::digest(body))
}

/// RFC 1123 date as expected by `x-ms-date`.
pub fn rfc1123_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `host[:port]` of a URL, port only when it is not the scheme default.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Path plus query, the resource part of the string to sign.
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}

/// Builds the `Authorization` header value for an HMAC-SHA256 signed request.
pub fn sign_request(
    method: &str,
    url: &Url,
    date: &str,
    content_hash: &str,
    access_key: &[u8],
) -> Result<String, SendError> {
    let string_to_sign = format!(
        "{}\n{}\n{};{};{}",
        method.to_ascii_uppercase(),
        path_and_query(url),
        date,
        authority(url),
        content_hash
    );
    let mut mac =
        HmacSha256::new_from_slice(access_key).map_err(|e| SendError::Signing(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    let signature = B64.encode(mac.finalize().into_bytes());
    Ok(format!(
        "HMAC-SHA256 SignedHeaders={}&Signature={}",
        SIGNED_HEADERS, signature
    ))
}
