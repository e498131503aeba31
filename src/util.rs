//! Small helpers for email normalization, code/token generation, and URLs.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// Normalize an email for lookup/uniqueness checks.
///
/// Applied before every store read or write; differently-cased spellings of
/// the same address must never be treated as distinct entities.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Current wall-clock time in unix milliseconds.
pub(crate) fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

/// Mint a fixed-length numeric one-time code from the OS random source.
///
/// Rejection sampling keeps the digit distribution uniform.
pub(crate) fn generate_otp_code(length: usize) -> Result<String> {
    let mut code = String::with_capacity(length);
    let mut buf = [0u8; 64];
    while code.len() < length {
        OsRng
            .try_fill_bytes(&mut buf)
            .context("failed to draw randomness for OTP code")?;
        for byte in buf {
            if code.len() == length {
                break;
            }
            if byte < 250 {
                code.push(char::from(b'0' + byte % 10));
            }
        }
    }
    Ok(code)
}

/// Mint a high-entropy invitation token, hex-encoded.
///
/// The raw token is only handed to the inviter; guessing it must be
/// infeasible within the invitation's lifetime.
pub(crate) fn generate_invitation_token(bytes: usize) -> Result<String> {
    let mut buf = vec![0u8; bytes];
    OsRng
        .try_fill_bytes(&mut buf)
        .context("failed to draw randomness for invitation token")?;
    Ok(hex::encode(buf))
}

/// Build the activation link embedded in invitation emails.
pub(crate) fn build_activation_url(base_url: &str, token: &str) -> Result<String> {
    let mut url = Url::parse(base_url)
        .and_then(|url| url.join("/auth/activate"))
        .context("invalid activation base URL")?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.to_string())
}

/// Derive the stable user id for a normalized email.
///
/// The same email always maps to the same user id across logins.
pub(crate) fn user_id_for_email(email_normalized: &str) -> String {
    let slug: String = email_normalized
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("user_{slug}")
}
