use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static PHONE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\+?1[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})$")
        .expect("phone number pattern is valid")
});

#[derive(Deserialize)]
struct JwtClaims {
    exp: Option<f64>,
}

/// Whether a JWT access token is past its `exp` claim
///
/// The signature is not checked. Tokens that cannot be decoded, or that
/// carry no `exp`, count as expired.
pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, Utc::now())
}

pub fn is_token_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    let Some(payload) = token.split('.').nth(1) else {
        return true;
    };

    // Some issuers keep the padding; the URL-safe engine here does not want it
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
        return true;
    };

    match serde_json::from_slice::<JwtClaims>(&bytes) {
        Ok(JwtClaims { exp: Some(exp) }) => exp < now.timestamp() as f64,
        _ => true,
    }
}

/// Check a new password against the account password policy
///
/// Returns every violated rule; an empty list means the password is valid.
pub fn validate_password(password: &str) -> Vec<&'static str> {
    let mut errors = Vec::new();

    if password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number");
    }

    errors
}

/// North American phone number, optionally prefixed with `+1` / `1`
pub fn validate_phone_number(phone: &str) -> bool {
    PHONE_NUMBER.is_match(phone)
}

/// Linked-account token expiring within the next 7 days (or already expired)
pub fn is_expiring_soon(expiry: &str) -> bool {
    is_expiring_soon_at(expiry, Utc::now())
}

pub fn is_expiring_soon_at(expiry: &str, now: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(expiry) {
        Ok(expiry) => expiry.with_timezone(&Utc) - now <= Duration::days(7),
        Err(_) => false,
    }
}
