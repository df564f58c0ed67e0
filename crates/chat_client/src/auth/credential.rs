//! Expiry checks on signed credentials (`header.payload.signature`).
//!
//! Only the `exp` claim of the payload is read. The signature is never
//! verified here; the service does that.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

/// The `exp` claim in seconds since the epoch, if the credential carries one.
pub fn expiry_of(token: &str) -> Option<i64> {
    let mut parts = token.trim().split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    exp.as_i64().or_else(|| exp.as_f64().map(|secs| secs as i64))
}

/// Expired when `exp` is missing, unreadable, or not more than `margin`
/// after `now_secs`.
pub fn is_expired_at(token: &str, now_secs: i64, margin: Duration) -> bool {
    match expiry_of(token) {
        Some(exp) => exp <= now_secs.saturating_add(margin.as_secs() as i64),
        None => true,
    }
}

pub fn is_expired(token: &str, margin: Duration) -> bool {
    is_expired_at(token, now_secs(), margin)
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) fn token_with_claims(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MARGIN: Duration = Duration::from_secs(30);
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_reads_exp_claim() {
        let token = token_with_claims(json!({"sub": "user_1", "exp": NOW}));
        assert_eq!(expiry_of(&token), Some(NOW));
    }

    #[test]
    fn test_fresh_token_is_not_expired() {
        for ahead in [31, 60, 3600] {
            let token = token_with_claims(json!({"exp": NOW + ahead}));
            assert!(!is_expired_at(&token, NOW, MARGIN), "{ahead}s ahead");
        }
    }

    #[test]
    fn test_token_inside_margin_is_expired() {
        for ahead in [-3600, 0, 1, 29, 30] {
            let token = token_with_claims(json!({"exp": NOW + ahead}));
            assert!(is_expired_at(&token, NOW, MARGIN), "{ahead}s ahead");
        }
    }

    #[test]
    fn test_undecodable_tokens_fail_closed() {
        let no_exp = token_with_claims(json!({"sub": "user_1"}));
        let string_exp = token_with_claims(json!({"exp": "tomorrow"}));
        for token in [
            "",
            "not-a-jwt",
            "a.b",
            "a.!!!.c",
            "a.b.c.d",
            no_exp.as_str(),
            string_exp.as_str(),
        ] {
            assert!(is_expired_at(token, NOW, MARGIN), "{token:?}");
        }
    }

    #[test]
    fn test_fractional_exp_is_accepted() {
        let token = token_with_claims(json!({"exp": (NOW + 120) as f64 + 0.5}));
        assert_eq!(expiry_of(&token), Some(NOW + 120));
    }
}
