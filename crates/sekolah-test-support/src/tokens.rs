//! Unsigned JWT minting for session tests.
//!
//! The client never verifies signatures, so a fixed signature segment is
//! enough for every test that needs a decodable access token.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use serde_json::json;

/// Build an unsigned JWT whose payload carries `exp` and `user_id`.
#[must_use]
pub fn mint_token(exp: i64, user_id: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": "HS256", "typ": "JWT"}).to_string());
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "token_type": "access",
            "exp": exp,
            "jti": format!("test-{user_id}-{exp}"),
            "user_id": user_id,
            "username": format!("user{user_id}")
        })
        .to_string(),
    );
    format!("{header}.{payload}.signature")
}

/// Token for user 1 that expires an hour from now.
#[must_use]
pub fn fresh_token() -> String {
    mint_token((Utc::now() + Duration::hours(1)).timestamp(), 1)
}

/// Token for user 1 that expired an hour ago.
#[must_use]
pub fn expired_token() -> String {
    mint_token((Utc::now() - Duration::hours(1)).timestamp(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_has_three_segments_and_decodable_payload() {
        let token = mint_token(1_700_000_000, 5);
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
        let payload = URL_SAFE_NO_PAD.decode(segments[1]).expect("base64 payload");
        let claims: serde_json::Value = serde_json::from_slice(&payload).expect("json payload");
        assert_eq!(claims["exp"], 1_700_000_000);
        assert_eq!(claims["user_id"], 5);
    }

    #[test]
    fn fresh_and_expired_tokens_differ() {
        assert_ne!(fresh_token(), expired_token());
    }
}
