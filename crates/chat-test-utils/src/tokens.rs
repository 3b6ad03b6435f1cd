//! Access token builders.
//!
//! Tokens are HS256-signed with [`TEST_JWT_SECRET`], the secret the test
//! server is configured with.

use common::jwt::AccessClaims;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::time::Duration;

/// Secret shared between the token builders and `TestChatServer`.
pub const TEST_JWT_SECRET: &str = "chat-test-secret-0123456789abcdef";

/// A valid one-hour token for `user_id`.
pub fn mint_token(user_id: i64) -> String {
    token_signed_with(TEST_JWT_SECRET, user_id)
}

/// A valid-looking token signed with some other secret.
pub fn token_signed_with(secret: &str, user_id: i64) -> String {
    sign(
        &AccessClaims::new(user_id, "user", Duration::from_secs(3600)),
        secret,
    )
}

/// A correctly signed token that expired an hour ago.
pub fn expired_token(user_id: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    sign(
        &AccessClaims {
            user_id,
            role: "user".to_string(),
            exp: now - 3600,
            iat: now - 7200,
        },
        TEST_JWT_SECRET,
    )
}

fn sign(claims: &AccessClaims, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("HS256 signing cannot fail")
}
