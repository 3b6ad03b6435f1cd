//! JWT validation for chat connections.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted
//! - `exp` is validated, `iat` is validated with clock skew tolerance
//! - Every failure maps to the same generic error

use crate::errors::ChatError;
use common::jwt::{check_token_size, validate_iat, AccessClaims};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::time::Duration;
use tracing::{debug, instrument};

const INVALID_TOKEN: &str = "The access token is invalid or expired";

/// Validates access tokens signed with the shared forum secret.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    clock_skew: Duration,
}

impl JwtValidator {
    /// # Arguments
    ///
    /// * `secret` - HMAC secret shared with the token issuer
    /// * `clock_skew` - Tolerance for `iat` in the future
    pub fn new(secret: &SecretString, clock_skew: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
            clock_skew,
        }
    }

    /// Validate a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::InvalidToken` with a generic message for every
    /// failure: oversize, malformed, bad signature, expired or issued in the
    /// future.
    #[instrument(skip_all)]
    pub fn validate(&self, token: &str) -> Result<AccessClaims, ChatError> {
        check_token_size(token).map_err(|e| {
            debug!(target: "chat.auth", error = %e, "Token rejected before parsing");
            ChatError::InvalidToken(INVALID_TOKEN.to_string())
        })?;

        let token_data =
            decode::<AccessClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                debug!(target: "chat.auth", error = %e, "Token verification failed");
                ChatError::InvalidToken(INVALID_TOKEN.to_string())
            })?;

        let claims = token_data.claims;
        if let Err(e) = validate_iat(claims.iat, self.clock_skew) {
            debug!(target: "chat.auth", error = %e, "Token iat validation failed");
            return Err(ChatError::InvalidToken(INVALID_TOKEN.to_string()));
        }

        debug!(target: "chat.auth", user_id = claims.user_id, "Token validated");
        Ok(claims)
    }
}
