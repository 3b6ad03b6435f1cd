//! Access token utilities shared by the forum chat crates.
//!
//! The forum's auth service issues HS256 access tokens. This module holds the
//! pieces every consumer of those tokens needs:
//! - Size limit checked before any parsing
//! - Clock skew constants for `iat` validation
//! - The `iat` validation itself
//! - The access token claims structure
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Error messages are generic so callers can't probe which check failed
//! - `user_id` is redacted in Debug output
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{check_token_size, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! check_token_size(token)?;
//! // ... verify signature, decode AccessClaims ...
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed token size in bytes (8KB).
///
/// Forum access tokens are a few hundred bytes. Anything larger is rejected
/// before base64 decoding or signature verification so an oversized query
/// parameter cannot burn CPU on the upgrade path.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default clock skew tolerance (5 minutes).
///
/// Tokens with an `iat` more than this far in the future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum configurable clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during access token validation.
///
/// Note: Display text is intentionally identical for every variant.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Claims carried by forum access tokens.
///
/// `user_id` is the numeric forum account id. It is redacted in Debug output
/// so claims can be logged with `?claims` without leaking account ids.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Numeric forum user id - redacted in Debug output.
    pub user_id: i64,

    /// Forum role (e.g. "user", "admin").
    pub role: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
}

impl fmt::Debug for AccessClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessClaims")
            .field("user_id", &"[REDACTED]")
            .field("role", &self.role)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

impl AccessClaims {
    /// Creates claims for `user_id` valid for `ttl` starting now.
    #[must_use]
    pub fn new(user_id: i64, role: impl Into<String>, ttl: Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        // Safe cast: token lifetimes are minutes to days
        #[allow(clippy::cast_possible_wrap)]
        let ttl_secs = ttl.as_secs() as i64;
        Self {
            user_id,
            role: role.into(),
            exp: now + ttl_secs,
            iat: now,
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Reject tokens larger than [`MAX_JWT_SIZE_BYTES`].
///
/// Must be called before any decoding.
///
/// # Errors
///
/// Returns `JwtValidationError::TokenTooLarge` when the token exceeds the limit.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}
