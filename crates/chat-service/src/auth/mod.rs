//! Credential verification for chat connections.
//!
//! The upgrade request may carry an HS256 access token issued by the forum
//! backend. A valid token makes the session authenticated; anything else
//! makes it anonymous.

pub mod jwt;

pub use common::jwt::AccessClaims;
pub use jwt::JwtValidator;
