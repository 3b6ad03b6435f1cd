//! Common utilities and types shared across the forum chat crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for access token utilities (size limit, clock skew, claims)
pub mod jwt;
