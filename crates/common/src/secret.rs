//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] so every crate in the workspace wraps database URLs,
//! signing secrets and bearer tokens the same way. `SecretString` implements
//! `Debug` with redaction, so a struct deriving `Debug` over a secret field is
//! safe to log with `?value`.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct UpstreamCredentials {
//!     url: String,
//!     token: SecretString,
//! }
//!
//! let creds = UpstreamCredentials {
//!     url: "http://users.internal".to_string(),
//!     token: SecretString::from("hunter2"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("hunter2"));
//! let token: &str = creds.token.expose_secret();
//! assert_eq!(token, "hunter2");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
