//! # Chat Test Utilities
//!
//! Shared test utilities for the chat service.
//!
//! This crate provides:
//! - Access token minting (`mint_token`, `expired_token`)
//! - Server test harness (`TestChatServer` for E2E tests)
//! - WebSocket client (`ChatClient`) that understands coalesced frames
//! - In-memory connections (`open_session`) for driving sessions directly
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chat_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestChatServer::spawn(
//!         Arc::new(MockChatStore::new()),
//!         Arc::new(MockIdentityResolver::with_names([(1, "alice")])),
//!     )
//!     .await?;
//!
//!     let mut client = ChatClient::connect(&server, Some(&mint_token(1))).await?;
//!     client.send_content("hi").await?;
//!     assert_eq!(client.next_envelope().await?["type"], "new_message");
//!     Ok(())
//! }
//! ```

pub mod fake_socket;
pub mod server_harness;
pub mod tokens;
pub mod ws_client;

// Re-export commonly used items
pub use fake_socket::*;
pub use server_harness::*;
pub use tokens::*;
pub use ws_client::*;
