//! Service layer for the chat service.
//!
//! # Components
//!
//! - `chat` - Save and history use cases over the message store
//! - `identity` - Display name resolution for authenticated sessions

pub mod chat;
pub mod identity;

pub use chat::ChatService;
pub use identity::{IdentityResolver, UserDirectoryClient};
