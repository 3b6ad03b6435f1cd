//! HTTP request handlers.

pub mod chat;
pub mod health;
pub mod metrics;

pub use chat::chat_upgrade;
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
