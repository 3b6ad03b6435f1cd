//! Forum Chat Service Library
//!
//! Real-time chat for the forum: a single hub that admits concurrent
//! WebSocket sessions, persists what authenticated users write and fans it
//! out to everyone connected.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/chat.rs -> hub/session.rs <-> hub/actor.rs
//!                                          |                  |
//!                                          +-> services/chat.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Access token verification
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `hub` - Hub actor, sessions and wire format
//! - `models` - Data models
//! - `observability` - Prometheus metrics
//! - `repositories` - Database access layer
//! - `routes` - Axum router setup
//! - `services` - Chat persistence and identity lookup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod hub;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
