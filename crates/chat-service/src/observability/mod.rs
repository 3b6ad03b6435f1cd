//! Observability for the chat service.
//!
//! Prometheus metrics live here. In-process hub counters used by readiness
//! and tests live in `hub::metrics`.

pub mod metrics;
