//! # chronicle-core
//!
//! Core library behind the Chronicle hook binary: config loading,
//! secret sanitization, the dual-backend persistence layer, and the hook
//! pipeline itself.
//!
//! ## Design Principles
//!
//! - **Synchronous**: no async runtime dependency — both backend drivers
//!   (`rusqlite`, `diesel`) are blocking, so dual writes use native threads.
//! - **Durable by default**: a write only fails if *both* backends reject
//!   it; losing the primary degrades to local-only, never to data loss.
//! - **Never blocks the host**: parse errors, timeouts, and internal
//!   failures all resolve to an allow decision.

pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks_config;
pub mod persistence;
pub mod realtime;
pub mod sanitizer;
pub mod types;

pub use config::Config;
pub use engine::Engine;
pub use error::{ChronicleError, ErrorClass, Result};
pub use types::{Decision, EventRecord, Session, SessionAttrs};
