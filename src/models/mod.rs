//! DTO layer: every request/response body the gateway speaks is defined here.
//! Requests pair a `from_json()`/`validate()` with a `to_json()` built on a
//! `Serialize` impl (round-trippable back to the JSON they were parsed from);
//! responses only need the `Serialize` side. Handlers never touch
//! `serde_json::Value` directly.

pub mod chat;
pub mod common;
pub mod completion;
pub mod download;
pub mod engine;
pub mod health;
pub mod metrics;
