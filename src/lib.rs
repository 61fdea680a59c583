//! `cortex-gateway`: an OpenAI-compatible HTTP inference gateway that routes
//! chat/completion requests to a pool of long-lived model engines.

pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod state;
pub mod streaming;

pub use routes::build_app;
pub use state::AppState;
