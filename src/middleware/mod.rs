//! Request admission pipeline: CORS, API-key auth, and sliding-window rate
//! limiting, composed into the single ordered decision described in §4.3.

pub mod admission;
pub mod api_key;
pub mod cors;
pub mod rate_limit;
