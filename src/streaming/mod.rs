//! SSE framing and the chat/completion dispatch pipeline (§4.5).

pub mod dispatcher;
pub mod sse;

pub use dispatcher::{dispatch_chat, dispatch_completion};
