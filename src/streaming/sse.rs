//! SSE framing helpers (§4.5/§6) and the cancellation-on-drop stream wrapper
//! that stands in for observing a raw socket write failure: axum gives a
//! handler no way to see that a client disconnected mid-stream, but it does
//! drop the response body's `Stream` when it gives up on it, so `Drop` is
//! where cancellation is signalled back to the generating engine (§9).

use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

use axum::response::sse::Event;
use futures_util::Stream;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

pub fn to_sse_event<T: Serialize>(payload: &T) -> Event {
    Event::default().data(serde_json::to_string(payload).expect("chunk serializes to JSON"))
}

pub fn done_event() -> Event {
    Event::default().data("[DONE]")
}

struct CancelOnDrop {
    cancel: CancellationToken,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The SSE response body: a `ReceiverStream` of already-framed events, paired
/// with a guard that cancels the in-flight generation if this stream is
/// dropped before it runs dry.
pub struct CancellableSseStream {
    inner: ReceiverStream<Result<Event, Infallible>>,
    _guard: CancelOnDrop,
}

impl CancellableSseStream {
    pub fn new(
        inner: ReceiverStream<Result<Event, Infallible>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            _guard: CancelOnDrop { cancel },
        }
    }
}

impl Stream for CancellableSseStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_next(cx)
    }
}
