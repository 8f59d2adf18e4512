//! Server-Sent Events stream over the pipeline event bus.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, Sse};
use futures::stream::{Stream, StreamExt};
use stride::events::{Event, Subscription};
use stride::io::model::Model;
use tracing::{debug, warn};

use crate::state::AppState;

/// SSE endpoint handler. Each frame is one unnamed `data:` line of event JSON.
pub async fn events_handler<M: Model + 'static>(
    State(state): State<AppState<M>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.ctx.bus.subscribe();
    debug!(
        subscriber = ?subscription.id(),
        subscribers = state.ctx.bus.subscriber_count(),
        "SSE client connected"
    );
    let stream = payloads(subscription, state.keepalive)
        .map(|json| Ok(SseEvent::default().data(json)));
    Sse::new(stream)
}

/// Event JSON for one subscriber, with a `ping` frame after `keepalive` of
/// silence. Ends when the bus drops the subscription.
pub fn payloads(mut subscription: Subscription, keepalive: Duration) -> impl Stream<Item = String> {
    async_stream::stream! {
        loop {
            let event = match tokio::time::timeout(keepalive, subscription.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) => Event::ping(),
            };
            match event.to_json() {
                Ok(json) => yield json,
                Err(err) => warn!(err = %err, event = event.type_tag(), "failed to encode event"),
            }
        }
        debug!(subscriber = ?subscription.id(), "SSE subscription closed");
    }
}
