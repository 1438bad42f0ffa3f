//! The live-reload SSE endpoint: one infinite event stream per connected
//! browser tab, a 15-second keep-alive comment, and cleanup on disconnect.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;

use crate::devstate::DevState;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub async fn reload_stream(
    State(dev_state): State<Arc<DevState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (client_id, mut rx) = dev_state.subscribe();
    let unsubscribe_on_drop = UnsubscribeGuard {
        dev_state: dev_state.clone(),
        client_id,
    };

    let stream = stream! {
        let _guard = unsubscribe_on_drop;
        loop {
            match rx.recv().await {
                Some(payload) => yield Ok(Event::default().data(payload)),
                None => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEPALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

struct UnsubscribeGuard {
    dev_state: Arc<DevState>,
    client_id: crate::devstate::ClientId,
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        self.dev_state.unsubscribe(self.client_id);
    }
}
