use axum::{
    extract::State,
    response::{sse::Event, Json, Sse},
};
use std::convert::Infallible;
use taskboard_core::events::BoardEvent;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::state::AppState;

/// A subscriber that fell behind has lost events it can't get back; tell it
/// to reload instead.
pub(crate) fn event_or_reload(
    item: Result<BoardEvent, BroadcastStreamRecvError>,
) -> BoardEvent {
    match item {
        Ok(event) => event,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            log::warn!(target: "taskboard.push", "Subscriber lagged by {} events, forcing reload", skipped);
            BoardEvent::OrderingChanged
        }
    }
}

/// SSE endpoint: streams BoardEvent as JSON to connected clients.
pub async fn sse_events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let event = event_or_reload(result);
        match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().event(event.kind()).data(json))),
            Err(_) => None,
        }
    });

    // Keep-alive every 30 seconds
    let stream = stream.merge(tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(
            std::time::Duration::from_secs(30),
        )),
        |_| Ok(Event::default().comment("keep-alive")),
    ));

    Sse::new(stream)
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "running",
        "port": state.port,
        "bindAddress": state.bind_address,
        "version": state.gateway.version(),
        "clients": state.broadcaster().receiver_count(),
    }))
}
