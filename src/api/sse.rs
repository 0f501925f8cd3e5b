//! Server-Sent Events support

use crate::stream::StreamEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Relay a turn's events to the client.
///
/// Dropping the response (client disconnect) cancels `cancel`, which stops
/// the turn at its next suspension point.
pub fn turn_stream(
    events: ReceiverStream<StreamEvent>,
    cancel: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stop_on_drop = cancel.drop_guard();
    let stream = stream::unfold((events, stop_on_drop), |(mut events, guard)| async move {
        let event = events.next().await?;
        Some((Ok(sse_event(&event)), (events, guard)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn sse_event(event: &StreamEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        tracing::error!(event = event.name(), error = %e, "Failed to encode stream event");
        Event::default().data(r#"{"type":"error","message":"event encoding failed"}"#)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FinishReason;
    use axum::body::to_bytes;
    use axum::response::IntoResponse;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_dropping_stream_cancels_turn() {
        let cancel = CancellationToken::new();
        let (_tx, rx) = mpsc::channel::<StreamEvent>(4);
        let sse = turn_stream(ReceiverStream::new(rx), cancel.clone());
        assert!(!cancel.is_cancelled());
        drop(sse);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_events_encode_as_data_lines() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamEvent::Finish {
            reason: FinishReason::Stop,
        })
        .await
        .unwrap();
        drop(tx);

        let response = turn_stream(ReceiverStream::new(rx), CancellationToken::new()).into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains(r#"data: {"type":"finish","reason":"stop"}"#));
    }
}
