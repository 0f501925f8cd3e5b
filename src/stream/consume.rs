//! Receiver-side driver over a whole event stream

use super::{MessageAssembler, StreamEvent};
use crate::message::MessageStatus;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tokio_util::sync::CancellationToken;

/// Drive `events` into `assembler` until the turn ends.
///
/// Cancelling `cancel` stops consumption immediately. A stream that ends, or
/// yields a transport error, before a terminal event leaves the message
/// incomplete; a protocol violation does the same.
pub async fn consume<S, E>(
    assembler: &mut MessageAssembler,
    mut events: S,
    cancel: &CancellationToken,
) -> MessageStatus
where
    S: Stream<Item = Result<StreamEvent, E>> + Unpin,
    E: Display,
{
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                assembler.cancel();
                break;
            }

            next = events.next() => match next {
                Some(Ok(event)) => {
                    if let Err(e) = assembler.apply(event) {
                        tracing::warn!(error = %e, "Protocol violation in event stream");
                        assembler.fail(format!("protocol violation: {e}"));
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Event stream transport error");
                    assembler.fail(format!("transport error: {e}"));
                }
                None => {
                    if !assembler.is_terminal() {
                        assembler.fail("stream ended before finish");
                    }
                }
            }
        }

        if assembler.is_terminal() {
            break;
        }
    }
    assembler.status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FinishReason;
    use std::convert::Infallible;

    fn ok(event: StreamEvent) -> Result<StreamEvent, Infallible> {
        Ok(event)
    }

    #[tokio::test]
    async fn test_consume_complete_turn() {
        let events = futures::stream::iter(vec![
            ok(StreamEvent::Start {
                message_id: "m1".to_string(),
            }),
            ok(StreamEvent::TextStart {
                id: "t1".to_string(),
            }),
            ok(StreamEvent::TextDelta {
                id: "t1".to_string(),
                delta: "hi".to_string(),
            }),
            ok(StreamEvent::TextEnd {
                id: "t1".to_string(),
            }),
            ok(StreamEvent::Finish {
                reason: FinishReason::Stop,
            }),
        ]);
        let mut assembler = MessageAssembler::new();
        let status = consume(&mut assembler, events, &CancellationToken::new()).await;
        assert_eq!(status, MessageStatus::Complete);
        assert_eq!(assembler.message().unwrap().text(), "hi");
    }

    #[tokio::test]
    async fn test_consume_truncated_stream_is_incomplete() {
        let events = futures::stream::iter(vec![ok(StreamEvent::Start {
            message_id: "m1".to_string(),
        })]);
        let mut assembler = MessageAssembler::new();
        let status = consume(&mut assembler, events, &CancellationToken::new()).await;
        assert_eq!(status, MessageStatus::Incomplete);
    }

    #[tokio::test]
    async fn test_consume_transport_error_is_incomplete() {
        let events = futures::stream::iter(vec![
            Ok(StreamEvent::Start {
                message_id: "m1".to_string(),
            }),
            Err("connection reset"),
        ]);
        let mut assembler = MessageAssembler::new();
        let status = consume(&mut assembler, events, &CancellationToken::new()).await;
        assert_eq!(status, MessageStatus::Incomplete);
        let message = assembler.message().unwrap();
        assert_eq!(message.error.as_deref(), Some("transport error: connection reset"));
    }

    #[tokio::test]
    async fn test_consume_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut assembler = MessageAssembler::new();
        let events = futures::stream::pending::<Result<StreamEvent, Infallible>>();
        let status = consume(&mut assembler, events, &cancel).await;
        assert_eq!(status, MessageStatus::Cancelled);
    }
}
