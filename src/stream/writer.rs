//! Producer half of the turn channel

use super::StreamEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Events buffered between producer and receiver before `emit` waits
const CHANNEL_CAPACITY: usize = 64;

/// Why the producer must stop emitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamClosed {
    #[error("turn was cancelled")]
    Cancelled,
    #[error("receiver disconnected")]
    Disconnected,
}

/// Sends events for one turn over a single ordered channel.
///
/// Once the turn's token is cancelled, or the receiver goes away, every
/// further `emit` fails. Events already sent are never recalled.
pub struct StreamWriter {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    sent: usize,
}

/// Create the channel for one turn
pub fn turn_channel(cancel: CancellationToken) -> (StreamWriter, mpsc::Receiver<StreamEvent>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        StreamWriter {
            tx,
            cancel,
            sent: 0,
        },
        rx,
    )
}

impl StreamWriter {
    pub async fn emit(&mut self, event: StreamEvent) -> Result<(), StreamClosed> {
        if self.cancel.is_cancelled() {
            return Err(StreamClosed::Cancelled);
        }

        tokio::select! {
            biased;

            () = self.cancel.cancelled() => Err(StreamClosed::Cancelled),

            sent = self.tx.send(event) => {
                if sent.is_err() {
                    // Nobody is listening any more; treat it as a stop.
                    self.cancel.cancel();
                    return Err(StreamClosed::Disconnected);
                }
                self.sent += 1;
                Ok(())
            }
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Number of events delivered to the channel so far
    pub fn sent(&self) -> usize {
        self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> StreamEvent {
        StreamEvent::Start {
            message_id: "m1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_emit_preserves_order() {
        let (mut writer, mut rx) = turn_channel(CancellationToken::new());
        writer.emit(start()).await.unwrap();
        writer
            .emit(StreamEvent::TextStart {
                id: "t1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(writer.sent(), 2);
        assert_eq!(rx.recv().await, Some(start()));
        assert_eq!(rx.recv().await.map(|e| e.name()), Some("text-start"));
    }

    #[tokio::test]
    async fn test_cancelled_writer_refuses_events() {
        let cancel = CancellationToken::new();
        let (mut writer, mut rx) = turn_channel(cancel.clone());
        writer.emit(start()).await.unwrap();
        cancel.cancel();
        assert_eq!(writer.emit(start()).await, Err(StreamClosed::Cancelled));
        assert_eq!(rx.recv().await, Some(start()));
        drop(writer);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_receiver_cancels_turn() {
        let cancel = CancellationToken::new();
        let (mut writer, rx) = turn_channel(cancel.clone());
        drop(rx);
        assert_eq!(writer.emit(start()).await, Err(StreamClosed::Disconnected));
        assert!(cancel.is_cancelled());
        assert_eq!(writer.sent(), 0);
    }
}
