use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// One human-readable progress/log event.
#[derive(Debug, Clone)]
pub struct SinkEvent {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Append-only notification channel from the run loop to its consumer.
///
/// `append` never blocks and is safe from any execution context; the single
/// consumer drains the receiver on its own tick. Events whose message
/// mentions an error or failure are expected to be durably logged by the
/// consumer.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl EventSink {
    /// Create a sink and the receiver its consumer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Append one event. Events emitted after the consumer is gone are
    /// silently dropped.
    pub fn append(&self, message: impl Into<String>) {
        let _ = self.tx.send(SinkEvent {
            at: Utc::now(),
            message: message.into(),
        });
    }
}
