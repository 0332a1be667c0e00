// src/io/types.rs
//
// Delivery contract shared by every data source.
// Sources push candidate lines and error messages into a `DataSink`; the
// consumer decides what to do with them.

use tokio::sync::mpsc;

// ============================================================================
// Sink
// ============================================================================

/// Two-channel delivery: data lines and error messages.
///
/// `on_data` is called once per candidate frame line, in arrival order.
/// `on_error` is called at most once per failure episode and never for a
/// benign cancellation (user declined to pick a device, deliberate stop).
pub trait DataSink: Send + Sync {
    fn on_data(&self, line: &str);
    fn on_error(&self, message: &str);
}

/// Message forwarded by `ChannelSink`
#[derive(Clone, Debug, PartialEq)]
pub enum SourceMessage {
    /// One candidate line
    Data(String),
    /// Human-readable failure description
    Error(String),
}

/// Sink that forwards into a tokio channel, for consumers running their own
/// event loop. A closed receiver silently drops messages.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SourceMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<SourceMessage>) -> Self {
        ChannelSink { tx }
    }

    /// Sink plus the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SourceMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl DataSink for ChannelSink {
    fn on_data(&self, line: &str) {
        let _ = self.tx.send(SourceMessage::Data(line.to_string()));
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(SourceMessage::Error(message.to_string()));
    }
}
