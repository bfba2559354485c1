//! MessageSink port - where stage completion messages are surfaced.

/// Fire-and-forget presentation sink.
///
/// Only called from the delivery context, never from a background worker.
pub trait MessageSink: Send + Sync {
    fn show_message(&self, text: &str);
}
