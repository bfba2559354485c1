//! LogSink - surfaces stage messages through tracing.

use tracing::info;

use crate::ports::MessageSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn show_message(&self, text: &str) {
        info!(target: "cascade::message", "{text}");
    }
}
