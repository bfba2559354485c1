//! Impls - implementations of the ports.
//!
//! # Included
//! - **NetworkMonitor**: watch-backed network reachability toggle
//! - **LogIndicator** / **LogSink**: tracing-backed collaborators for headless runs
//! - **RecordingIndicator** / **RecordingSink**: capture everything for assertions

pub mod log_indicator;
pub mod log_sink;
pub mod network;
pub mod recording;

pub use self::log_indicator::LogIndicator;
pub use self::log_sink::LogSink;
pub use self::network::NetworkMonitor;
pub use self::recording::{IndicatorEvent, RecordingIndicator, RecordingSink};
