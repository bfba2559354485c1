//! Ports: the external collaborators the pipeline talks to.
//!
//! Each trait hides a platform concern (timekeeping, the visible progress
//! indicator, the user-facing message surface, constraint conditions) so the
//! core can be driven by test doubles.

pub mod clock;
pub mod constraint;
pub mod indicator;
pub mod message_sink;

pub use self::clock::{Clock, InstantClock, TokioClock};
pub use self::constraint::ConstraintProvider;
pub use self::indicator::{ForegroundIndicator, IndicatorHandle};
pub use self::message_sink::MessageSink;
