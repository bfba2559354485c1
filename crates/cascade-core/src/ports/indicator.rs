//! ForegroundIndicator port - the visible progress surface of a background process.

use crate::domain::CorrelationId;
use crate::error::CascadeError;

/// Opaque handle to a started indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndicatorHandle(u64);

impl IndicatorHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// ForegroundIndicator keeps a long-running process visible while it works.
///
/// Channel, priority and icon metadata are the implementation's business;
/// the core only starts, updates and stops an indicator.
pub trait ForegroundIndicator: Send + Sync {
    fn start(
        &self,
        id: &CorrelationId,
        initial_text: &str,
    ) -> Result<IndicatorHandle, CascadeError>;

    fn update(&self, handle: IndicatorHandle, text: &str) -> Result<(), CascadeError>;

    fn stop(&self, handle: IndicatorHandle) -> Result<(), CascadeError>;
}
