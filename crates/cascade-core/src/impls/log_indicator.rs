//! LogIndicator - renders the foreground indicator as log lines.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::domain::CorrelationId;
use crate::error::CascadeError;
use crate::ports::{ForegroundIndicator, IndicatorHandle};

#[derive(Debug, Default)]
pub struct LogIndicator {
    next_handle: AtomicU64,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ForegroundIndicator for LogIndicator {
    fn start(
        &self,
        id: &CorrelationId,
        initial_text: &str,
    ) -> Result<IndicatorHandle, CascadeError> {
        let handle = IndicatorHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        info!(indicator = handle.raw(), correlation_id = %id, "{initial_text}");
        Ok(handle)
    }

    fn update(&self, handle: IndicatorHandle, text: &str) -> Result<(), CascadeError> {
        info!(indicator = handle.raw(), "{text}");
        Ok(())
    }

    fn stop(&self, handle: IndicatorHandle) -> Result<(), CascadeError> {
        info!(indicator = handle.raw(), "indicator removed");
        Ok(())
    }
}
