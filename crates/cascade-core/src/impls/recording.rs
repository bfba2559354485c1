//! Recording collaborators: keep every call for later inspection.
//!
//! Used by the test suites to assert on exact progress sequences and messages.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::CorrelationId;
use crate::error::CascadeError;
use crate::ports::{ForegroundIndicator, IndicatorHandle, MessageSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorEvent {
    Started {
        handle: IndicatorHandle,
        id: CorrelationId,
        text: String,
    },
    Updated {
        handle: IndicatorHandle,
        text: String,
    },
    Stopped {
        handle: IndicatorHandle,
    },
}

/// RecordingIndicator stores every indicator call.
///
/// `fail_updates_after(n)` makes the (n+1)-th update return an error, which
/// lets tests drive a process down its failure path.
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    events: Mutex<Vec<IndicatorEvent>>,
    next_handle: AtomicU64,
    fail_after: Mutex<Option<usize>>,
    panic_on_update: AtomicBool,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_updates_after(self, updates: usize) -> Self {
        *self.fail_after.lock().unwrap_or_else(PoisonError::into_inner) = Some(updates);
        self
    }

    pub fn panic_on_update(self) -> Self {
        self.panic_on_update.store(true, Ordering::SeqCst);
        self
    }

    pub fn events(&self) -> Vec<IndicatorEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Texts of every update, in order.
    pub fn updates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                IndicatorEvent::Updated { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn stopped(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, IndicatorEvent::Stopped { .. }))
            .count()
    }

    fn push(&self, event: IndicatorEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl ForegroundIndicator for RecordingIndicator {
    fn start(
        &self,
        id: &CorrelationId,
        initial_text: &str,
    ) -> Result<IndicatorHandle, CascadeError> {
        let handle = IndicatorHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.push(IndicatorEvent::Started {
            handle,
            id: id.clone(),
            text: initial_text.to_string(),
        });
        Ok(handle)
    }

    fn update(&self, handle: IndicatorHandle, text: &str) -> Result<(), CascadeError> {
        if self.panic_on_update.load(Ordering::SeqCst) {
            panic!("indicator exploded");
        }
        let limit = *self.fail_after.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = limit
            && self.updates().len() >= limit
        {
            return Err(CascadeError::Indicator("update rejected".to_string()));
        }
        self.push(IndicatorEvent::Updated {
            handle,
            text: text.to_string(),
        });
        Ok(())
    }

    fn stop(&self, handle: IndicatorHandle) -> Result<(), CascadeError> {
        self.push(IndicatorEvent::Stopped { handle });
        Ok(())
    }
}

/// RecordingSink stores every message shown.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MessageSink for RecordingSink {
    fn show_message(&self, text: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }
}
