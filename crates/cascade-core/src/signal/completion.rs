use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::DeliveryContext;
use crate::error::CascadeError;

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SignalState<T> {
    latest: Option<T>,
    observers: Vec<(u64, Observer<T>)>,
}

/// Token returned by [`CompletionSignal::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// A latest-wins, replaying broadcast of a single value.
///
/// - `publish`, `subscribe` and `unsubscribe` are marshalled onto the
///   delivery context, so registration and delivery are totally ordered.
/// - Observers run in subscription order.
/// - A subscriber attaching after a publish immediately receives the cached
///   value.
/// - Publishing the value that is already cached is a no-op.
///
/// The mutex only guards the cached value and the observer list; callbacks
/// run after it is released, so an observer may subscribe or unsubscribe
/// without deadlocking.
pub struct CompletionSignal<T> {
    name: String,
    delivery: DeliveryContext,
    state: Arc<Mutex<SignalState<T>>>,
    next_id: AtomicU64,
}

fn lock<T>(state: &Mutex<SignalState<T>>) -> MutexGuard<'_, SignalState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> CompletionSignal<T>
where
    T: Clone + PartialEq + Debug + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, delivery: DeliveryContext) -> Self {
        Self {
            name: name.into(),
            delivery,
            state: Arc::new(Mutex::new(SignalState {
                latest: None,
                observers: Vec::new(),
            })),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last published value, if any.
    pub fn latest(&self) -> Option<T> {
        lock(&self.state).latest.clone()
    }

    pub fn publish(&self, value: T) -> Result<(), CascadeError> {
        let state = Arc::clone(&self.state);
        let name = self.name.clone();
        debug!(signal = %name, ?value, "publish queued");
        self.delivery.post(move || {
            let observers: Vec<Observer<T>> = {
                let mut guard = lock(&state);
                if guard.latest.as_ref() == Some(&value) {
                    debug!(signal = %name, ?value, "value already published, skipping");
                    return;
                }
                guard.latest = Some(value.clone());
                guard.observers.iter().map(|(_, o)| Arc::clone(o)).collect()
            };
            info!(signal = %name, ?value, observers = observers.len(), "signal published");
            for observer in observers {
                observer(&value);
            }
        })
    }

    pub fn subscribe(
        &self,
        observer: impl Fn(&T) + Send + Sync + 'static,
    ) -> Result<Subscription, CascadeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let observer: Observer<T> = Arc::new(observer);
        let state = Arc::clone(&self.state);
        self.delivery.post(move || {
            let replay = {
                let mut guard = lock(&state);
                guard.observers.push((id, Arc::clone(&observer)));
                guard.latest.clone()
            };
            if let Some(value) = replay {
                observer(&value);
            }
        })?;
        Ok(Subscription(id))
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> Result<(), CascadeError> {
        let state = Arc::clone(&self.state);
        self.delivery.post(move || {
            lock(&state).observers.retain(|(id, _)| *id != subscription.0);
        })
    }
}
