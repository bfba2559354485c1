use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::CascadeError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the delivery context. Cheap to clone; every clone posts into
/// the same FIFO.
#[derive(Clone)]
pub struct DeliveryContext {
    tx: mpsc::UnboundedSender<Job>,
}

impl DeliveryContext {
    /// Spawn the delivery loop on the current tokio runtime.
    ///
    /// The loop runs until every `DeliveryContext` clone is dropped.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let join = tokio::spawn(async move {
            debug!("delivery context started");
            while let Some(job) = rx.recv().await {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("delivery job panicked; continuing with the next job");
                }
            }
            debug!("delivery context stopped");
        });
        (Self { tx }, join)
    }

    /// Queue `job` behind everything posted so far.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Result<(), CascadeError> {
        self.tx
            .send(Box::new(job))
            .map_err(|_| CascadeError::DeliveryClosed)
    }

    /// Resolves once every job posted before this call has run.
    pub async fn flush(&self) -> Result<(), CascadeError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.post(move || {
            let _ = done_tx.send(());
        })?;
        done_rx.await.map_err(|_| CascadeError::DeliveryClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[tokio::test]
    async fn jobs_run_in_post_order() {
        let (ctx, _join) = DeliveryContext::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            ctx.post(move || seen.lock().unwrap().push(i)).unwrap();
        }
        ctx.flush().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn jobs_posted_from_a_job_run_afterwards() {
        let (ctx, _join) = DeliveryContext::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_ctx = ctx.clone();
        let inner_seen = seen.clone();
        ctx.post(move || {
            let nested = inner_seen.clone();
            inner_ctx
                .post(move || nested.lock().unwrap().push("nested"))
                .unwrap();
            inner_seen.lock().unwrap().push("outer");
        })
        .unwrap();
        ctx.flush().await.unwrap();
        ctx.flush().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["outer", "nested"]);
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_loop() {
        let (ctx, _join) = DeliveryContext::spawn();
        let seen = Arc::new(Mutex::new(false));

        ctx.post(|| panic!("observer bug")).unwrap();
        let flag = seen.clone();
        ctx.post(move || *flag.lock().unwrap() = true).unwrap();
        ctx.flush().await.unwrap();

        assert!(*seen.lock().unwrap());
    }

    #[tokio::test]
    async fn post_after_loop_stopped_is_an_error() {
        let (ctx, join) = DeliveryContext::spawn();
        join.abort();
        let _ = join.await;

        assert!(matches!(ctx.post(|| {}), Err(CascadeError::DeliveryClosed)));
    }
}
