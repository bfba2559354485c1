use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::queue::TaskQueue;
use crate::runtime::Runtime;

/// Worker group handle.
/// - `request_shutdown` stops every worker from taking new leases
/// - `shutdown_and_join` waits for all workers to exit
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, queue: Arc<dyn TaskQueue>, runtime: Arc<Runtime>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let rt = Arc::clone(&runtime);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, q, rt, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// Request shutdown for all workers.
    /// In-flight handlers are not cancelled; workers just stop taking new leases.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn TaskQueue>,
    runtime: Arc<Runtime>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // lease may wait indefinitely, so race it against shutdown
        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // group handle dropped
                    break;
                }
                continue;
            }
            lease = queue.lease() => lease,
        };

        let Some(lease) = lease else {
            // queue closed
            break;
        };

        let envelope = lease.envelope().clone();
        let task_id = envelope.task_id();
        info!(worker_id, %task_id, task_type = %envelope.task_type(), "running task");

        // Run the handler in its own task so a panic is contained here.
        let rt = Arc::clone(&runtime);
        let result = tokio::spawn(async move { rt.execute(&envelope).await }).await;

        let settled = match result {
            Ok(Ok(output)) => {
                info!(worker_id, %task_id, "task succeeded");
                lease.ack(output)
            }
            Ok(Err(err)) => {
                warn!(worker_id, %task_id, error = %err, "task failed");
                lease.fail(err.to_string())
            }
            Err(join_err) => {
                error!(worker_id, %task_id, error = %join_err, "task handler panicked");
                lease.fail(format!("handler panicked: {join_err}"))
            }
        };
        if let Err(e) = settled {
            error!(worker_id, %task_id, error = %e, "could not record task result");
        }
    }
    debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{Constraints, OutputData, TaskEnvelope, TaskState, TaskType};
    use crate::error::CascadeError;
    use crate::impls::NetworkMonitor;
    use crate::queue::InMemoryTaskQueue;
    use crate::runtime::{HandlerRegistry, TaskHandler};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl TaskHandler for Counting {
        async fn handle(&self, _envelope: &TaskEnvelope) -> Result<OutputData, CascadeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(OutputData::new())
        }
    }

    struct Panicking;

    #[async_trait]
    impl TaskHandler for Panicking {
        async fn handle(&self, _envelope: &TaskEnvelope) -> Result<OutputData, CascadeError> {
            panic!("handler bug");
        }
    }

    fn setup(registry: HandlerRegistry, workers: usize) -> (Arc<InMemoryTaskQueue>, WorkerGroup) {
        let queue = Arc::new(InMemoryTaskQueue::new(Arc::new(NetworkMonitor::connected())));
        let group = WorkerGroup::spawn(
            workers,
            queue.clone(),
            Arc::new(Runtime::new(Arc::new(registry))),
        );
        (queue, group)
    }

    async fn terminal(queue: &InMemoryTaskQueue, handle: crate::queue::TaskHandle) -> TaskState {
        let mut watch = queue.observe(handle).unwrap();
        tokio::time::timeout(Duration::from_secs(1), watch.wait_terminal())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn workers_run_each_task_exactly_once() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let mut reg = HandlerRegistry::new();
        reg.register(TaskType::new("count"), counter.clone()).unwrap();
        let (queue, group) = setup(reg, 4);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let env = TaskEnvelope::new(TaskType::new("count"), Constraints::none());
            handles.push(queue.enqueue(env, None).unwrap());
        }
        for h in handles {
            assert_eq!(terminal(&queue, h).await, TaskState::Succeeded);
        }

        assert_eq!(counter.0.load(Ordering::SeqCst), 10);
        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn handler_panic_marks_task_failed_and_worker_survives() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskType::new("panic"), Arc::new(Panicking)).unwrap();
        reg.register(TaskType::new("count"), Arc::new(Counting(AtomicUsize::new(0))))
            .unwrap();
        let (queue, group) = setup(reg, 1);

        let bad = queue
            .enqueue(TaskEnvelope::new(TaskType::new("panic"), Constraints::none()), None)
            .unwrap();
        let good = queue
            .enqueue(TaskEnvelope::new(TaskType::new("count"), Constraints::none()), None)
            .unwrap();

        assert_eq!(terminal(&queue, bad).await, TaskState::Failed);
        assert_eq!(terminal(&queue, good).await, TaskState::Succeeded);
        assert!(queue.info(bad).unwrap().last_error.unwrap().contains("panicked"));
        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn missing_handler_fails_the_task() {
        let (queue, group) = setup(HandlerRegistry::new(), 1);
        let h = queue
            .enqueue(TaskEnvelope::new(TaskType::new("nobody"), Constraints::none()), None)
            .unwrap();

        assert_eq!(terminal(&queue, h).await, TaskState::Failed);
        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn closing_the_queue_stops_workers() {
        let (queue, group) = setup(HandlerRegistry::new(), 2);
        queue.close();
        tokio::time::timeout(Duration::from_secs(1), group.shutdown_and_join())
            .await
            .unwrap();
    }
}
