//! Orchestrator - the composition root of the chain.
//!
//! Turns task terminal states and signal publishes into the actions listed in
//! a [`ChainTable`]. Every decision runs on the delivery context, one at a
//! time, in the order the underlying events were posted.

pub mod table;

pub use table::{Action, ChainTable, IdSource, Rule, StageName, TaskTemplate, Trigger};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::{CorrelationId, TaskEnvelope, TaskState};
use crate::error::CascadeError;
use crate::ports::MessageSink;
use crate::process::{BackgroundProcess, ProcessExit};
use crate::queue::{TaskHandle, TaskQueue};
use crate::signal::{CompletionSignal, DeliveryContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainStatus {
    /// `start` has not been called.
    Idle,
    Running,
    /// The terminal rule fired.
    Finished,
    /// A task did not succeed or a process did not complete.
    Stalled { stage: StageName },
}

impl ChainStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Finished | Self::Stalled { .. })
    }
}

/// One fired rule.
#[derive(Debug, Clone, Serialize)]
pub struct ChainEvent {
    pub rule: usize,
    pub trigger: Trigger,
    pub action: Action,
    pub correlation_id: CorrelationId,
    pub at: DateTime<Utc>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wires a [`ChainTable`] to its collaborators.
///
/// # Example
/// ```ignore
/// let orchestrator = Orchestrator::builder(table, queue, delivery, sink)
///     .process("process_1", process_1)
///     .process("process_2", process_2)
///     .build()?;
/// orchestrator.start(CorrelationId::from("001"))?;
/// let status = orchestrator.wait_until_settled().await;
/// ```
pub struct OrchestratorBuilder {
    table: ChainTable,
    queue: Arc<dyn TaskQueue>,
    delivery: DeliveryContext,
    sink: Arc<dyn MessageSink>,
    processes: HashMap<StageName, BackgroundProcess>,
}

impl OrchestratorBuilder {
    /// Register a process under its stage name. Its signal is registered
    /// under the signal's own name.
    pub fn process(mut self, stage: impl Into<String>, process: BackgroundProcess) -> Self {
        self.processes.insert(StageName::new(stage), process);
        self
    }

    /// Fails if the table names a process or signal that was not registered.
    pub fn build(self) -> Result<Orchestrator, CascadeError> {
        let signals: HashMap<StageName, Arc<CompletionSignal<CorrelationId>>> = self
            .processes
            .values()
            .map(|p| (StageName::new(p.signal().name()), Arc::clone(p.signal())))
            .collect();

        for rule in &self.table.rules {
            match &rule.trigger {
                Trigger::SignalPublished(name) if !signals.contains_key(name) => {
                    return Err(CascadeError::UnknownStage(name.to_string()));
                }
                Trigger::TaskSucceeded(name) if self.table.template(name).is_none() => {
                    return Err(CascadeError::UnknownStage(name.to_string()));
                }
                _ => {}
            }
            match &rule.action {
                Action::EnqueueTask(name) if self.table.template(name).is_none() => {
                    return Err(CascadeError::UnknownStage(name.to_string()));
                }
                Action::LaunchProcess { process, .. } if !self.processes.contains_key(process) => {
                    return Err(CascadeError::UnknownStage(process.to_string()));
                }
                _ => {}
            }
        }
        if let Some(missing) = self
            .table
            .initial
            .iter()
            .find(|s| self.table.template(s).is_none())
        {
            return Err(CascadeError::UnknownStage(missing.to_string()));
        }

        let (status, _) = watch::channel(ChainStatus::Idle);
        Ok(Orchestrator {
            inner: Arc::new(Inner {
                table: self.table,
                queue: self.queue,
                delivery: self.delivery,
                sink: self.sink,
                processes: self.processes,
                signals,
                started: AtomicBool::new(false),
                actioned: Mutex::new(HashSet::new()),
                journal: Mutex::new(Vec::new()),
                status,
            }),
        })
    }
}

pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    table: ChainTable,
    queue: Arc<dyn TaskQueue>,
    delivery: DeliveryContext,
    sink: Arc<dyn MessageSink>,
    processes: HashMap<StageName, BackgroundProcess>,
    signals: HashMap<StageName, Arc<CompletionSignal<CorrelationId>>>,
    started: AtomicBool,
    /// (rule index, correlation id) pairs that already fired.
    actioned: Mutex<HashSet<(usize, CorrelationId)>>,
    journal: Mutex<Vec<ChainEvent>>,
    status: watch::Sender<ChainStatus>,
}

impl Orchestrator {
    pub fn builder(
        table: ChainTable,
        queue: Arc<dyn TaskQueue>,
        delivery: DeliveryContext,
        sink: Arc<dyn MessageSink>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            table,
            queue,
            delivery,
            sink,
            processes: HashMap::new(),
        }
    }

    /// Subscribe to every signal the table listens to and enqueue the
    /// initial chain. Only the first call does anything.
    pub fn start(&self, id: CorrelationId) -> Result<Vec<TaskHandle>, CascadeError> {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::SeqCst) {
            warn!(correlation_id = %id, "chain already started");
            return Ok(Vec::new());
        }
        info!(correlation_id = %id, "starting chain");
        inner.status.send_replace(ChainStatus::Running);

        inner.begin(&id).inspect_err(|e| {
            error!(correlation_id = %id, error = %e, "chain could not start");
            let stage = inner
                .table
                .initial
                .first()
                .cloned()
                .unwrap_or_else(|| StageName::new("orchestrator"));
            inner.stall(&stage);
        })
    }

    pub fn status(&self) -> ChainStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChainStatus> {
        self.inner.status.subscribe()
    }

    /// Wait until the chain finishes or stalls.
    pub async fn wait_until_settled(&self) -> ChainStatus {
        let mut rx = self.inner.status.subscribe();
        match rx.wait_for(ChainStatus::is_settled).await {
            Ok(status) => status.clone(),
            // sender lives in `inner`, which we hold
            Err(_) => self.status(),
        }
    }

    /// Rules fired so far, in firing order.
    pub fn journal(&self) -> Vec<ChainEvent> {
        lock(&self.inner.journal).clone()
    }
}

impl Inner {
    /// Subscribe to the table's signals, then enqueue and watch the initial chain.
    fn begin(self: &Arc<Self>, id: &CorrelationId) -> Result<Vec<TaskHandle>, CascadeError> {
        for name in self.table.signals() {
            let signal = self
                .signals
                .get(&name)
                .ok_or_else(|| CascadeError::UnknownStage(name.to_string()))?;
            let weak: Weak<Inner> = Arc::downgrade(self);
            let trigger = Trigger::SignalPublished(name.clone());
            signal.subscribe(move |value: &CorrelationId| {
                if let Some(inner) = weak.upgrade() {
                    inner.fire(&trigger, value);
                }
            })?;
        }

        let mut envelopes = Vec::with_capacity(self.table.initial.len());
        for stage in &self.table.initial {
            envelopes.push(self.envelope(stage, id)?);
        }
        let handles = self.queue.enqueue_chain(envelopes)?;
        for (stage, handle) in self.table.initial.iter().zip(&handles) {
            self.watch_task(stage.clone(), id.clone(), *handle)?;
        }
        Ok(handles)
    }

    fn envelope(&self, stage: &StageName, id: &CorrelationId) -> Result<TaskEnvelope, CascadeError> {
        let template = self
            .table
            .template(stage)
            .ok_or_else(|| CascadeError::UnknownStage(stage.to_string()))?;
        Ok(TaskEnvelope::new(template.task_type.clone(), template.constraints).with_correlation_id(id))
    }

    /// Report the task's terminal state back onto the delivery context.
    fn watch_task(
        self: &Arc<Self>,
        stage: StageName,
        id: CorrelationId,
        handle: TaskHandle,
    ) -> Result<(), CascadeError> {
        let mut states = self.queue.observe(handle)?;
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let state = states.wait_terminal().await;
            let delivery = inner.delivery.clone();
            if let Err(e) = delivery.post(move || inner.on_task_finished(&stage, &id, state)) {
                error!(%handle, error = %e, "could not report task state");
            }
        });
        Ok(())
    }

    fn on_task_finished(
        self: &Arc<Self>,
        stage: &StageName,
        id: &CorrelationId,
        state: Option<TaskState>,
    ) {
        match state {
            Some(TaskState::Succeeded) => {
                info!(%stage, correlation_id = %id, "task succeeded");
                self.fire(&Trigger::TaskSucceeded(stage.clone()), id);
            }
            other => {
                warn!(%stage, correlation_id = %id, state = ?other, "task did not succeed");
                self.stall(stage);
            }
        }
    }

    /// Run every rule for `trigger` that has not fired for `id` yet.
    /// Called on the delivery context only.
    fn fire(self: &Arc<Self>, trigger: &Trigger, id: &CorrelationId) {
        for (index, rule) in self.table.rules_for(trigger) {
            if !lock(&self.actioned).insert((index, id.clone())) {
                debug!(rule = index, ?trigger, correlation_id = %id, "already actioned, skipping");
                continue;
            }

            self.sink.show_message(&rule.render_message(id));
            lock(&self.journal).push(ChainEvent {
                rule: index,
                trigger: trigger.clone(),
                action: rule.action.clone(),
                correlation_id: id.clone(),
                at: Utc::now(),
            });

            if let Err(e) = self.apply(&rule.action, id) {
                error!(rule = index, error = %e, "action failed");
                let stage = match &rule.action {
                    Action::EnqueueTask(stage) => stage.clone(),
                    Action::LaunchProcess { process, .. } => process.clone(),
                    Action::Notify | Action::Finish => StageName::new("orchestrator"),
                };
                self.stall(&stage);
            }
        }
    }

    fn apply(self: &Arc<Self>, action: &Action, id: &CorrelationId) -> Result<(), CascadeError> {
        match action {
            Action::Notify => Ok(()),
            Action::EnqueueTask(stage) => {
                let envelope = self.envelope(stage, id)?;
                let handle = self.queue.enqueue(envelope, None)?;
                info!(%stage, %handle, correlation_id = %id, "task enqueued");
                self.watch_task(stage.clone(), id.clone(), handle)
            }
            Action::LaunchProcess { process, id: source } => {
                let target = self
                    .processes
                    .get(process)
                    .ok_or_else(|| CascadeError::UnknownStage(process.to_string()))?;
                let launch_id = match source {
                    IdSource::Trigger => id.clone(),
                    IdSource::Fixed(fixed) => fixed.clone(),
                };
                let handle = target.launch(Some(launch_id));

                // Completion arrives through the signal; only a failed exit needs reporting.
                let inner = Arc::clone(self);
                let stage = process.clone();
                tokio::spawn(async move {
                    let exit = handle.wait().await;
                    if matches!(exit, ProcessExit::Completed(_)) {
                        return;
                    }
                    warn!(process = %stage, ?exit, "process did not complete");
                    let delivery = inner.delivery.clone();
                    if let Err(e) = delivery.post(move || inner.stall(&stage)) {
                        error!(error = %e, "could not report process exit");
                    }
                });
                Ok(())
            }
            Action::Finish => {
                info!(correlation_id = %id, "chain finished");
                self.status.send_replace(ChainStatus::Finished);
                Ok(())
            }
        }
    }

    fn stall(&self, stage: &StageName) {
        self.status.send_if_modified(|status| {
            if status.is_settled() {
                return false;
            }
            *status = ChainStatus::Stalled {
                stage: stage.clone(),
            };
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{Constraints, OutputData};
    use crate::impls::{NetworkMonitor, RecordingIndicator, RecordingSink};
    use crate::ports::InstantClock;
    use crate::process::CountdownSettings;
    use crate::queue::InMemoryTaskQueue;

    struct Fixture {
        queue: Arc<InMemoryTaskQueue>,
        delivery: DeliveryContext,
        sink: Arc<RecordingSink>,
        process_1: BackgroundProcess,
        process_2: BackgroundProcess,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_indicator(RecordingIndicator::new())
        }

        fn with_indicator(indicator: RecordingIndicator) -> Self {
            let (delivery, _join) = DeliveryContext::spawn();
            let indicator = Arc::new(indicator);
            let clock = Arc::new(InstantClock::new());
            let settings = CountdownSettings {
                start: 2,
                tick: Duration::from_millis(1),
            };
            let process = |n: &str, s: &str| {
                BackgroundProcess::new(
                    n,
                    Arc::new(CompletionSignal::new(s, delivery.clone())),
                    indicator.clone(),
                    clock.clone(),
                    settings,
                )
            };
            Self {
                queue: Arc::new(InMemoryTaskQueue::new(Arc::new(NetworkMonitor::connected()))),
                sink: Arc::new(RecordingSink::new()),
                process_1: process("process_1", "signal_1"),
                process_2: process("process_2", "signal_2"),
                delivery,
            }
        }

        fn table() -> ChainTable {
            ChainTable::reference(Constraints::none(), "002".into())
        }

        fn builder(&self, table: ChainTable) -> OrchestratorBuilder {
            Orchestrator::builder(
                table,
                self.queue.clone(),
                self.delivery.clone(),
                self.sink.clone(),
            )
        }

        fn orchestrator(&self) -> Orchestrator {
            self.builder(Self::table())
                .process("process_1", self.process_1.clone())
                .process("process_2", self.process_2.clone())
                .build()
                .unwrap()
        }
    }

    #[tokio::test]
    async fn build_rejects_unregistered_process() {
        let f = Fixture::new();
        let err = f
            .builder(Fixture::table())
            .process("process_1", f.process_1.clone())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, CascadeError::UnknownStage(ref s) if s == "signal_2" || s == "process_2"));
    }

    #[tokio::test]
    async fn start_enqueues_initial_chain_with_correlation_id() {
        let f = Fixture::new();
        let orchestrator = f.orchestrator();
        assert_eq!(orchestrator.status(), ChainStatus::Idle);

        let handles = orchestrator.start("001".into()).unwrap();

        assert_eq!(handles.len(), 2);
        assert_eq!(orchestrator.status(), ChainStatus::Running);
        let first = f.queue.info(handles[0]).unwrap();
        assert_eq!(first.task_type, "task_a");
        assert_eq!(first.input.get("correlation_id").map(String::as_str), Some("001"));
        assert_eq!(f.queue.info(handles[1]).unwrap().depends_on, Some(handles[0].id().to_string()));
    }

    #[tokio::test]
    async fn second_start_is_ignored() {
        let f = Fixture::new();
        let orchestrator = f.orchestrator();
        orchestrator.start("001".into()).unwrap();
        assert!(orchestrator.start("001".into()).unwrap().is_empty());
        assert_eq!(f.queue.counts_by_state().pending, 2);
    }

    #[tokio::test]
    async fn replayed_signal_fires_once() {
        let f = Fixture::new();
        let orchestrator = f.orchestrator();
        orchestrator.start("001".into()).unwrap();

        let signal = f.process_1.signal().clone();
        signal.publish("001".into()).unwrap();
        f.delivery.flush().await.unwrap();
        // a late subscriber gets the cached value again
        signal.subscribe(|_| {}).unwrap();
        f.delivery.flush().await.unwrap();
        orchestrator.inner.fire(&Trigger::SignalPublished("signal_1".into()), &"001".into());

        let enqueued: Vec<_> = orchestrator
            .journal()
            .into_iter()
            .filter(|e| e.action == Action::EnqueueTask("task_c".into()))
            .collect();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(
            f.sink.messages(),
            vec!["Process for Notification Channel ID 001 is done!".to_string()]
        );
        // task_a, task_b and task_c
        assert_eq!(f.queue.counts_by_state().pending, 3);
    }

    #[tokio::test]
    async fn failed_task_stalls_the_chain() {
        let f = Fixture::new();
        let orchestrator = f.orchestrator();
        orchestrator.start("001".into()).unwrap();

        let lease = f.queue.lease().await.unwrap();
        assert_eq!(lease.envelope().task_type().as_str(), "task_a");
        lease.fail("boom".into()).unwrap();

        let status = tokio::time::timeout(Duration::from_secs(1), orchestrator.wait_until_settled())
            .await
            .unwrap();
        // task_b is cancelled by the queue; whichever report lands first wins
        assert!(matches!(status, ChainStatus::Stalled { .. }));
        assert!(orchestrator.journal().is_empty());
        assert!(f.sink.messages().is_empty());
    }

    #[tokio::test]
    async fn task_success_fires_its_rule() {
        let f = Fixture::new();
        let orchestrator = f.orchestrator();
        orchestrator.start("001".into()).unwrap();

        f.queue.lease().await.unwrap().ack(OutputData::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.delivery.flush().await.unwrap();

        assert_eq!(f.sink.messages(), vec!["First process is done".to_string()]);
        let journal = orchestrator.journal();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].trigger, Trigger::TaskSucceeded("task_a".into()));
        assert_eq!(orchestrator.status(), ChainStatus::Running);
    }

    #[tokio::test]
    async fn failed_process_stalls_before_task_c() {
        let f = Fixture::with_indicator(RecordingIndicator::new().fail_updates_after(1));
        let orchestrator = f.orchestrator();
        orchestrator.start("001".into()).unwrap();

        for _ in 0..2 {
            let lease = tokio::time::timeout(Duration::from_secs(1), f.queue.lease())
                .await
                .unwrap()
                .unwrap();
            lease.ack(OutputData::new()).unwrap();
        }

        let status = tokio::time::timeout(Duration::from_secs(1), orchestrator.wait_until_settled())
            .await
            .unwrap();
        assert_eq!(
            status,
            ChainStatus::Stalled {
                stage: "process_1".into()
            }
        );
        assert_eq!(
            f.sink.messages(),
            vec![
                "First process is done".to_string(),
                "Second process is done".to_string()
            ]
        );
        assert!(f.process_1.signal().latest().is_none());
        let counts = f.queue.counts_by_state();
        assert_eq!((counts.succeeded, counts.pending), (2, 0));
        assert!(
            !orchestrator
                .journal()
                .iter()
                .any(|e| matches!(e.action, Action::EnqueueTask(_)))
        );
    }

    #[tokio::test]
    async fn start_on_closed_queue_stalls_instead_of_hanging() {
        let f = Fixture::new();
        let orchestrator = f.orchestrator();
        f.queue.close();

        let err = orchestrator.start("001".into()).unwrap_err();
        assert!(matches!(err, CascadeError::QueueClosed));

        let status = tokio::time::timeout(Duration::from_millis(200), orchestrator.wait_until_settled())
            .await
            .unwrap();
        assert_eq!(
            status,
            ChainStatus::Stalled {
                stage: "task_a".into()
            }
        );
    }

    #[tokio::test]
    async fn stalled_chain_stays_stalled() {
        let f = Fixture::new();
        let orchestrator = f.orchestrator();
        orchestrator.start("001".into()).unwrap();

        orchestrator.inner.stall(&"task_a".into());
        orchestrator.inner.stall(&"task_b".into());

        assert_eq!(
            orchestrator.status(),
            ChainStatus::Stalled {
                stage: "task_a".into()
            }
        );
    }
}
