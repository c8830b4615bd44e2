//! `HandlerExecutor`: owns two bounded queues, admits tasks, serializes
//! queue processing behind a single mutex (the single-writer discipline),
//! and dispatches Pending tasks to a `TaskHandler` under a bounded
//! concurrency cap.

pub mod handler;

pub use handler::TaskHandler;

use crate::config::{ExecutorConfig, PersistenceStrategy};
use crate::error::{CoreError, SubmitError};
use crate::task::{DurableQueueStore, QueueKind, Task, TaskKind, TaskStatus};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, error};

type Entry = Arc<Mutex<Task>>;

struct Inner {
    execution_queue: VecDeque<Entry>,
    waiting_queue: VecDeque<Entry>,
    dirty: bool,
}

impl Inner {
    fn empty() -> Self {
        Self {
            execution_queue: VecDeque::new(),
            waiting_queue: VecDeque::new(),
            dirty: false,
        }
    }
}

/// Delivers a task's terminal (Completed/Failed) state once `run_admitted`
/// has recorded the transition. Invoked outside any executor lock, so
/// implementations are free to take their own locks or await further I/O.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn on_task_completed(&self, task: &Task);
}

/// Object-safe facade the `Dispatcher` routes tasks through, since it
/// holds executors behind differently-typed `HandlerExecutor<H>`s.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;
    fn supported_kinds(&self) -> &[TaskKind];
    async fn submit(&self, task: Task) -> Result<(), SubmitError>;
    async fn start(&self);
    /// Registers the sink notified after each task's Completed/Failed
    /// transition. Replaces any previously registered sink.
    async fn set_completion_sink(&self, sink: Arc<dyn CompletionSink>);
}

pub struct HandlerExecutor<H: TaskHandler> {
    config: ExecutorConfig,
    handler: Arc<H>,
    store: Arc<DurableQueueStore>,
    inner: Arc<Mutex<Inner>>,
    in_flight: Arc<AtomicUsize>,
    completion_sink: Arc<StdMutex<Option<Arc<dyn CompletionSink>>>>,
    started: Arc<AtomicBool>,
}

impl<H: TaskHandler> HandlerExecutor<H> {
    pub fn new(config: ExecutorConfig, handler: H, store: Arc<DurableQueueStore>) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            store,
            inner: Arc::new(Mutex::new(Inner::empty())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            completion_sink: Arc::new(StdMutex::new(None)),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Snapshot queue depths and in-flight count, mostly useful for tests
    /// asserting queue-capacity and concurrency invariants.
    pub async fn stats(&self) -> ExecutorStats {
        let inner = self.inner.lock().await;
        ExecutorStats {
            execution_len: inner.execution_queue.len(),
            waiting_len: inner.waiting_queue.len(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
        }
    }

    async fn has_pending_work(&self) -> bool {
        let inner = self.inner.lock().await;
        if !inner.waiting_queue.is_empty() {
            return true;
        }
        for entry in inner.execution_queue.iter() {
            if entry.lock().await.status() != TaskStatus::Completed
                && entry.lock().await.status() != TaskStatus::Failed
            {
                return true;
            }
        }
        false
    }

    /// Loads persisted tasks and purges expired ones. A `None` strategy
    /// leaves queues empty; `FixedCount` is reserved and currently behaves
    /// like `None`.
    async fn load_and_purge(&self) {
        let limit = match self.config.persistence {
            PersistenceStrategy::FixedDuration(d) => d,
            PersistenceStrategy::None | PersistenceStrategy::FixedCount(_) => return,
        };

        let mut exec_tasks = self.store.load_queue(&self.config.name, QueueKind::Execution).await;
        let mut wait_tasks = self.store.load_queue(&self.config.name, QueueKind::Waiting).await;

        let exec_before = exec_tasks.len();
        let wait_before = wait_tasks.len();
        exec_tasks.retain(|t| !t.is_expired(limit));
        wait_tasks.retain(|t| !t.is_expired(limit));

        // No process was actually running an `Executing` task across the
        // restart; re-admit it as `Pending` rather than trust stale state.
        for task in exec_tasks.iter_mut().chain(wait_tasks.iter_mut()) {
            task.reset_to_pending();
        }

        let mut inner = self.inner.lock().await;
        inner.execution_queue = exec_tasks.into_iter().map(|t| Arc::new(Mutex::new(t))).collect();
        inner.waiting_queue = wait_tasks.into_iter().map(|t| Arc::new(Mutex::new(t))).collect();
        if inner.execution_queue.len() != exec_before || inner.waiting_queue.len() != wait_before {
            inner.dirty = true;
            debug!(handler = %self.config.name, "purged expired tasks on load");
        }
    }

    /// A single pass of compact -> admit -> promote -> persist. Returns
    /// `Err` only for unexpected internal failures; today every fallible
    /// step already degrades gracefully (persistence is best-effort), so
    /// this is always `Ok` — kept fallible so the processing loop's
    /// error-backoff path has somewhere to attach.
    pub async fn process_once(&self) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;

        // (a) compact: drop terminal tasks from the execution queue.
        let before_len = inner.execution_queue.len();
        let mut retained = VecDeque::with_capacity(inner.execution_queue.len());
        let drained: Vec<Entry> = inner.execution_queue.drain(..).collect();
        for entry in drained {
            let terminal = entry.lock().await.status().is_terminal();
            if !terminal {
                retained.push_back(entry);
            }
        }
        inner.execution_queue = retained;
        if inner.execution_queue.len() != before_len {
            inner.dirty = true;
        }

        // (b) admit pending tasks up to max_concurrency, without waiting
        // for them to finish. Validation and the Pending->Executing
        // transition happen inline (cheap, no I/O) so that once this
        // function returns, every admitted task is already visibly
        // Executing; only the handler's `execute` runs concurrently.
        for entry in inner.execution_queue.iter() {
            if self.in_flight.load(Ordering::SeqCst) >= self.config.max_concurrency {
                break;
            }
            if entry.lock().await.status() != TaskStatus::Pending {
                continue;
            }
            match try_admit(entry, &self.handler).await {
                AdmitOutcome::Admitted => {
                    self.in_flight.fetch_add(1, Ordering::SeqCst);
                    let handler = self.handler.clone();
                    let task_entry = entry.clone();
                    let inner_for_release = self.inner.clone();
                    let in_flight = self.in_flight.clone();
                    let sink = self.completion_sink.lock().unwrap().clone();
                    tokio::spawn(async move {
                        let release = InFlightGuard::new(in_flight.clone());
                        run_admitted(handler, task_entry, sink).await;
                        release.disarm();
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        let mut guard = inner_for_release.lock().await;
                        guard.dirty = true;
                    });
                }
                AdmitOutcome::Rejected => inner.dirty = true,
            }
        }

        // (c) promote waiting tasks into the execution queue FIFO.
        let mut moved = false;
        while inner.execution_queue.len() < self.config.exec_cap {
            match inner.waiting_queue.pop_front() {
                Some(entry) => {
                    inner.execution_queue.push_back(entry);
                    moved = true;
                }
                None => break,
            }
        }
        if moved {
            inner.dirty = true;
        }

        // (d) best-effort persist.
        if inner.dirty {
            let exec_snapshot = snapshot(&inner.execution_queue).await;
            let wait_snapshot = snapshot(&inner.waiting_queue).await;
            self.store.save_queue(&self.config.name, QueueKind::Execution, &exec_snapshot).await;
            self.store.save_queue(&self.config.name, QueueKind::Waiting, &wait_snapshot).await;
            inner.dirty = false;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorStats {
    pub execution_len: usize,
    pub waiting_len: usize,
    pub in_flight: usize,
}

async fn snapshot(queue: &VecDeque<Entry>) -> Vec<Task> {
    let mut out = Vec::with_capacity(queue.len());
    for entry in queue {
        out.push(entry.lock().await.clone());
    }
    out
}

/// Releases one `in_flight` slot on drop unless `disarm`ed first. Armed for
/// the duration of `run_admitted`'s `.await` so a panic inside a handler
/// still frees the slot during unwind, instead of leaking it forever; the
/// normal-completion path disarms it and decrements explicitly so the
/// decrement and the `dirty` flag it precedes stay visibly paired.
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl InFlightGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        Self { counter, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

enum AdmitOutcome {
    /// Validated and transitioned to Executing; the caller owns spawning
    /// its concurrent execution.
    Admitted,
    /// Failed validation (or was already marked Failed); the caller does
    /// not spawn anything, but should still persist the change.
    Rejected,
}

/// Validates a task and transitions it to Executing. Synchronous and
/// lock-bounded on purpose: this is the part of a task's lifecycle that
/// must be visible the instant `process_once` returns, so tests (and
/// restarts) never observe a task that was "admitted" but still looks
/// Pending.
async fn try_admit<H: TaskHandler>(entry: &Entry, handler: &H) -> AdmitOutcome {
    let mut task = entry.lock().await;
    if task.status() != TaskStatus::Pending {
        return AdmitOutcome::Rejected;
    }
    if let Err(e) = task.validate_params() {
        task.mark_failed(e);
        return AdmitOutcome::Rejected;
    }
    if let Err(e) = handler.validate_params(&task) {
        task.mark_failed(e);
        return AdmitOutcome::Rejected;
    }
    if let Err(e) = task.mark_executing() {
        task.mark_failed(e);
        return AdmitOutcome::Rejected;
    }
    AdmitOutcome::Admitted
}

/// Runs before_execute/execute/after_execute and the final Completed/Failed
/// transition, as an independent concurrent operation once `try_admit` has
/// transitioned the task to Executing. Releasing `in_flight` happens in
/// the caller. Notifies `sink`, if any, with the finished task once the
/// transition is recorded.
async fn run_admitted<H: TaskHandler>(handler: Arc<H>, entry: Entry, sink: Option<Arc<dyn CompletionSink>>) {
    // Handler calls operate on an immutable snapshot; the live Task stays
    // lock-free for the duration of potentially slow I/O.
    let snapshot = entry.lock().await.clone();

    if let Err(e) = handler.before_execute(&snapshot).await {
        error!(key = snapshot.key(), error = %e, "before_execute failed");
        let finished = {
            let mut task = entry.lock().await;
            task.mark_failed(e);
            task.clone()
        };
        if let Some(sink) = sink {
            sink.on_task_completed(&finished).await;
        }
        return;
    }

    let result = handler.execute(&snapshot).await;
    handler.after_execute(&snapshot, &result).await;

    let finished = {
        let mut task = entry.lock().await;
        match result {
            Ok(value) => task.mark_completed(value),
            Err(e) => task.mark_failed(e),
        }
        task.clone()
    };

    if let Some(sink) = sink {
        sink.on_task_completed(&finished).await;
    }
}

#[async_trait]
impl<H: TaskHandler> Executor for HandlerExecutor<H> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supported_kinds(&self) -> &[TaskKind] {
        self.handler.supported_kinds()
    }

    /// Rejects unknown kinds, then tries the execution queue, then the
    /// waiting queue, else `QueueFull`. The task is not retained on failure.
    async fn submit(&self, task: Task) -> Result<(), SubmitError> {
        if !self.handler.supported_kinds().contains(task.kind()) {
            return Err(SubmitError::UnsupportedKind(task.kind().to_string()));
        }

        let mut inner = self.inner.lock().await;
        if inner.execution_queue.len() < self.config.exec_cap {
            inner.execution_queue.push_back(Arc::new(Mutex::new(task)));
            inner.dirty = true;
            Ok(())
        } else if inner.waiting_queue.len() < self.config.wait_cap {
            inner.waiting_queue.push_back(Arc::new(Mutex::new(task)));
            inner.dirty = true;
            Ok(())
        } else {
            Err(SubmitError::QueueFull)
        }
    }

    /// Idempotently launches the processing loop after loading persisted
    /// queues and purging expired tasks.
    async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.load_and_purge().await;

        let config = self.config.clone();
        let handler = self.handler.clone();
        let store = self.store.clone();
        let inner = self.inner.clone();
        let in_flight = self.in_flight.clone();
        let completion_sink = self.completion_sink.clone();
        let name = self.config.name.clone();

        tokio::spawn(async move {
            let executor = HandlerExecutor::<H> {
                config,
                handler,
                store,
                inner,
                in_flight,
                completion_sink,
                started: Arc::new(AtomicBool::new(true)),
            };
            loop {
                if !executor.has_pending_work().await {
                    tokio::time::sleep(executor.config.timing.idle_backoff).await;
                    continue;
                }
                match executor.process_once().await {
                    Ok(()) => tokio::time::sleep(executor.config.timing.yield_delay).await,
                    Err(e) => {
                        error!(handler = %name, error = %e, "process_once failed, backing off");
                        tokio::time::sleep(executor.config.timing.error_backoff).await;
                    }
                }
            }
        });
    }

    async fn set_completion_sink(&self, sink: Arc<dyn CompletionSink>) {
        *self.completion_sink.lock().unwrap() = Some(sink);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use crate::testing::InMemoryKvStore;
    use async_trait::async_trait as at;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    struct EchoHandler {
        kinds: Vec<TaskKind>,
    }

    #[at]
    impl TaskHandler for EchoHandler {
        fn supported_kinds(&self) -> &[TaskKind] {
            &self.kinds
        }

        async fn execute(&self, task: &Task) -> Result<serde_json::Value, CoreError> {
            Ok(serde_json::json!({ "echo": task.key() }))
        }
    }

    /// Blocks inside `execute` until the test fires the per-call `oneshot`
    /// it hands back over `starts_tx`, letting tests observe exactly when
    /// each task starts and control when it finishes.
    struct GatedHandler {
        kinds: Vec<TaskKind>,
        starts_tx: mpsc::UnboundedSender<(String, oneshot::Sender<()>)>,
    }

    #[at]
    impl TaskHandler for GatedHandler {
        fn supported_kinds(&self) -> &[TaskKind] {
            &self.kinds
        }

        async fn execute(&self, task: &Task) -> Result<serde_json::Value, CoreError> {
            let (tx, rx) = oneshot::channel();
            let _ = self.starts_tx.send((task.key().to_string(), tx));
            let _ = rx.await;
            Ok(serde_json::json!({ "echo": task.key() }))
        }
    }

    fn store() -> Arc<DurableQueueStore> {
        Arc::new(DurableQueueStore::new(Arc::new(InMemoryKvStore::new())))
    }

    #[tokio::test]
    async fn submit_rejects_unsupported_kind() {
        let handler = EchoHandler { kinds: vec![TaskKind::OrganizePaper] };
        let executor = HandlerExecutor::new(ExecutorConfig::new("h", 1, 10, 10), handler, store());
        let task = Task::new("k1", TaskKind::PaperMetadataExtraction, serde_json::json!({})).unwrap();
        let err = executor.submit(task).await.unwrap_err();
        assert_eq!(err, SubmitError::UnsupportedKind("paper_metadata_extraction".into()));

        let stats = executor.stats().await;
        assert_eq!(stats.execution_len, 0);
        assert_eq!(stats.waiting_len, 0);
    }

    #[tokio::test]
    async fn zero_capacity_always_queue_full() {
        let handler = EchoHandler { kinds: vec![TaskKind::OrganizePaper] };
        let executor = HandlerExecutor::new(ExecutorConfig::new("h", 1, 0, 0), handler, store());
        let task = Task::new("k1", TaskKind::OrganizePaper, serde_json::json!({})).unwrap();
        let err = executor.submit(task).await.unwrap_err();
        assert_eq!(err, SubmitError::QueueFull);
    }

    #[tokio::test]
    async fn queue_spill_fills_execution_then_waiting_then_full() {
        let handler = EchoHandler { kinds: vec![TaskKind::OrganizePaper] };
        let executor = HandlerExecutor::new(ExecutorConfig::new("h", 1, 2, 3), handler, store());

        for i in 0..5 {
            let task = Task::new(format!("k{i}"), TaskKind::OrganizePaper, serde_json::json!({})).unwrap();
            executor.submit(task).await.unwrap();
        }
        let sixth = Task::new("k5", TaskKind::OrganizePaper, serde_json::json!({})).unwrap();
        assert_eq!(executor.submit(sixth).await.unwrap_err(), SubmitError::QueueFull);

        let stats = executor.stats().await;
        assert_eq!(stats.execution_len, 2);
        assert_eq!(stats.waiting_len, 3);
    }

    #[tokio::test]
    async fn concurrency_ceiling_is_enforced() {
        let (starts_tx, mut starts_rx) = mpsc::unbounded_channel::<(String, oneshot::Sender<()>)>();
        let handler = GatedHandler { kinds: vec![TaskKind::OrganizePaper], starts_tx };
        let executor = HandlerExecutor::new(ExecutorConfig::new("h", 2, 10, 10), handler, store());

        for i in 0..5 {
            let task = Task::new(format!("k{i}"), TaskKind::OrganizePaper, serde_json::json!({})).unwrap();
            executor.submit(task).await.unwrap();
        }

        executor.process_once().await.unwrap();

        let (_, release_a) = tokio::time::timeout(Duration::from_millis(200), starts_rx.recv())
            .await
            .expect("first task should start")
            .unwrap();
        let (_, release_b) = tokio::time::timeout(Duration::from_millis(200), starts_rx.recv())
            .await
            .expect("second task should start")
            .unwrap();

        assert!(
            tokio::time::timeout(Duration::from_millis(100), starts_rx.recv()).await.is_err(),
            "a third task must not start while two are in flight"
        );
        assert_eq!(executor.stats().await.in_flight, 2);

        release_a.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        executor.process_once().await.unwrap();

        let (_, release_c) = tokio::time::timeout(Duration::from_millis(200), starts_rx.recv())
            .await
            .expect("third task should start once a slot frees")
            .unwrap();

        release_b.send(()).unwrap();
        release_c.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        executor.process_once().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        executor.process_once().await.unwrap();

        // Drain the remaining two tasks so nothing is left hanging.
        for _ in 0..2 {
            if let Ok(Some((_, release))) =
                tokio::time::timeout(Duration::from_millis(200), starts_rx.recv()).await
            {
                let _ = release.send(());
            }
        }
    }

    #[tokio::test]
    async fn persistence_round_trip_resumes_pending_tasks() {
        let kv = Arc::new(InMemoryKvStore::new());
        let shared_store = Arc::new(DurableQueueStore::new(kv));

        let config = ExecutorConfig::new("h", 1, 10, 10)
            .with_persistence(crate::config::PersistenceStrategy::FixedDuration(Duration::from_secs(3600)));

        {
            let (starts_tx, _starts_rx) = mpsc::unbounded_channel();
            let handler = GatedHandler { kinds: vec![TaskKind::OrganizePaper], starts_tx };
            let executor = HandlerExecutor::new(config.clone(), handler, shared_store.clone());
            for i in 0..3 {
                let task = Task::new(format!("k{i}"), TaskKind::OrganizePaper, serde_json::json!({})).unwrap();
                executor.submit(task).await.unwrap();
            }
            executor.process_once().await.unwrap();
        }

        let handler = EchoHandler { kinds: vec![TaskKind::OrganizePaper] };
        let resumed = HandlerExecutor::new(config, handler, shared_store);
        resumed.load_and_purge().await;
        let stats = resumed.stats().await;
        assert_eq!(stats.execution_len, 3);
    }

    struct FailingHandler {
        kinds: Vec<TaskKind>,
    }

    #[at]
    impl TaskHandler for FailingHandler {
        fn supported_kinds(&self) -> &[TaskKind] {
            &self.kinds
        }

        async fn execute(&self, task: &Task) -> Result<serde_json::Value, CoreError> {
            Err(CoreError::external(format!("{} always fails", task.key())))
        }
    }

    struct RecordingSink {
        completions: std::sync::Mutex<Vec<(String, TaskStatus)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { completions: std::sync::Mutex::new(Vec::new()) }
        }
    }

    #[at]
    impl CompletionSink for RecordingSink {
        async fn on_task_completed(&self, task: &Task) {
            self.completions.lock().unwrap().push((task.key().to_string(), task.status()));
        }
    }

    #[tokio::test]
    async fn registered_sink_is_notified_on_completed_and_failed() {
        let handler = EchoHandler { kinds: vec![TaskKind::OrganizePaper] };
        let executor = HandlerExecutor::new(ExecutorConfig::new("h", 2, 10, 10), handler, store());
        let sink = Arc::new(RecordingSink::new());
        executor.set_completion_sink(sink.clone()).await;

        let ok_task = Task::new("ok1", TaskKind::OrganizePaper, serde_json::json!({})).unwrap();
        executor.submit(ok_task).await.unwrap();
        executor.process_once().await.unwrap();

        tokio::time::timeout(Duration::from_millis(200), async {
            loop {
                if !sink.completions.lock().unwrap().is_empty() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sink should observe the completed task");

        let completions = sink.completions.lock().unwrap().clone();
        assert_eq!(completions, vec![("ok1".to_string(), TaskStatus::Completed)]);
        assert_eq!(executor.stats().await.in_flight, 0);
    }

    #[tokio::test]
    async fn registered_sink_is_notified_on_failure() {
        let handler = FailingHandler { kinds: vec![TaskKind::OrganizePaper] };
        let executor = HandlerExecutor::new(ExecutorConfig::new("h", 2, 10, 10), handler, store());
        let sink = Arc::new(RecordingSink::new());
        executor.set_completion_sink(sink.clone()).await;

        let task = Task::new("bad1", TaskKind::OrganizePaper, serde_json::json!({})).unwrap();
        executor.submit(task).await.unwrap();
        executor.process_once().await.unwrap();

        tokio::time::timeout(Duration::from_millis(200), async {
            loop {
                if !sink.completions.lock().unwrap().is_empty() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sink should observe the failed task");

        let completions = sink.completions.lock().unwrap().clone();
        assert_eq!(completions, vec![("bad1".to_string(), TaskStatus::Failed)]);
        assert_eq!(executor.stats().await.in_flight, 0);
    }
}
