//! The task supervisor (component H, `spec.md` §4.H): process-singleton
//! owner of the event bus (F) and instruction ledger (G), exposing
//! registration, subscription, queueing, and the retry/response-injection
//! surface every task and the (external) RPC boundary call through.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;

use crate::event_bus::{EventBus, EventData, EventKind};
use crate::ledger::{InstructionLedger, TrackedId, DEFAULT_MAX_RETRIES};
use crate::task::Task;

/// The single serialization boundary for all supervisor mutations
/// (`spec.md` §5): bus, ledger, task registry, the tool-invocation counter,
/// and the filesystem-event buffer collected between tool boundaries all
/// live behind one `tokio::sync::Mutex`.
struct SupervisorState {
    bus: EventBus,
    ledger: InstructionLedger,
    tasks: Vec<Arc<dyn Task>>,
    tool_invocations: u64,
    pending_fs_events: Vec<(EventKind, EventData)>,
}

impl SupervisorState {
    fn new() -> Self {
        Self {
            bus: EventBus::new(),
            ledger: InstructionLedger::new(),
            tasks: Vec::new(),
            tool_invocations: 0,
            pending_fs_events: Vec::new(),
        }
    }
}

pub struct TaskSupervisor {
    state: tokio::sync::Mutex<SupervisorState>,
}

impl TaskSupervisor {
    fn new() -> Self {
        Self { state: tokio::sync::Mutex::new(SupervisorState::new()) }
    }

    /// The process-singleton instance, created lazily on first access
    /// (`spec.md` §3 "Lifecycle", §9 "Singleton supervisor").
    pub fn instance() -> Arc<TaskSupervisor> {
        static SINGLETON: Mutex<Option<Arc<TaskSupervisor>>> = Mutex::new(None);
        let mut guard = SINGLETON.lock().unwrap();
        guard.get_or_insert_with(|| Arc::new(TaskSupervisor::new())).clone()
    }

    /// Clears all supervisor state. Only ever called from test setup
    /// (`spec.md` §4.H `_reset_for_testing`).
    pub async fn reset_for_testing() {
        let supervisor = Self::instance();
        let mut state = supervisor.state.lock().await;
        *state = SupervisorState::new();
    }

    /// Register a task: stores the strong reference that keeps it alive for
    /// the session, then runs its one-time `on_init` (`spec.md` §4.H
    /// "`register_task(task)`; task's `on_init()` is invoked once,
    /// synchronously-in-the-scheduler").
    pub async fn register_task(&self, task: Arc<dyn Task>) {
        task.on_init().await;
        let mut state = self.state.lock().await;
        state.tasks.push(task);
    }

    /// Forwarded to the event bus.
    pub async fn subscribe(&self, subscriber: Weak<dyn Task>, kinds: EventKind, interval: Option<Duration>) {
        let mut state = self.state.lock().await;
        state.bus.subscribe(subscriber, kinds, interval);
    }

    pub async fn queue_instruction(&self, text: impl Into<String>, priority: bool) {
        let mut state = self.state.lock().await;
        state.ledger.queue(text, priority);
    }

    pub async fn queue_tracked(&self, text: impl Into<String>, max_retries: Option<u32>, priority: bool) -> TrackedId {
        let mut state = self.state.lock().await;
        state.ledger.queue_tracked(text, max_retries.unwrap_or(DEFAULT_MAX_RETRIES), priority)
    }

    pub async fn acknowledge(&self, id: TrackedId) {
        let mut state = self.state.lock().await;
        state.ledger.acknowledge(id);
    }

    pub async fn is_queue_empty(&self) -> bool {
        let state = self.state.lock().await;
        state.ledger.is_empty()
    }

    /// Runs the ledger's retry sweep; callers (the retry task, component L)
    /// are expected to have already checked `is_queue_empty`.
    pub async fn retry_sweep(&self) {
        let mut state = self.state.lock().await;
        state.ledger.retry_sweep();
    }

    /// Buffer a filesystem-derived event for delivery at the next tool
    /// boundary (`spec.md` §4.H "dispatches any pending filesystem-derived
    /// events collected since last tool boundary").
    pub async fn notify_fs_event(&self, kinds: EventKind, data: EventData) {
        let mut state = self.state.lock().await;
        state.pending_fs_events.push((kinds, data));
    }

    /// Dispatch an event immediately, bypassing the tool-boundary buffer.
    /// Used for the timer pump (`spec.md` §4.F "Timer tick") and by tests.
    ///
    /// Collects the matching live subscribers under the lock, then releases
    /// it before invoking `handle_event` on each (mirroring `run_scheduler`'s
    /// timer pump below): a subscriber's callback can re-enter the
    /// supervisor (`queue_tracked`, `acknowledge`, ...), and `state`'s
    /// `tokio::sync::Mutex` is not reentrant, so holding the guard across
    /// dispatch would deadlock the first task that queues an instruction
    /// from within `handle_event`.
    pub async fn dispatch_now(&self, kinds: EventKind, data: &EventData) {
        let subscribers = {
            let mut state = self.state.lock().await;
            state.bus.matching_subscribers(kinds)
        };
        dispatch_to(subscribers, kinds, data).await;
    }

    /// `on_tool_called()`: increments the invocation counter, calls
    /// `on_tool()` on every live task, then flushes the buffered
    /// filesystem events accumulated since the previous boundary
    /// (`spec.md` §4.H).
    pub async fn on_tool_called(&self) {
        let (tasks, drained) = {
            let mut state = self.state.lock().await;
            state.tool_invocations += 1;
            let tasks = state.tasks.clone();
            let drained: Vec<_> = state.pending_fs_events.drain(..).collect();
            (tasks, drained)
        };

        for task in &tasks {
            task.on_tool().await;
        }

        for (kinds, data) in drained {
            self.dispatch_now(kinds, &data).await;
        }
    }

    pub async fn tool_invocation_count(&self) -> u64 {
        self.state.lock().await.tool_invocations
    }

    /// `process_response(response) -> response`: the outgoing-payload hook
    /// the (external) RPC boundary calls before serializing a tool result
    /// (`spec.md` §4.H, §6 "Response payload convention").
    pub async fn process_response(&self, response: Value) -> Value {
        let mut state = self.state.lock().await;
        state.ledger.inject(response)
    }

    /// Subscriptions currently due a timer tick, advancing their
    /// `next_fire_time`. The caller (the scheduler's timer pump) then
    /// dispatches `TIMER` to each returned weak handle.
    pub async fn due_timers(&self) -> Vec<Weak<dyn Task>> {
        let mut state = self.state.lock().await;
        state.bus.due_timers()
    }

    pub async fn live_task_count(&self) -> usize {
        let mut state = self.state.lock().await;
        state.bus.live_subscription_count()
    }
}

/// Invoke `handle_event` on every still-live subscriber in `subscribers`,
/// each on its own spawned task so a panicking subscriber is caught as a
/// `JoinError` and logged rather than aborting dispatch for the rest
/// (`spec.md` §4.F "Subscriber throws during dispatch"). Callers must have
/// already released any lock they hold before calling this.
async fn dispatch_to(subscribers: Vec<Weak<dyn Task>>, kinds: EventKind, data: &EventData) {
    for subscriber in subscribers {
        let Some(task) = subscriber.upgrade() else {
            continue;
        };
        let name = task.name().to_string();
        let data = data.clone();
        let result = tokio::spawn(async move { task.handle_event(kinds, &data).await }).await;
        if let Err(join_error) = result {
            tracing::error!(task = %name, error = %join_error, "task panicked while handling event; continuing");
        }
    }
}

/// Drives the timer pump: one `tokio::time::interval`-backed loop that
/// checks due timer subscriptions every tick and dispatches `TIMER` to each
/// (`spec.md` §5 "the timer pump is a `tokio::time::interval`-driven loop
/// spawned by the supervisor's `run_scheduler` method; it is not a
/// free-standing OS thread pool").
pub async fn run_scheduler(supervisor: Arc<TaskSupervisor>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    loop {
        interval.tick().await;
        let due = supervisor.due_timers().await;
        dispatch_to(due, EventKind::TIMER, &EventData::default()).await;
    }
}
