//! The retry sweep task (component L, `spec.md` §4.L): a `TIMER`-only
//! subscriber that runs the instruction ledger's retry sweep whenever the
//! pending queue has drained.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;

use crate::event_bus::{EventData, EventKind};
use crate::task::Task;

use super::TaskDeps;

const RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// `spec.md` §4.L: "If the pending queue is empty, run the ledger's retry
/// sweep; otherwise do nothing this tick."
pub struct RetryTask {
    deps: TaskDeps,
}

impl RetryTask {
    pub fn new(deps: TaskDeps) -> Arc<Self> {
        Arc::new(Self { deps })
    }
}

#[async_trait]
impl Task for RetryTask {
    fn name(&self) -> &str {
        "retry-sweep"
    }

    async fn on_init(&self) {}

    async fn on_tool(&self) {}

    async fn handle_event(&self, kinds: EventKind, _data: &EventData) -> bool {
        if !kinds.contains(EventKind::TIMER) {
            return false;
        }
        if self.deps.supervisor.is_queue_empty().await {
            self.deps.supervisor.retry_sweep().await;
        }
        true
    }
}

/// Subscribes the retry task to `TIMER` at its fixed 60s cadence and
/// registers it with the supervisor.
pub async fn activate(task: Arc<RetryTask>) {
    let weak: Weak<dyn Task> = Arc::downgrade(&task) as Weak<dyn Task>;
    task.deps.supervisor.subscribe(weak, EventKind::TIMER, Some(RETRY_INTERVAL)).await;
    task.deps.supervisor.register_task(task.clone()).await;
}
