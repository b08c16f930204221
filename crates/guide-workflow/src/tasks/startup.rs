//! The startup listener task (component K, `spec.md` §4.K): queues a
//! one-shot startup instruction, gated by the `startup-instruction` flag,
//! the first time the supervisor registers a task for the session.

use std::sync::Arc;

use async_trait::async_trait;

use guide_templates::{render, RenderOutcome};

use crate::event_bus::{EventData, EventKind};
use crate::task::Task;

use super::TaskDeps;

const STARTUP_FLAG: &str = "startup-instruction";
const STARTUP_TEMPLATE: &str = "_startup";

/// `spec.md` §4.K: no event subscriptions; all of its work happens in
/// `on_init`, once, since exactly one instance is constructed per session.
pub struct StartupListenerTask {
    deps: TaskDeps,
}

impl StartupListenerTask {
    pub fn new(deps: TaskDeps) -> Arc<Self> {
        Arc::new(Self { deps })
    }

    fn enabled(&self) -> bool {
        self.deps
            .flags
            .resolve(STARTUP_FLAG)
            .map(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Task for StartupListenerTask {
    fn name(&self) -> &str {
        "startup-listener"
    }

    async fn on_init(&self) {
        if !self.enabled() {
            tracing::debug!(flag = STARTUP_FLAG, "startup instruction disabled");
            return;
        }

        let flags = self.deps.flags.snapshot();
        let outcome = render(self.deps.templates.as_ref(), STARTUP_TEMPLATE, Default::default(), Default::default(), &flags);
        let content = match outcome {
            Ok(RenderOutcome::Content(c)) => c,
            Ok(RenderOutcome::Filtered) => return,
            Err(err) => {
                tracing::warn!(error = %err, "startup template render failed");
                return;
            }
        };

        // `spec.md` §4.K: "if the rendered body (trimmed) is non-empty,
        // queue it priority (non-tracked)" — unlike the other tasks, the
        // startup listener delivers the rendered documentation body itself
        // as the instruction, not a frontmatter-composed meta-instruction.
        let body = content.body.trim();
        if body.is_empty() {
            return;
        }

        self.deps.supervisor.queue_instruction(body.to_string(), true).await;
    }

    async fn on_tool(&self) {}

    async fn handle_event(&self, _kinds: EventKind, _data: &EventData) -> bool {
        false
    }
}
