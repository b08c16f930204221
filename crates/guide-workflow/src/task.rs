//! The `Task` trait (`spec.md` §3 "Task"): any long-lived subscriber the
//! supervisor can register and dispatch events to.

use async_trait::async_trait;

use crate::event_bus::{EventData, EventKind};

/// A long-lived background task. Tasks are registered with the supervisor
/// as `Arc<dyn Task>`; the bus only ever stores a `Weak<dyn Task>`, so a
/// task is released once its owner drops the last strong reference
/// (`spec.md` §9 "Weak subscriber references").
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable, human-readable task name (used in logs).
    fn name(&self) -> &str;

    /// Called once, synchronously-in-the-scheduler, when the supervisor
    /// registers this task (`spec.md` §4.H).
    async fn on_init(&self) {}

    /// Called on every tool invocation boundary (`spec.md` §4.H
    /// `on_tool_called`), before any collected filesystem events are
    /// dispatched.
    async fn on_tool(&self) {}

    /// Handle a dispatched event. The boolean return is informational
    /// (`true` if the event was meaningful to this task) and is not
    /// currently consumed by the bus, which dispatches to every matching
    /// live subscriber regardless.
    async fn handle_event(&self, kinds: EventKind, data: &EventData) -> bool;
}
