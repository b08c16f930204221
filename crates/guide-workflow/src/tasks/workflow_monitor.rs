//! The workflow-monitor task (component I, `spec.md` §4.I): watches a
//! configured workflow-state YAML path, diffs it against the previous
//! parse on every change, and queues a template-derived instruction per
//! field that changed.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;
use tokio::sync::Mutex as AsyncMutex;

use guide_templates::{compose, render, RenderOutcome};

use crate::event_bus::{EventData, EventKind};
use crate::ledger::TrackedId;
use crate::state::{diff, StateChange, WorkflowState, WorkflowStateSource};
use crate::task::Task;

use super::TaskDeps;

struct MonitorState {
    prev: Option<WorkflowState>,
    pending_tracked_ids: Vec<TrackedId>,
}

/// `spec.md` §4.I: subscribes `FS_FILE_CONTENT` (for the watched path) and
/// `TIMER` at 60s.
pub struct WorkflowMonitorTask {
    deps: TaskDeps,
    source: Arc<dyn WorkflowStateSource>,
    watched_path: String,
    state: AsyncMutex<MonitorState>,
}

impl WorkflowMonitorTask {
    pub fn new(deps: TaskDeps, source: Arc<dyn WorkflowStateSource>, watched_path: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            deps,
            source,
            watched_path: watched_path.into(),
            state: AsyncMutex::new(MonitorState { prev: None, pending_tracked_ids: Vec::new() }),
        })
    }

    fn weak_task(self: &Arc<Self>) -> Weak<dyn Task> {
        let weak: Weak<Self> = Arc::downgrade(self);
        weak as Weak<dyn Task>
    }

    async fn render_and_queue(&self, template_name: &str, priority: bool, tracked: bool) {
        let flags = self.deps.flags.snapshot();
        let outcome = render(self.deps.templates.as_ref(), template_name, Map::new(), Map::new(), &flags);
        let content = match outcome {
            Ok(RenderOutcome::Content(c)) => c,
            Ok(RenderOutcome::Filtered) => {
                tracing::debug!(template = template_name, "monitor template filtered; no instruction queued");
                return;
            }
            Err(err) => {
                tracing::warn!(template = template_name, error = %err, "monitor template render failed; no instruction queued");
                return;
            }
        };

        let Some(instruction) = compose(&content.frontmatter, &content.partial_frontmatter) else {
            return;
        };

        if tracked {
            let id = self.deps.supervisor.queue_tracked(instruction, None, priority).await;
            let mut state = self.state.lock().await;
            state.pending_tracked_ids.push(id);
        } else {
            self.deps.supervisor.queue_instruction(instruction, priority).await;
        }
    }

    async fn handle_change(&self, change: &StateChange) {
        match change {
            StateChange::Phase { to, .. } => {
                self.render_and_queue(&format!("*{}", to), true, true).await;
            }
            _ => {
                self.render_and_queue("monitoring-result", false, true).await;
            }
        }
    }

    async fn process_file_update(&self) {
        let pending: Vec<TrackedId> = {
            let mut state = self.state.lock().await;
            std::mem::take(&mut state.pending_tracked_ids)
        };
        for id in pending {
            self.deps.supervisor.acknowledge(id).await;
        }

        let next = match self.source.read() {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(error = %err, "workflow state parse failed; previous state retained");
                return;
            }
        };

        let previous = {
            let state = self.state.lock().await;
            state.prev.clone()
        };

        if let Some(previous) = &previous {
            for change in diff(previous, &next) {
                self.handle_change(&change).await;
            }
        }

        let mut state = self.state.lock().await;
        state.prev = Some(next);
    }
}

#[async_trait]
impl Task for WorkflowMonitorTask {
    fn name(&self) -> &str {
        "workflow-monitor"
    }

    async fn on_init(&self) {
        tracing::debug!("workflow-monitor initialized");
    }

    async fn on_tool(&self) {}

    async fn handle_event(&self, kinds: EventKind, data: &EventData) -> bool {
        let mut handled = false;

        if kinds.contains(EventKind::FS_FILE_CONTENT) {
            if data.path.as_deref() == Some(self.watched_path.as_str()) {
                self.process_file_update().await;
                handled = true;
            }
        }

        if kinds.contains(EventKind::TIMER) {
            if self.deps.supervisor.is_queue_empty().await {
                self.render_and_queue("monitoring-reminder", false, false).await;
            }
            handled = true;
        }

        handled
    }
}

/// Registers the task with the supervisor: subscribes it to
/// `FS_FILE_CONTENT`/`TIMER` and queues its initial `monitoring-setup`
/// instruction (`spec.md` §4.I "Initial activation").
pub async fn activate(task: Arc<WorkflowMonitorTask>) {
    let weak = task.weak_task();
    task.deps.supervisor.subscribe(weak.clone(), EventKind::FS_FILE_CONTENT, None).await;
    task.deps.supervisor.subscribe(weak, EventKind::TIMER, Some(Duration::from_secs(60))).await;
    task.deps.supervisor.register_task(task.clone()).await;
    task.render_and_queue("monitoring-setup", true, true).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AgentInfo, ContextCache, SystemInfo};
    use crate::flag::FlagStore;
    use crate::supervisor::TaskSupervisor;
    use guide_templates::TemplateSource as TemplateSourceTrait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct MapSource(StdMutex<HashMap<String, String>>);
    impl TemplateSourceTrait for MapSource {
        fn load(&self, _relative_to: &str, name: &str) -> Result<(String, String), guide_templates::TemplateError> {
            self.0
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .map(|t| (String::new(), t))
                .ok_or_else(|| guide_templates::TemplateError::FileRead { name: name.to_string(), message: "missing".into() })
        }
    }

    struct FixedSource(StdMutex<WorkflowState>);
    impl WorkflowStateSource for FixedSource {
        fn read(&self) -> Result<WorkflowState, crate::state::WorkflowStateError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn deps(files: HashMap<String, String>) -> (TaskDeps, Arc<MapSource>) {
        let source = Arc::new(MapSource(StdMutex::new(files)));
        let deps = TaskDeps {
            supervisor: TaskSupervisor::instance(),
            templates: source.clone(),
            flags: Arc::new(FlagStore::new()),
            context: Arc::new(AsyncMutex::new(ContextCache::new(SystemInfo::default(), AgentInfo::default()))),
        };
        (deps, source)
    }

    #[tokio::test]
    async fn phase_change_emits_tracked_priority_instruction_scenario_4() {
        TaskSupervisor::reset_for_testing().await;
        let mut files = HashMap::new();
        files.insert("monitoring-setup".to_string(), "---\ninstruction: \"setting up\"\n---\n".to_string());
        files.insert("*planning".to_string(), "---\ninstruction: \"Enter planning phase.\"\n---\n".to_string());
        let (deps, _source) = deps(files);

        let state_source = Arc::new(FixedSource(StdMutex::new(WorkflowState { phase: "discussion".into(), ..Default::default() })));
        let task = WorkflowMonitorTask::new(deps, state_source.clone(), ".guide.yaml");
        activate(task.clone()).await;

        // Prime prev_state via a first file-content event.
        task.handle_event(EventKind::FS_FILE_CONTENT, &EventData::path(".guide.yaml")).await;

        *state_source.0.lock().unwrap() = WorkflowState { phase: "planning".into(), ..Default::default() };
        task.handle_event(EventKind::FS_FILE_CONTENT, &EventData::path(".guide.yaml")).await;

        let supervisor = TaskSupervisor::instance();
        assert!(!supervisor.is_queue_empty().await);
        let response = supervisor.process_response(serde_json::json!({})).await;
        assert_eq!(response["additional_agent_instructions"], "Enter planning phase.");
    }

    #[tokio::test]
    async fn timer_tick_renders_reminder_only_when_queue_empty() {
        TaskSupervisor::reset_for_testing().await;
        let mut files = HashMap::new();
        files.insert("monitoring-setup".to_string(), "---\ninstruction: \"setup\"\n---\n".to_string());
        files.insert("monitoring-reminder".to_string(), "---\ninstruction: \"Please check in.\"\n---\n".to_string());
        let (deps, _source) = deps(files);

        let state_source = Arc::new(FixedSource(StdMutex::new(WorkflowState::default())));
        let task = WorkflowMonitorTask::new(deps, state_source, ".guide.yaml");
        activate(task.clone()).await;

        let supervisor = TaskSupervisor::instance();
        // Drain the setup instruction queued at activation.
        let _ = supervisor.process_response(serde_json::json!({})).await;

        task.handle_event(EventKind::TIMER, &EventData::default()).await;
        assert!(!supervisor.is_queue_empty().await);
    }

    #[tokio::test]
    async fn unrelated_path_is_ignored() {
        TaskSupervisor::reset_for_testing().await;
        let (deps, _source) = deps(HashMap::new());
        let state_source = Arc::new(FixedSource(StdMutex::new(WorkflowState::default())));
        let task = WorkflowMonitorTask::new(deps, state_source, ".guide.yaml");

        let handled = task.handle_event(EventKind::FS_FILE_CONTENT, &EventData::path("unrelated.txt")).await;
        assert!(!handled);
    }
}
