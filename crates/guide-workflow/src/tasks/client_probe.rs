//! The client-context probe task (component J, `spec.md` §4.J): gated by
//! the `allow-client-info` flag, runs a two-stage tracked-probe sequence
//! that folds client identity data into the session context cache.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use guide_templates::{compose, render, FlagValue, RenderOutcome};

use crate::event_bus::{EventData, EventKind};
use crate::ledger::TrackedId;
use crate::task::Task;

use super::TaskDeps;

const ALLOW_FLAG: &str = "allow-client-info";
const OS_PROBE_PATH: &str = ".client-os.json";
const CONTEXT_PROBE_PATH: &str = ".client-context.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    NotStarted,
    AwaitingOs,
    AwaitingContext,
    Done,
}

struct ProbeState {
    stage: Stage,
    os_tracked_id: Option<TrackedId>,
    context_tracked_id: Option<TrackedId>,
}

/// `spec.md` §4.J: subscribes `FS_FILE_CONTENT` only; runs once per session.
pub struct ClientContextProbeTask {
    deps: TaskDeps,
    state: AsyncMutex<ProbeState>,
}

impl ClientContextProbeTask {
    pub fn new(deps: TaskDeps) -> Arc<Self> {
        Arc::new(Self {
            deps,
            state: AsyncMutex::new(ProbeState { stage: Stage::NotStarted, os_tracked_id: None, context_tracked_id: None }),
        })
    }

    fn allowed(&self) -> bool {
        self.deps
            .flags
            .resolve(ALLOW_FLAG)
            .map(|v| v.as_bool())
            .unwrap_or(false)
    }

    async fn render_probe_instruction(&self, template_name: &str) -> Option<String> {
        let flags = self.deps.flags.snapshot();
        let outcome = render(self.deps.templates.as_ref(), template_name, Default::default(), Default::default(), &flags);
        let content = match outcome {
            Ok(RenderOutcome::Content(c)) => c,
            Ok(RenderOutcome::Filtered) => return None,
            Err(err) => {
                tracing::warn!(template = template_name, error = %err, "probe template render failed");
                return None;
            }
        };
        compose(&content.frontmatter, &content.partial_frontmatter)
    }

    async fn start_os_probe(&self) {
        let Some(instruction) = self.render_probe_instruction("client-os-probe").await else {
            return;
        };
        // `spec.md` §4.J: "queue a tracked priority instruction asking the
        // agent to emit `.client-os.json`".
        let id = self.deps.supervisor.queue_tracked(instruction, None, true).await;
        let mut state = self.state.lock().await;
        state.stage = Stage::AwaitingOs;
        state.os_tracked_id = Some(id);
    }

    async fn start_context_probe(&self) {
        let Some(instruction) = self.render_probe_instruction("client-context-probe").await else {
            return;
        };
        let id = self.deps.supervisor.queue_tracked(instruction, None, false).await;
        let mut state = self.state.lock().await;
        state.stage = Stage::AwaitingContext;
        state.context_tracked_id = Some(id);
    }

    async fn handle_os_response(&self, data: &EventData) {
        let Some(Value::Object(_)) = &data.content else {
            tracing::debug!("client OS probe response malformed; leaving tracked entry for retry");
            return;
        };
        let content = data.content.clone().expect("matched Some above");

        {
            let mut cache = self.deps.context.lock().await;
            cache.get_or_build().merge_at("client.system", content);
        }

        let id = {
            let mut state = self.state.lock().await;
            state.os_tracked_id.take()
        };
        if let Some(id) = id {
            self.deps.supervisor.acknowledge(id).await;
        }

        self.start_context_probe().await;
    }

    async fn handle_context_response(&self, data: &EventData) {
        let Some(Value::Object(map)) = &data.content else {
            tracing::debug!("client context probe response malformed; leaving tracked entry for retry");
            return;
        };

        {
            let mut cache = self.deps.context.lock().await;
            let ctx = cache.get_or_build();
            if let Some(user) = map.get("user") {
                ctx.merge_at("client.user", user.clone());
            }
            if let Some(repo) = map.get("repo") {
                ctx.merge_at("client.repo", repo.clone());
            }
        }

        let id = {
            let mut state = self.state.lock().await;
            state.context_tracked_id.take()
        };
        if let Some(id) = id {
            self.deps.supervisor.acknowledge(id).await;
        }

        let mut state = self.state.lock().await;
        state.stage = Stage::Done;
    }
}

#[async_trait]
impl Task for ClientContextProbeTask {
    fn name(&self) -> &str {
        "client-context-probe"
    }

    async fn on_init(&self) {
        if !self.allowed() {
            tracing::debug!(flag = ALLOW_FLAG, "client context probe disabled");
            return;
        }
        self.start_os_probe().await;
    }

    async fn on_tool(&self) {}

    async fn handle_event(&self, kinds: EventKind, data: &EventData) -> bool {
        if !kinds.contains(EventKind::FS_FILE_CONTENT) {
            return false;
        }

        let stage = self.state.lock().await.stage;
        match (stage, data.path.as_deref()) {
            (Stage::AwaitingOs, Some(OS_PROBE_PATH)) => {
                self.handle_os_response(data).await;
                true
            }
            (Stage::AwaitingContext, Some(CONTEXT_PROBE_PATH)) => {
                self.handle_context_response(data).await;
                true
            }
            _ => false,
        }
    }
}

/// Subscribes the probe to `FS_FILE_CONTENT` and registers it, which runs
/// `on_init` and kicks off the OS probe if `allow-client-info` is set.
pub async fn activate(task: Arc<ClientContextProbeTask>) {
    let weak: Weak<dyn Task> = Arc::downgrade(&task) as Weak<dyn Task>;
    task.deps.supervisor.subscribe(weak, EventKind::FS_FILE_CONTENT, None).await;
    task.deps.supervisor.register_task(task.clone()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AgentInfo, ContextCache, SystemInfo};
    use crate::flag::FlagStore;
    use crate::supervisor::TaskSupervisor;
    use guide_templates::TemplateSource as TemplateSourceTrait;
    use std::collections::HashMap;

    struct MapSource(HashMap<String, String>);
    impl TemplateSourceTrait for MapSource {
        fn load(&self, _relative_to: &str, name: &str) -> Result<(String, String), guide_templates::TemplateError> {
            self.0
                .get(name)
                .cloned()
                .map(|t| (String::new(), t))
                .ok_or_else(|| guide_templates::TemplateError::FileRead { name: name.to_string(), message: "missing".into() })
        }
    }

    fn deps_with(flag_on: bool) -> TaskDeps {
        let mut files = HashMap::new();
        files.insert("client-os-probe".to_string(), "---\ninstruction: \"Report .client-os.json\"\n---\n".to_string());
        files.insert("client-context-probe".to_string(), "---\ninstruction: \"Report .client-context.json\"\n---\n".to_string());
        let flags = FlagStore::new();
        if flag_on {
            flags.set_global(ALLOW_FLAG, FlagValue::Bool(true)).unwrap();
        }
        TaskDeps {
            supervisor: TaskSupervisor::instance(),
            templates: Arc::new(MapSource(files)),
            flags: Arc::new(flags),
            context: Arc::new(AsyncMutex::new(ContextCache::new(SystemInfo::default(), AgentInfo::default()))),
        }
    }

    #[tokio::test]
    async fn disabled_flag_never_probes() {
        TaskSupervisor::reset_for_testing().await;
        let deps = deps_with(false);
        let supervisor = deps.supervisor.clone();
        let task = ClientContextProbeTask::new(deps);
        supervisor.register_task(task.clone()).await;
        assert!(supervisor.is_queue_empty().await);
    }

    #[tokio::test]
    async fn full_two_stage_probe_merges_into_context() {
        TaskSupervisor::reset_for_testing().await;
        let deps = deps_with(true);
        let supervisor = deps.supervisor.clone();
        let context = deps.context.clone();
        let task = ClientContextProbeTask::new(deps);
        supervisor.register_task(task.clone()).await;
        assert!(!supervisor.is_queue_empty().await, "os probe queued");

        task.handle_event(
            EventKind::FS_FILE_CONTENT,
            &EventData::with_content(OS_PROBE_PATH, serde_json::json!({"os": "linux"})),
        )
        .await;

        assert!(!supervisor.is_queue_empty().await, "context probe queued");

        task.handle_event(
            EventKind::FS_FILE_CONTENT,
            &EventData::with_content(CONTEXT_PROBE_PATH, serde_json::json!({"user": {"name": "ada"}, "repo": {"name": "guide"}})),
        )
        .await;

        let mut cache = context.lock().await;
        let map = cache.get_or_build().as_map();
        assert_eq!(map["client"]["system"]["os"], "linux");
        assert_eq!(map["client"]["user"]["name"], "ada");
        assert_eq!(map["client"]["repo"]["name"], "guide");
    }

    #[tokio::test]
    async fn malformed_os_response_is_not_acknowledged() {
        TaskSupervisor::reset_for_testing().await;
        let deps = deps_with(true);
        let supervisor = deps.supervisor.clone();
        let task = ClientContextProbeTask::new(deps);
        supervisor.register_task(task.clone()).await;

        task.handle_event(EventKind::FS_FILE_CONTENT, &EventData::path(OS_PROBE_PATH)).await;

        let state = task.state.lock().await;
        assert!(state.os_tracked_id.is_some(), "tracked id retained for retry");
        assert_eq!(state.stage, Stage::AwaitingOs);
    }
}
