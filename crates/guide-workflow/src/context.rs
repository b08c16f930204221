//! The per-session layered template context (component E, `spec.md` §4.E):
//! built once per active session, retained until a session/project change
//! invalidates it.

use serde_json::{Map, Value};

/// System/agent identity injected into every rendered template's base
/// context (`spec.md` §3 "session base context").
#[derive(Debug, Clone, Default)]
pub struct SystemInfo {
    pub os: String,
    pub platform: String,
    pub version: String,
}

#[derive(Debug, Clone, Default)]
pub struct AgentInfo {
    pub name: String,
    pub class: String,
    pub version: String,
    pub prefix: String,
}

fn info_to_map(system: &SystemInfo, agent: &AgentInfo) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        "system".to_string(),
        serde_json::json!({"os": system.os, "platform": system.platform, "version": system.version}),
    );
    map.insert(
        "agent".to_string(),
        serde_json::json!({
            "name": agent.name, "class": agent.class, "version": agent.version, "prefix": agent.prefix,
        }),
    );
    map.insert("@".to_string(), Value::String("@".to_string()));
    map
}

/// Built lazily, retained for the session's lifetime. `project` and
/// `category` overlays are merged in on top of the system/agent root;
/// `client` (filled in by the probe task, component J) is merged under
/// `client.system` / `client.user` / `client.repo` once probes return.
#[derive(Debug, Clone)]
pub struct SessionContext {
    base: Map<String, Value>,
}

impl SessionContext {
    fn build(system: &SystemInfo, agent: &AgentInfo, project: Option<&Map<String, Value>>, category: Option<&Map<String, Value>>) -> Self {
        let mut base = info_to_map(system, agent);
        if let Some(project) = project {
            base.insert("project".to_string(), Value::Object(project.clone()));
        }
        if let Some(category) = category {
            base.insert("category".to_string(), Value::Object(category.clone()));
        }
        Self { base }
    }

    pub fn as_map(&self) -> Map<String, Value> {
        self.base.clone()
    }

    /// Merge `data` under a dotted path (e.g. `client.system`), creating
    /// intermediate objects as needed — the mechanism the probe task
    /// (component J) uses to fold `.client-os.json` / `.client-context.json`
    /// into the cached context.
    pub fn merge_at(&mut self, dotted_path: &str, data: Value) {
        let mut target = &mut self.base;
        let mut segments = dotted_path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                target.insert(segment.to_string(), data);
                return;
            }
            let entry = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            target = entry.as_object_mut().expect("just ensured object");
        }
    }
}

/// Owns the single cached `SessionContext` for the active session, plus the
/// flag store its resolved view is drawn from. Single-writer/many-reader per
/// `spec.md` §4.E: readers call `get_or_build`, which rebuilds lazily after
/// an invalidation.
#[derive(Default)]
pub struct ContextCache {
    current: Option<SessionContext>,
    system: SystemInfo,
    agent: AgentInfo,
    project: Option<Map<String, Value>>,
    category: Option<Map<String, Value>>,
}

impl ContextCache {
    pub fn new(system: SystemInfo, agent: AgentInfo) -> Self {
        Self {
            current: None,
            system,
            agent,
            project: None,
            category: None,
        }
    }

    /// `spec.md` §4.E: "session changes project -> whole cache dropped."
    pub fn invalidate_for_session_change(&mut self) {
        self.current = None;
    }

    /// `spec.md` §4.E: "project configuration changed -> whole cache
    /// dropped." The project/category overlays are replaced atomically with
    /// the drop so the next rebuild picks them up.
    pub fn invalidate_for_project_change(&mut self, project: Option<Map<String, Value>>, category: Option<Map<String, Value>>) {
        self.project = project;
        self.category = category;
        self.current = None;
    }

    pub fn get_or_build(&mut self) -> &mut SessionContext {
        if self.current.is_none() {
            self.current = Some(SessionContext::build(&self.system, &self.agent, self.project.as_ref(), self.category.as_ref()));
        }
        self.current.as_mut().expect("just populated")
    }

    pub fn is_built(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::FlagStore;
    use guide_templates::FlagValue;

    #[test]
    fn session_base_context_matches_shape() {
        let mut cache = ContextCache::new(
            SystemInfo { os: "linux".into(), platform: "x86_64".into(), version: "1.0".into() },
            AgentInfo { name: "agent".into(), class: "assistant".into(), version: "1".into(), prefix: "" .into()},
        );
        let ctx = cache.get_or_build();
        let map = ctx.as_map();
        assert_eq!(map["system"]["os"], "linux");
        assert_eq!(map["agent"]["name"], "agent");
        assert_eq!(map["@"], "@");
    }

    #[test]
    fn invalidate_for_session_change_forces_rebuild() {
        let mut cache = ContextCache::new(SystemInfo::default(), AgentInfo::default());
        cache.get_or_build();
        assert!(cache.is_built());
        cache.invalidate_for_session_change();
        assert!(!cache.is_built());
    }

    #[test]
    fn merge_at_creates_nested_path() {
        let mut cache = ContextCache::new(SystemInfo::default(), AgentInfo::default());
        let ctx = cache.get_or_build();
        ctx.merge_at("client.system", serde_json::json!({"os": "darwin"}));
        assert_eq!(ctx.as_map()["client"]["system"]["os"], "darwin");
    }

    #[test]
    fn flag_store_mutation_does_not_require_context_rebuild() {
        let store = FlagStore::new();
        let mut cache = ContextCache::new(SystemInfo::default(), AgentInfo::default());
        cache.get_or_build();
        store.set_global("x", FlagValue::Bool(true)).unwrap();
        assert!(cache.is_built(), "context survives a flag mutation");
    }
}
