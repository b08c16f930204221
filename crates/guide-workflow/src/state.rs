//! Workflow-state YAML (`spec.md` §3 "Workflow state", §6 "Workflow-state
//! YAML"): the file the workflow-monitor task (component I) watches,
//! diffed against its previous parse on every change.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Abstracts "the configured workflow-state YAML path" (`spec.md` §1
/// "narrow interface the core consumes") so the workflow-monitor task
/// (component I) can be driven by an in-memory fixture in tests instead of
/// real disk I/O.
pub trait WorkflowStateSource: Send + Sync {
    fn read(&self) -> Result<WorkflowState, WorkflowStateError>;
}

/// Reads and parses the YAML file at a fixed path on every call.
pub struct FsWorkflowStateSource {
    path: PathBuf,
}

impl FsWorkflowStateSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WorkflowStateSource for FsWorkflowStateSource {
    fn read(&self) -> Result<WorkflowState, WorkflowStateError> {
        let text = std::fs::read_to_string(&self.path).map_err(WorkflowStateError::Io)?;
        parse(&text)
    }
}

fn default_phase() -> String {
    "discussion".to_string()
}

/// `{phase, issue, plan, tracking, description, queue}` plus any extra keys,
/// preserved verbatim via `#[serde(flatten)]` so a re-implementer's
/// additions round-trip even though this crate does not interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default = "default_phase")]
    pub phase: String,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub tracking: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub queue: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            phase: default_phase(),
            issue: None,
            plan: None,
            tracking: None,
            description: None,
            queue: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowStateError {
    #[error("failed to parse workflow state: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read workflow state file: {0}")]
    Io(std::io::Error),
}

pub fn parse(yaml: &str) -> Result<WorkflowState, WorkflowStateError> {
    Ok(serde_yaml::from_str(yaml)?)
}

pub fn serialize(state: &WorkflowState) -> Result<String, WorkflowStateError> {
    Ok(serde_yaml::to_string(state)?)
}

/// Whether a phase name (as it appears in an ordered phase list, e.g. the
/// definition of a workflow's state machine) carries an entry-consent
/// (`*name`) or exit-consent (`name*`) marker (`spec.md` §3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseMarker {
    pub name: String,
    pub requires_entry_consent: bool,
    pub requires_exit_consent: bool,
}

pub fn parse_phase_marker(raw: &str) -> PhaseMarker {
    let requires_entry_consent = raw.starts_with('*');
    let requires_exit_consent = raw.ends_with('*') && raw.len() > 1;
    let name = raw.trim_start_matches('*').trim_end_matches('*').to_string();
    PhaseMarker {
        name,
        requires_entry_consent,
        requires_exit_consent,
    }
}

/// One field-level difference between two workflow-state snapshots
/// (`spec.md` §4.I "State comparison").
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Phase { from: String, to: String },
    Issue { from: Option<String>, to: Option<String> },
    Tracking { from: Option<String>, to: Option<String> },
    Description { from: Option<String>, to: Option<String> },
    Queue { from: Vec<String>, to: Vec<String>, added: Vec<String>, removed: Vec<String> },
}

/// Diff `previous` against `next`, emitting one `StateChange` per modified
/// field, in a stable field order.
pub fn diff(previous: &WorkflowState, next: &WorkflowState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if previous.phase != next.phase {
        changes.push(StateChange::Phase { from: previous.phase.clone(), to: next.phase.clone() });
    }
    if previous.issue != next.issue {
        changes.push(StateChange::Issue { from: previous.issue.clone(), to: next.issue.clone() });
    }
    if previous.tracking != next.tracking {
        changes.push(StateChange::Tracking { from: previous.tracking.clone(), to: next.tracking.clone() });
    }
    if previous.description != next.description {
        changes.push(StateChange::Description { from: previous.description.clone(), to: next.description.clone() });
    }
    if previous.queue != next.queue {
        let mut added: Vec<String> = next.queue.iter().filter(|x| !previous.queue.contains(x)).cloned().collect();
        let mut removed: Vec<String> = previous.queue.iter().filter(|x| !next.queue.contains(x)).cloned().collect();
        added.sort();
        removed.sort();
        changes.push(StateChange::Queue {
            from: previous.queue.clone(),
            to: next.queue.clone(),
            added,
            removed,
        });
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_phase_is_discussion() {
        let state: WorkflowState = serde_yaml::from_str("{}").unwrap();
        assert_eq!(state.phase, "discussion");
        assert_eq!(state.queue, Vec::<String>::new());
    }

    #[test]
    fn round_trip_preserves_extra_keys() {
        let yaml = "phase: planning\nissue: ISSUE-1\nqueue: [a, b]\ncustom_field: 42\n";
        let state = parse(yaml).unwrap();
        assert_eq!(state.extra.get("custom_field"), Some(&serde_yaml::Value::Number(42.into())));

        let reserialized = serialize(&state).unwrap();
        let reparsed = parse(&reserialized).unwrap();
        assert_eq!(state, reparsed);
    }

    #[test]
    fn phase_marker_parsing() {
        assert_eq!(parse_phase_marker("*planning"), PhaseMarker { name: "planning".into(), requires_entry_consent: true, requires_exit_consent: false });
        assert_eq!(parse_phase_marker("planning*"), PhaseMarker { name: "planning".into(), requires_entry_consent: false, requires_exit_consent: true });
        assert_eq!(parse_phase_marker("planning"), PhaseMarker { name: "planning".into(), requires_entry_consent: false, requires_exit_consent: false });
    }

    #[test]
    fn diff_detects_phase_change_scenario_4() {
        let previous = WorkflowState { phase: "discussion".into(), ..Default::default() };
        let next = WorkflowState { phase: "planning".into(), ..Default::default() };
        let changes = diff(&previous, &next);
        assert_eq!(changes, vec![StateChange::Phase { from: "discussion".into(), to: "planning".into() }]);
    }

    #[test]
    fn diff_detects_queue_add_remove() {
        let previous = WorkflowState { queue: vec!["a".into(), "b".into()], ..Default::default() };
        let next = WorkflowState { queue: vec!["b".into(), "c".into()], ..Default::default() };
        let changes = diff(&previous, &next);
        assert_eq!(
            changes,
            vec![StateChange::Queue {
                from: vec!["a".into(), "b".into()],
                to: vec!["b".into(), "c".into()],
                added: vec!["c".into()],
                removed: vec!["a".into()],
            }]
        );
    }

    #[test]
    fn no_changes_when_states_equal() {
        let state = WorkflowState::default();
        assert!(diff(&state, &state).is_empty());
    }
}
