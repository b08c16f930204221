//! Flag store + resolver (component D, `spec.md` §4.D).
//!
//! Two validated layers (`project`, `global`). Mutation always goes through
//! `set`/`remove`, which re-validate and invalidate the cached resolved
//! view. The resolved view is handed out as a [`guide_templates::ResolvedFlags`]
//! so the requires-gate and the renderer never need to know a store exists.

use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use guide_templates::{FlagValue, ResolvedFlags};

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Za-z0-9_-]+$").unwrap())
}

/// A per-flag validator, receiving the candidate value and whether it is
/// being set in project (`true`) or global (`false`) scope. Absent for a
/// given name means "accept any well-typed value" (`spec.md` §4.D).
pub type FlagValidator = Box<dyn Fn(&FlagValue, bool) -> Result<(), String> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error("flag name '{0}' is invalid (expected [A-Za-z0-9_-]+, non-empty)")]
    InvalidName(String),

    #[error("flag '{name}' rejected by validator: {message}")]
    Rejected { name: String, message: String },
}

fn validate_name(name: &str) -> Result<(), FlagError> {
    if !name.is_empty() && name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(FlagError::InvalidName(name.to_string()))
    }
}

/// A single `project`/`global` validated map of flag values.
#[derive(Default)]
struct Layer(BTreeMap<String, FlagValue>);

/// Two-layer flag store with project-first resolution, an invalidated
/// resolved-view cache, and an optional per-flag validator registry.
pub struct FlagStore {
    project: RwLock<Layer>,
    global: RwLock<Layer>,
    validators: RwLock<BTreeMap<String, FlagValidator>>,
    resolved_cache: RwLock<Option<BTreeMap<String, FlagValue>>>,
}

impl Default for FlagStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagStore {
    pub fn new() -> Self {
        Self {
            project: RwLock::new(Layer::default()),
            global: RwLock::new(Layer::default()),
            validators: RwLock::new(BTreeMap::new()),
            resolved_cache: RwLock::new(None),
        }
    }

    /// Register a per-flag validator, invoked on every future `set` of that
    /// name in either scope.
    pub fn register_validator(&self, name: impl Into<String>, validator: FlagValidator) {
        self.validators.write().unwrap().insert(name.into(), validator);
    }

    fn validate(&self, name: &str, value: &FlagValue, is_project_scope: bool) -> Result<(), FlagError> {
        validate_name(name)?;
        if let Some(validator) = self.validators.read().unwrap().get(name) {
            validator(value, is_project_scope).map_err(|message| FlagError::Rejected {
                name: name.to_string(),
                message,
            })?;
        }
        Ok(())
    }

    pub fn set_project(&self, name: &str, value: FlagValue) -> Result<(), FlagError> {
        self.validate(name, &value, true)?;
        self.project.write().unwrap().0.insert(name.to_string(), value);
        self.invalidate();
        Ok(())
    }

    pub fn set_global(&self, name: &str, value: FlagValue) -> Result<(), FlagError> {
        self.validate(name, &value, false)?;
        self.global.write().unwrap().0.insert(name.to_string(), value);
        self.invalidate();
        Ok(())
    }

    pub fn remove_project(&self, name: &str) {
        self.project.write().unwrap().0.remove(name);
        self.invalidate();
    }

    pub fn remove_global(&self, name: &str) {
        self.global.write().unwrap().0.remove(name);
        self.invalidate();
    }

    fn invalidate(&self) {
        *self.resolved_cache.write().unwrap() = None;
    }

    /// Resolve a single name: project value if present, else global, else
    /// `None`. Does not require (or populate) the cached "resolve all" view.
    pub fn resolve(&self, name: &str) -> Option<FlagValue> {
        if let Some(v) = self.project.read().unwrap().0.get(name) {
            return Some(v.clone());
        }
        self.global.read().unwrap().0.get(name).cloned()
    }

    /// The project-first merge of every name present in either store,
    /// rebuilding and caching it if invalidated.
    pub fn resolved_view(&self) -> BTreeMap<String, FlagValue> {
        if let Some(cached) = self.resolved_cache.read().unwrap().as_ref() {
            return cached.clone();
        }
        let project = self.project.read().unwrap();
        let global = self.global.read().unwrap();
        let mut merged = global.0.clone();
        merged.extend(project.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        drop(project);
        drop(global);
        *self.resolved_cache.write().unwrap() = Some(merged.clone());
        merged
    }

    /// A read-only, point-in-time snapshot implementing `ResolvedFlags` for
    /// consumption by `guide-templates`.
    pub fn snapshot(&self) -> ResolvedSnapshot {
        ResolvedSnapshot(self.resolved_view())
    }
}

/// Point-in-time resolved view. Failures upstream (store unreachable, a
/// poisoned lock) are meant to degrade to an empty view per §4.D
/// ("supplementary data") rather than panic the renderer; `FlagStore`
/// itself does not produce that failure mode today, but a remote-backed
/// store would construct an empty `ResolvedSnapshot` on error instead of
/// propagating.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSnapshot(BTreeMap<String, FlagValue>);

impl ResolvedFlags for ResolvedSnapshot {
    fn get(&self, name: &str) -> Option<&FlagValue> {
        self.0.get(name)
    }

    fn all(&self) -> BTreeMap<String, FlagValue> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_wins_over_global_invariant_4() {
        let store = FlagStore::new();
        store.set_global("workflow", FlagValue::Str("global-val".into())).unwrap();
        store.set_project("workflow", FlagValue::Str("project-val".into())).unwrap();
        assert_eq!(store.resolve("workflow"), Some(FlagValue::Str("project-val".into())));
    }

    #[test]
    fn invalid_name_rejected() {
        let store = FlagStore::new();
        let err = store.set_project("has space", FlagValue::Bool(true)).unwrap_err();
        assert!(matches!(err, FlagError::InvalidName(_)));
    }

    #[test]
    fn resolved_view_merges_both_layers() {
        let store = FlagStore::new();
        store.set_global("a", FlagValue::Bool(true)).unwrap();
        store.set_project("b", FlagValue::Bool(false)).unwrap();
        let view = store.resolved_view();
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn set_invalidates_cache() {
        let store = FlagStore::new();
        store.set_global("a", FlagValue::Str("1".into())).unwrap();
        assert_eq!(store.resolved_view().get("a"), Some(&FlagValue::Str("1".into())));
        store.set_global("a", FlagValue::Str("2".into())).unwrap();
        assert_eq!(store.resolved_view().get("a"), Some(&FlagValue::Str("2".into())));
    }

    #[test]
    fn custom_validator_can_restrict_scope() {
        let store = FlagStore::new();
        store.register_validator(
            "project-only",
            Box::new(|_value, is_project_scope| {
                if is_project_scope {
                    Ok(())
                } else {
                    Err("must be set in project scope".to_string())
                }
            }),
        );
        assert!(store.set_project("project-only", FlagValue::Bool(true)).is_ok());
        let err = store.set_global("project-only", FlagValue::Bool(true)).unwrap_err();
        assert!(matches!(err, FlagError::Rejected { .. }));
    }

    #[test]
    fn remove_invalidates_resolved_view() {
        let store = FlagStore::new();
        store.set_project("x", FlagValue::Bool(true)).unwrap();
        assert!(store.resolved_view().contains_key("x"));
        store.remove_project("x");
        assert!(!store.resolved_view().contains_key("x"));
    }
}
