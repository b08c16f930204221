//! Flag values and the read-only resolver interface consumed by the
//! requires-gate (component A) and the template context chain (component B).
//!
//! The flag *store* itself (component D: two layers, validation,
//! invalidation) lives in `guide-workflow`, which is the crate that depends
//! on `guide-templates` and not the other way around. This module only
//! carries the value type and the narrow trait the renderer needs.

use std::collections::{BTreeMap, HashSet};

/// One of the four shapes a flag value may take (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Str(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl FlagValue {
    /// Coerce to a boolean the way the requires-gate's boolean branch does:
    /// `bool(actual)`. Non-bool values are truthy unless they are an empty
    /// string, empty list, or empty map.
    pub fn as_bool(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Str(s) => !s.is_empty(),
            FlagValue::List(l) => !l.is_empty(),
            FlagValue::Map(m) => !m.is_empty(),
        }
    }

    fn as_scalar_str(&self) -> Option<&str> {
        match self {
            FlagValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Does `required` (taken from a `requires-<flag>: <required>` directive)
    /// hold against `self` (the resolved actual value)? Implements the three
    /// branches of `spec.md` §4.A.
    pub fn satisfies(&self, required: &FlagValue) -> bool {
        match required {
            FlagValue::Bool(want) => self.as_bool() == *want,
            FlagValue::List(wanted) => match self {
                FlagValue::List(actual) => {
                    let actual_set: HashSet<&str> = actual.iter().map(String::as_str).collect();
                    wanted.iter().any(|w| actual_set.contains(w.as_str()))
                }
                FlagValue::Map(actual) => wanted.iter().any(|w| actual.contains_key(w)),
                _ => {
                    if let Some(scalar) = self.as_scalar_str() {
                        wanted.iter().any(|w| w == scalar)
                    } else {
                        false
                    }
                }
            },
            other => self == other,
        }
    }
}

/// Read-only view of the project-first-merged flag set, as produced by the
/// flag store's resolver (component D, implemented in `guide-workflow`).
pub trait ResolvedFlags {
    fn get(&self, name: &str) -> Option<&FlagValue>;

    /// Every name present in either backing store, each with its resolved
    /// value (`spec.md` §4.D "list all resolved").
    fn all(&self) -> BTreeMap<String, FlagValue>;
}

/// A resolved view with no entries — used by callers that render without a
/// flag store (e.g. startup/unit tests), and as the base of the supplementary
/// "failures yield an empty view" policy from `spec.md` §4.D.
#[derive(Debug, Default, Clone)]
pub struct EmptyFlags;

impl ResolvedFlags for EmptyFlags {
    fn get(&self, _name: &str) -> Option<&FlagValue> {
        None
    }

    fn all(&self) -> BTreeMap<String, FlagValue> {
        BTreeMap::new()
    }
}
