//! The narrow interface the core consumes from the (external) session/config
//! layer (`spec.md` §1, §4.D; SPEC_FULL.md §4.M): a read-only view over
//! resolved project flags, handed to anything that needs to gate a template
//! or answer a single flag query without depending on `guide_workflow`'s
//! concrete `FlagStore`.

use std::collections::BTreeMap;

use guide_templates::FlagValue;

/// Read-only resolved-flag view exposed by the (external) session/config
/// layer. `guide_workflow::FlagStore::snapshot()` is the in-process
/// implementation used when the core owns its own flag store directly;
/// this trait exists for hosts that resolve flags from elsewhere (a remote
/// config service, a test fixture) without linking against the store type.
pub trait ProjectConfig: Send + Sync {
    fn resolve_flag(&self, name: &str) -> Option<FlagValue>;
    fn all_resolved_flags(&self) -> BTreeMap<String, FlagValue>;
}

/// Adapts a `guide_workflow::FlagStore` snapshot to `ProjectConfig`, so
/// callers that already hold a snapshot don't need a second resolution
/// pass.
impl ProjectConfig for guide_workflow::ResolvedSnapshot {
    fn resolve_flag(&self, name: &str) -> Option<FlagValue> {
        guide_templates::ResolvedFlags::get(self, name).cloned()
    }

    fn all_resolved_flags(&self) -> BTreeMap<String, FlagValue> {
        guide_templates::ResolvedFlags::all(self)
    }
}
