//! Flag store, context cache, event bus, instruction ledger, and task
//! supervisor (components D-H, `spec.md` §4.D-§4.H), plus the four concrete
//! tasks built on top of them (components I-L, `spec.md` §4.I-§4.L).
//!
//! This crate depends on [`guide_templates`] for the requires-gate, the
//! renderer, and the instruction composer; it does not depend the other
//! way around, matching the teacher's `ob-workflow` -> `ob-templates`
//! dependency direction.
//!
//! - [`flag`] - component D: the two-layer flag store and resolver.
//! - [`context`] - component E: the per-session layered template context.
//! - [`event_bus`] - component F: bit-flagged, weak-ref event dispatch.
//! - [`ledger`] - component G: the prioritized, de-duplicated instruction
//!   queue and tracked-instruction retry bookkeeping.
//! - [`supervisor`] - component H: the process-singleton owner of F and G.
//! - [`task`] - the `Task` trait every subscriber implements.
//! - [`state`] - the workflow-state YAML model and diffing (consumed by
//!   component I).
//! - [`tasks`] - components I-L: the workflow-monitor, client-context
//!   probe, startup listener, and retry tasks.

pub mod context;
pub mod event_bus;
pub mod flag;
pub mod ledger;
pub mod state;
pub mod supervisor;
pub mod task;
pub mod tasks;

pub use context::{AgentInfo, ContextCache, SessionContext, SystemInfo};
pub use event_bus::{EventBus, EventData, EventKind};
pub use flag::{FlagError, FlagStore, FlagValidator, ResolvedSnapshot};
pub use ledger::{InstructionLedger, TrackedId, TrackedInstruction, DEFAULT_MAX_RETRIES};
pub use state::{
    diff, parse, parse_phase_marker, serialize, FsWorkflowStateSource, PhaseMarker, StateChange,
    WorkflowState, WorkflowStateError, WorkflowStateSource,
};
pub use supervisor::{run_scheduler, TaskSupervisor};
pub use task::Task;
pub use tasks::{ClientContextProbeTask, RetryTask, StartupListenerTask, TaskDeps, WorkflowMonitorTask};
