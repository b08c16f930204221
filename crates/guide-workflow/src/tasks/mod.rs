//! The four concrete tasks built on top of components D-H: the
//! workflow-monitor (I), client-context probe (J), startup listener (K),
//! and retry sweep (L) (`spec.md` §4.I-§4.L).

mod client_probe;
mod retry;
mod startup;
mod workflow_monitor;

pub use client_probe::ClientContextProbeTask;
pub use retry::RetryTask;
pub use startup::StartupListenerTask;
pub use workflow_monitor::WorkflowMonitorTask;

pub use client_probe::activate as activate_client_probe;
pub use retry::activate as activate_retry;
pub use workflow_monitor::activate as activate_workflow_monitor;

use std::sync::Arc;

use guide_templates::TemplateSource;
use tokio::sync::Mutex as AsyncMutex;

use crate::context::ContextCache;
use crate::flag::FlagStore;
use crate::supervisor::TaskSupervisor;

/// The handful of shared collaborators every concrete task is built against.
/// Grouping them avoids a five-argument constructor on each task and mirrors
/// constructor-injection conventions used throughout this workspace.
#[derive(Clone)]
pub struct TaskDeps {
    pub supervisor: Arc<TaskSupervisor>,
    pub templates: Arc<dyn TemplateSource>,
    pub flags: Arc<FlagStore>,
    pub context: Arc<AsyncMutex<ContextCache>>,
}
