//! `guide`: a documentation-and-workflow coordination core.
//!
//! The outward purpose - delivering category/collection-organized
//! documentation content to an AI agent on request - is narrow plumbing.
//! The substance of this crate is the cooperative event-driven task
//! manager (`guide_workflow`) and the template rendering pipeline it feeds
//! (`guide_templates`): a fleet of long-lived background tasks sharing one
//! instruction ledger, one event bus, and one flag/context cache.
//!
//! This crate is the integration layer: the error taxonomy (`spec.md` §7),
//! the `guide://` URI scheme (§6), the response-injection helper tasks and
//! the (external) RPC boundary call through, the `ProjectConfig` narrow
//! interface, and a `tracing` logging bootstrap. It has no `main.rs` - the
//! RPC server, CLI/env parsing, template/config installers, the on-disk
//! config reader/writer, and the stdio/HTTP transport choice are all
//! explicitly out of scope (`spec.md` §1) and are expected to depend on
//! this crate rather than the other way around.
//!
//! - [`error`] - the `CoreError` taxonomy and its `{error, error_type,
//!   instruction}` serialization.
//! - [`uri`] - the `guide://<collection>[/<document-path>]` parser.
//! - [`project`] - the `ProjectConfig` read-only flag-resolution interface.
//! - [`response`] - the response-injection helper wrapping the ledger.
//! - [`logging`] - the `tracing` subscriber bootstrap.
//!
//! The actual components (A-L from `spec.md` §2) live in the
//! [`guide_templates`] and [`guide_workflow`] crates this one re-exports.

pub mod error;
pub mod logging;
pub mod project;
pub mod response;
pub mod uri;

pub use error::CoreError;
pub use project::ProjectConfig;
pub use response::{inject_pending_instruction, INSTRUCTION_FIELD};
pub use uri::GuideUri;

pub use guide_templates;
pub use guide_workflow;
