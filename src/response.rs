//! The response-injection helper (`spec.md` §4.G "Inject", §6 "Response
//! payload convention"): the call the (external) RPC boundary makes on its
//! way out, handing the outgoing payload to the instruction ledger so the
//! next pending instruction (if any) rides along.

use serde_json::Value;

use guide_workflow::TaskSupervisor;

/// `additional_agent_instructions`: the field name the convention fixes
/// (`spec.md` §6).
pub const INSTRUCTION_FIELD: &str = "additional_agent_instructions";

/// Hand `response` to the supervisor's ledger for injection. Delegates
/// entirely to [`TaskSupervisor::process_response`]; this wrapper exists so
/// callers at the RPC boundary depend on the root crate's narrow surface
/// rather than reaching into `guide_workflow` directly.
pub async fn inject_pending_instruction(supervisor: &TaskSupervisor, response: Value) -> Value {
    supervisor.process_response(response).await
}
