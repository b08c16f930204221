//! The instruction ledger (component G, `spec.md` §4.G): a prioritized FIFO
//! of pending instruction text, a side-table of tracked instructions with
//! retry budgets, response injection, and acknowledgement.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Default retry budget when a caller does not specify one (`spec.md` §9
/// "Open questions": the spec states 3 in one path and implies 1 elsewhere;
/// 3 is canonical).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Opaque tracked-instruction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackedId(Uuid);

impl std::fmt::Display for TrackedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bookkeeping for a tracked instruction (`spec.md` §3 "Pending
/// instruction", variant (b)). The queue itself stores only text; this is
/// the side-table entry a `TrackedId` resolves to.
#[derive(Debug, Clone)]
pub struct TrackedInstruction {
    pub text: String,
    pub remaining_retries: u32,
    pub max_retries: u32,
    pub priority: bool,
    /// When this entry was first tracked, mirroring the teacher's
    /// `queued_at` column on its own tracked-task rows — surfaced so a
    /// caller inspecting a stuck tracked instruction can tell how long it
    /// has been waiting on acknowledgement.
    pub queued_at: DateTime<Utc>,
}

/// Prioritized, de-duplicated FIFO plus the tracked side-table.
///
/// Invariants upheld by construction (`spec.md` §8):
/// - every distinct text appears at most once in the queue (dedup),
/// - `0 <= remaining_retries <= max_retries` for every tracked entry,
/// - a `priority=true` insertion is always ahead of every `priority=false`
///   entry already queued.
#[derive(Default)]
pub struct InstructionLedger {
    queue: VecDeque<String>,
    tracked: HashMap<TrackedId, TrackedInstruction>,
}

impl InstructionLedger {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            tracked: HashMap::new(),
        }
    }

    /// `queue(text, priority)`. Empty strings never enter the queue
    /// (`spec.md` §8 boundary behavior). Already-present text is a no-op.
    pub fn queue(&mut self, text: impl Into<String>, priority: bool) {
        let text = text.into();
        if text.is_empty() || self.queue.contains(&text) {
            return;
        }
        if priority {
            self.queue.push_front(text);
        } else {
            self.queue.push_back(text);
        }
    }

    /// `queue_tracked(text, max_retries, priority) -> id`. Issues a new
    /// opaque id, inserts the text under the same dedup/priority rule, and
    /// records the tracking entry — even if the text was already present
    /// (a second call re-using the same text still gets its own tracked
    /// entry; only the *queue slot* is deduplicated, per `spec.md` §4.G).
    pub fn queue_tracked(&mut self, text: impl Into<String>, max_retries: u32, priority: bool) -> TrackedId {
        let text = text.into();
        self.queue(text.clone(), priority);
        let id = TrackedId(Uuid::new_v4());
        self.tracked.insert(
            id,
            TrackedInstruction {
                text,
                remaining_retries: max_retries,
                max_retries,
                priority,
                queued_at: Utc::now(),
            },
        );
        id
    }

    /// `inject(response)`: pop the head of the pending queue and set
    /// `additional_agent_instructions` on `response` if that key is absent
    /// or null. If `response` is not a JSON object, the instruction is
    /// pushed back at the head and `response` is returned unchanged
    /// (`spec.md` §4.G, §9 "Priority injection vs. side-effects").
    pub fn inject(&mut self, mut response: Value) -> Value {
        let Some(text) = self.queue.pop_front() else {
            return response;
        };

        let Some(obj) = response.as_object_mut() else {
            tracing::debug!("inject: response is not an object, pushing instruction back");
            self.queue.push_front(text);
            return response;
        };

        let already_set = obj
            .get("additional_agent_instructions")
            .map(|v| !v.is_null())
            .unwrap_or(false);

        if already_set {
            tracing::debug!("inject: additional_agent_instructions already set, pushing instruction back");
            self.queue.push_front(text);
            return response;
        }

        obj.insert("additional_agent_instructions".to_string(), Value::String(text));
        response
    }

    /// `acknowledge(id)`: drop the tracking entry. The pending queue is not
    /// touched — the text may already have been injected into a response.
    pub fn acknowledge(&mut self, id: TrackedId) {
        self.tracked.remove(&id);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    pub fn contains_tracked(&self, id: TrackedId) -> bool {
        self.tracked.contains_key(&id)
    }

    /// How long `id` has been waiting on acknowledgement, if it is still
    /// tracked.
    pub fn tracked_age(&self, id: TrackedId) -> Option<chrono::Duration> {
        self.tracked.get(&id).map(|entry| Utc::now() - entry.queued_at)
    }

    /// `spec.md` §4.G "Retry sweep": called by the retry task only when the
    /// pending queue is empty. Re-queues any tracked text no longer present
    /// in the queue, and drops any entry whose `remaining_retries` is
    /// *already* zero going into this sweep. An entry whose decrement
    /// reaches zero on this tick survives to be dropped on the next sweep
    /// that still finds it at zero — the drop always happens on the tick
    /// that *observes* zero, never the tick that produces it.
    pub fn retry_sweep(&mut self) {
        let mut to_drop = Vec::new();
        let ids: Vec<TrackedId> = self.tracked.keys().copied().collect();
        for id in ids {
            let entry = self.tracked.get(&id).expect("id came from tracked.keys()");
            if !self.queue.contains(&entry.text) {
                let priority = entry.priority;
                let text = entry.text.clone();
                self.queue(text, priority);
            }
            let entry = self.tracked.get_mut(&id).expect("id came from tracked.keys()");
            if entry.remaining_retries == 0 {
                to_drop.push(id);
                continue;
            }
            entry.remaining_retries -= 1;
        }
        for id in to_drop {
            self.tracked.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dedup_and_priority_scenario_1() {
        let mut ledger = InstructionLedger::new();
        ledger.queue("a", false);
        ledger.queue("b", false);
        ledger.queue("urgent", true);
        ledger.queue("a", true);

        let drained: Vec<String> = ledger.queue.iter().cloned().collect();
        assert_eq!(drained, vec!["urgent".to_string(), "a".to_string(), "b".to_string()]);
    }

    #[test]
    fn empty_string_never_enters_queue() {
        let mut ledger = InstructionLedger::new();
        ledger.queue("", false);
        assert!(ledger.is_empty());
    }

    #[test]
    fn inject_sets_field_when_absent() {
        let mut ledger = InstructionLedger::new();
        ledger.queue("do the thing", false);
        let response = ledger.inject(json!({"status": "ok"}));
        assert_eq!(response["additional_agent_instructions"], json!("do the thing"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn inject_skips_when_already_set() {
        let mut ledger = InstructionLedger::new();
        ledger.queue("do the thing", false);
        let response = ledger.inject(json!({"additional_agent_instructions": "existing"}));
        assert_eq!(response["additional_agent_instructions"], json!("existing"));
        assert_eq!(ledger.len(), 1, "instruction pushed back onto the queue");
    }

    #[test]
    fn inject_pushes_back_on_non_object_response() {
        let mut ledger = InstructionLedger::new();
        ledger.queue("do the thing", false);
        let response = ledger.inject(json!("not an object"));
        assert_eq!(response, json!("not an object"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn inject_on_empty_queue_is_a_no_op() {
        let mut ledger = InstructionLedger::new();
        let response = ledger.inject(json!({"status": "ok"}));
        assert_eq!(response, json!({"status": "ok"}));
    }

    #[test]
    fn retry_sweep_requeues_and_decrements_scenario_5() {
        let mut ledger = InstructionLedger::new();
        let id = ledger.queue_tracked("please do X", 2, false);

        // Injected once into a response; queue becomes empty.
        let _ = ledger.inject(json!({}));
        assert!(ledger.is_empty());

        ledger.retry_sweep();
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains_tracked(id));

        let _ = ledger.inject(json!({}));
        ledger.retry_sweep();
        assert!(ledger.contains_tracked(id));

        let _ = ledger.inject(json!({}));
        ledger.retry_sweep();
        assert!(!ledger.contains_tracked(id), "tracked entry dropped after retries exhausted");
    }

    #[test]
    fn max_retries_zero_drops_on_first_sweep() {
        let mut ledger = InstructionLedger::new();
        let id = ledger.queue_tracked("one shot", 0, false);
        let _ = ledger.inject(json!({}));
        ledger.retry_sweep();
        assert!(!ledger.contains_tracked(id));
    }

    #[test]
    fn retry_does_not_requeue_text_still_pending() {
        let mut ledger = InstructionLedger::new();
        let id = ledger.queue_tracked("still queued", 3, false);
        ledger.retry_sweep();
        assert_eq!(ledger.len(), 1, "text was never injected, so it should not be duplicated");
        assert_eq!(ledger.tracked.get(&id).unwrap().remaining_retries, 2);
    }

    #[test]
    fn acknowledge_removes_tracking_but_not_queue() {
        let mut ledger = InstructionLedger::new();
        let id = ledger.queue_tracked("tracked text", 3, false);
        ledger.acknowledge(id);
        assert!(!ledger.contains_tracked(id));
        assert_eq!(ledger.len(), 1, "queue slot survives acknowledgement");
    }
}
