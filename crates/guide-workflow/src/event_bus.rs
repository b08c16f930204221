//! Bit-flagged event dispatch (component F, `spec.md` §4.F, §9 "Bitflag
//! events"). Subscribers are held by weak reference only — the bus never
//! keeps a task alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;

use crate::task::Task;

/// Bitflag event kind. `TIMER` is deliberately a high bit so it can be
/// OR-combined with the low filesystem-kind bits and distinguished with a
/// single `&` test (`spec.md` §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind(pub u32);

impl EventKind {
    pub const FS_FILE_CONTENT: EventKind = EventKind(1);
    pub const FS_DIRECTORY: EventKind = EventKind(2);
    pub const FS_COMMAND: EventKind = EventKind(4);
    pub const FS_CWD: EventKind = EventKind(8);
    pub const TIMER: EventKind = EventKind(0x10000);

    pub const fn contains(self, other: EventKind) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_timer(self) -> bool {
        self.contains(EventKind::TIMER)
    }
}

impl std::ops::BitOr for EventKind {
    type Output = EventKind;
    fn bitor(self, rhs: EventKind) -> EventKind {
        EventKind(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for EventKind {
    type Output = EventKind;
    fn bitand(self, rhs: EventKind) -> EventKind {
        EventKind(self.0 & rhs.0)
    }
}

/// Payload delivered alongside an event. Filesystem events carry the path
/// that changed and, when available, its content; timer events carry
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct EventData {
    pub path: Option<String>,
    pub content: Option<Value>,
}

impl EventData {
    pub fn path(path: impl Into<String>) -> Self {
        Self { path: Some(path.into()), content: None }
    }

    pub fn with_content(path: impl Into<String>, content: Value) -> Self {
        Self { path: Some(path.into()), content: Some(content) }
    }
}

/// One subscription: a weak handle to a task, the kinds it cares about, and
/// (for timer subscriptions) the periodic-fire bookkeeping (`spec.md` §3).
struct Subscription {
    subscriber: Weak<dyn Task>,
    kinds: EventKind,
    interval: Option<Duration>,
    next_fire: Option<std::time::Instant>,
}

impl Subscription {
    fn is_alive(&self) -> bool {
        self.subscriber.strong_count() > 0
    }
}

/// Event bus: an ordered list of live subscriptions, dispatched sequentially
/// on the single cooperative scheduler (`spec.md` §5).
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscriptions: Vec::new() }
    }

    /// `subscribe(subscriber, kinds, interval?)`. Timer kinds require an
    /// interval; `next_fire_time = now + interval` is set immediately.
    pub fn subscribe(&mut self, subscriber: Weak<dyn Task>, kinds: EventKind, interval: Option<Duration>) {
        let next_fire = if kinds.is_timer() {
            Some(std::time::Instant::now() + interval.expect("timer subscription requires an interval"))
        } else {
            None
        };
        self.subscriptions.push(Subscription {
            subscriber,
            kinds,
            interval,
            next_fire,
        });
    }

    fn compact(&mut self) {
        self.subscriptions.retain(|s| s.is_alive());
    }

    /// Dispatch `kinds`/`data` to every live subscription whose kinds
    /// intersect, in subscription order. Each callback runs on its own
    /// spawned task so a subscriber that panics is caught as a `JoinError`
    /// and logged rather than taking down dispatch for the rest of the
    /// subscribers (`spec.md` §4.F "Subscriber throws during dispatch").
    pub async fn dispatch(&mut self, kinds: EventKind, data: &EventData) {
        self.compact();
        for sub in &self.subscriptions {
            if !sub.kinds.contains(kinds) {
                continue;
            }
            let Some(subscriber) = sub.subscriber.upgrade() else {
                continue;
            };
            let name = subscriber.name().to_string();
            let data = data.clone();
            let result = tokio::spawn(async move { subscriber.handle_event(kinds, &data).await }).await;
            if let Err(join_error) = result {
                tracing::error!(task = %name, error = %join_error, "task panicked while handling event; continuing");
            }
        }
    }

    /// Live subscribers whose kinds intersect `kinds`, in subscription
    /// order, without invoking them. Lets a caller that holds a lock across
    /// this call release it before dispatching — the bus itself has no
    /// business knowing whether its owner is holding one (`spec.md` §5:
    /// callers that serialize mutation behind a single lock must not hold
    /// it across a suspension point a dispatched task can re-enter).
    pub fn matching_subscribers(&mut self, kinds: EventKind) -> Vec<Weak<dyn Task>> {
        self.compact();
        self.subscriptions
            .iter()
            .filter(|sub| sub.kinds.contains(kinds))
            .map(|sub| sub.subscriber.clone())
            .collect()
    }

    /// Subscriptions currently due a timer tick (`next_fire_time <= now`),
    /// advancing their `next_fire_time` by one interval each.
    pub fn due_timers(&mut self) -> Vec<Weak<dyn Task>> {
        self.compact();
        let now = std::time::Instant::now();
        let mut due = Vec::new();
        for sub in &mut self.subscriptions {
            if !sub.kinds.is_timer() {
                continue;
            }
            if let Some(next) = sub.next_fire {
                if next <= now {
                    due.push(sub.subscriber.clone());
                    sub.next_fire = Some(next + sub.interval.unwrap());
                }
            }
        }
        due
    }

    pub fn live_subscription_count(&mut self) -> usize {
        self.compact();
        self.subscriptions.len()
    }
}
