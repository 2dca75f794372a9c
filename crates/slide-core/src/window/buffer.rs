use std::collections::VecDeque;
use std::sync::Arc;

use super::event::{AckHandle, Event};
use super::eviction::{EvictAction, EvictionContext, EvictionPolicy};

/// Admissions between two partial eviction scans.
pub const COMPACTION_THRESHOLD: usize = 100;

/// Result of a full eviction scan.
pub struct Scan<T> {
    /// Events removed by this scan, in arrival order.
    pub expired: Vec<Arc<Event<T>>>,
    /// Events that make up the current window, in arrival order.
    pub window: Vec<Arc<Event<T>>>,
}

/// Arrival-ordered event buffer paired with its eviction policy.
///
/// Events are appended to the back. Eviction removes each event at most once:
/// a removed event is handed out exactly one time, either by
/// [`evict`](Self::evict) or by [`maybe_compact`](Self::maybe_compact).
/// Compaction expiries reach an activation only after they were deferred.
pub struct EventBuffer<T> {
    events: VecDeque<Arc<Event<T>>>,
    policy: EvictionPolicy,
    next_seq: u64,
    /// Expired by compaction, reported with the next activation.
    pending_expired: Vec<Arc<Event<T>>>,
    since_compaction: usize,
}

impl<T> EventBuffer<T> {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            events: VecDeque::new(),
            policy,
            next_seq: 0,
            pending_expired: Vec::new(),
            since_compaction: 0,
        }
    }

    /// Append a new event and let the eviction policy track it.
    pub fn push(&mut self, value: T, timestamp: i64, ack: AckHandle) -> Arc<Event<T>> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let event = Arc::new(Event::new(value, timestamp, seq, ack));
        self.policy.track(timestamp);
        self.events.push_back(Arc::clone(&event));
        self.since_compaction += 1;
        event
    }

    /// Run a partial scan from the head once [`COMPACTION_THRESHOLD`]
    /// admissions have accumulated. Returns the events expired by it; the
    /// caller signals them and hands them back with
    /// [`defer_expired`](Self::defer_expired).
    pub fn maybe_compact(&mut self) -> Vec<Arc<Event<T>>> {
        if self.since_compaction < COMPACTION_THRESHOLD {
            return Vec::new();
        }
        self.since_compaction = 0;

        let mut expired = Vec::new();
        while let Some(front) = self.events.front() {
            if self.policy.evict(front.timestamp()) != EvictAction::Expire {
                break;
            }
            let Some(event) = self.events.pop_front() else {
                break;
            };
            expired.push(event);
        }
        expired
    }

    /// Queue already-signalled compaction expiries for the next activation.
    pub fn defer_expired(&mut self, expired: Vec<Arc<Event<T>>>) {
        self.pending_expired.extend(expired);
    }

    /// Full scan against `reference_time`: removes expired events and returns
    /// them together with the current window.
    pub fn evict(&mut self, reference_time: i64) -> Scan<T> {
        let current_count = self
            .policy
            .needs_current_count()
            .then(|| self.count_until(reference_time));
        self.policy.set_context(EvictionContext {
            reference_time,
            current_count,
        });

        let mut scan = Scan {
            expired: Vec::new(),
            window: Vec::new(),
        };
        let mut retained = VecDeque::with_capacity(self.events.len());
        let mut events = std::mem::take(&mut self.events).into_iter();
        for event in events.by_ref() {
            match self.policy.evict(event.timestamp()) {
                EvictAction::Expire => scan.expired.push(event),
                EvictAction::Process => {
                    scan.window.push(Arc::clone(&event));
                    retained.push_back(event);
                }
                EvictAction::Keep => retained.push_back(event),
                EvictAction::Stop => {
                    retained.push_back(event);
                    break;
                }
            }
        }
        retained.extend(events);
        self.events = retained;
        self.since_compaction = 0;
        scan
    }

    /// Drain the events expired by compaction since the last activation.
    pub fn take_pending_expired(&mut self) -> Vec<Arc<Event<T>>> {
        std::mem::take(&mut self.pending_expired)
    }

    /// Number of buffered events with `timestamp <= ts`.
    pub fn count_until(&self, ts: i64) -> usize {
        self.events.iter().filter(|e| e.timestamp() <= ts).count()
    }

    /// Timestamps in `(after, upto]`, in arrival order.
    pub fn timestamps_between(&self, after: i64, upto: i64) -> Vec<i64> {
        if upto <= after {
            return Vec::new();
        }
        self.events
            .iter()
            .map(|e| e.timestamp())
            .filter(|ts| *ts > after && *ts <= upto)
            .collect()
    }

    /// Snapshot of the buffered events in arrival order.
    pub fn snapshot(&self) -> Vec<Arc<Event<T>>> {
        self.events.iter().cloned().collect()
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
