use std::sync::Arc;

use super::event::Event;

/// One firing as seen by a [`WindowLifecycleListener`](super::WindowLifecycleListener).
///
/// `current` holds the events that remain in the window after this firing,
/// `expired` the events this firing removed. Together they form the buffer as
/// it was before eviction. `added` is the part of `current` that was not in
/// the previous activation.
#[derive(Debug)]
pub struct Activation<T> {
    pub current: Vec<Arc<Event<T>>>,
    pub added: Vec<Arc<Event<T>>>,
    pub expired: Vec<Arc<Event<T>>>,
    pub reference_time: i64,
}

/// Value view handed to a window function.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<T> {
    current: Vec<T>,
    added: Vec<T>,
    expired: Vec<T>,
    start_timestamp: Option<i64>,
    end_timestamp: Option<i64>,
}

impl<T: Clone> Window<T> {
    /// Build the value view of an activation. `length_ms` is the window
    /// length of duration windows; count windows have no start boundary.
    pub fn from_activation(activation: &Activation<T>, length_ms: Option<i64>) -> Self {
        let values = |events: &[Arc<Event<T>>]| -> Vec<T> {
            events.iter().map(|e| e.value().clone()).collect()
        };
        Self {
            current: values(&activation.current),
            added: values(&activation.added),
            expired: values(&activation.expired),
            start_timestamp: length_ms.map(|len| activation.reference_time.saturating_sub(len)),
            end_timestamp: Some(activation.reference_time),
        }
    }
}

impl<T> Window<T> {
    pub fn new(current: Vec<T>, added: Vec<T>, expired: Vec<T>) -> Self {
        Self {
            current,
            added,
            expired,
            start_timestamp: None,
            end_timestamp: None,
        }
    }

    pub fn with_bounds(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.start_timestamp = start;
        self.end_timestamp = end;
        self
    }

    pub fn current(&self) -> &[T] {
        &self.current
    }

    pub fn added(&self) -> &[T] {
        &self.added
    }

    pub fn expired(&self) -> &[T] {
        &self.expired
    }

    pub fn start_timestamp(&self) -> Option<i64> {
        self.start_timestamp
    }

    pub fn end_timestamp(&self) -> Option<i64> {
        self.end_timestamp
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
