use std::fmt;
use std::sync::Arc;

/// Acknowledgement callback supplied by the host for one input element.
pub trait Acknowledge: Send + Sync {
    fn ack(&self);
}

impl<F> Acknowledge for F
where
    F: Fn() + Send + Sync,
{
    fn ack(&self) {
        self()
    }
}

/// Opaque acknowledgement handle carried by every [`Event`].
#[derive(Clone, Default)]
pub struct AckHandle(Option<Arc<dyn Acknowledge>>);

impl AckHandle {
    pub fn new(ack: Arc<dyn Acknowledge>) -> Self {
        Self(Some(ack))
    }

    pub fn from_fn(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    /// A handle whose acknowledgement does nothing.
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn ack(&self) {
        if let Some(inner) = &self.0 {
            inner.ack();
        }
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("AckHandle(..)"),
            None => f.write_str("AckHandle(noop)"),
        }
    }
}

/// One admitted input element. Immutable once created.
///
/// `seq` is assigned by the buffer on admission and is unique for the
/// buffer's lifetime.
#[derive(Debug)]
pub struct Event<T> {
    value: T,
    timestamp: i64,
    seq: u64,
    ack: AckHandle,
}

impl<T> Event<T> {
    pub(crate) fn new(value: T, timestamp: i64, seq: u64, ack: AckHandle) -> Self {
        Self {
            value,
            timestamp,
            seq,
            ack,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn ack_handle(&self) -> &AckHandle {
        &self.ack
    }

    pub fn ack(&self) {
        self.ack.ack();
    }
}
