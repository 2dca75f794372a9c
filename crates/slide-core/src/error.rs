use std::sync::Mutex;

use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    #[error("configuration error")]
    Configuration,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("timestamp extraction error")]
    Extraction,
    #[error("window aggregation error")]
    Aggregation,
    #[error("late data publish error")]
    Publish,
    #[error("lifecycle error")]
    Lifecycle,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Configuration => 1001,
            Self::TypeMismatch => 1002,
            Self::Extraction => 1003,
            Self::Aggregation => 1004,
            Self::Publish => 1005,
            Self::Lifecycle => 1006,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;

// ---------------------------------------------------------------------------
// FailureSlot
// ---------------------------------------------------------------------------

/// Holds the first failure raised on a background task so that the admission
/// path can report it to the host.
#[derive(Default)]
pub(crate) struct FailureSlot {
    inner: Mutex<Option<(CoreReason, String)>>,
}

impl FailureSlot {
    pub(crate) fn record(&self, err: &CoreError) {
        let mut slot = self.inner.lock().expect("failure slot lock poisoned");
        if slot.is_none() {
            *slot = Some((err.reason().clone(), err.to_string()));
        }
    }

    /// Re-raise a recorded background failure, if any.
    pub(crate) fn check(&self) -> CoreResult<()> {
        let slot = self.inner.lock().expect("failure slot lock poisoned");
        match slot.as_ref() {
            Some((reason, detail)) => Err(StructError::from(reason.clone())
                .with_detail(format!("background evaluation failed: {detail}"))),
            None => Ok(()),
        }
    }
}
