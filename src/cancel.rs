//! Cooperative cancellation of a generation run.

use crate::error::KpError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked by the pipeline between OCR pages and before any
/// output is persisted. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(KpError::Cancelled)` once [`CancelToken::cancel`] was called.
    pub fn check(&self) -> Result<(), KpError> {
        if self.is_cancelled() {
            Err(KpError::Cancelled)
        } else {
            Ok(())
        }
    }
}
