//! Background generation for interactive front ends.
//!
//! A [`Worker`] runs at most one job at a time on its own thread, so a GUI
//! event loop stays responsive while a scanned PDF is OCR'd. Each job hands
//! back a [`GenerationHandle`] carrying the result channel and the job's
//! cancel flag.
//!
//! ```rust,no_run
//! use kp_generator::{CompanyDirectory, GeneratorConfig, ProposalRequest, Worker};
//! use std::sync::Arc;
//!
//! # async fn demo(request: ProposalRequest) -> Result<(), kp_generator::KpError> {
//! let companies = Arc::new(CompanyDirectory::load("companies.json")?);
//! let worker = Worker::new(companies, GeneratorConfig::default());
//! let handle = worker.submit(request)?;
//! let report = handle.wait().await?;
//! println!("{} documents", report.documents.len());
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancelToken;
use crate::company::CompanyDirectory;
use crate::config::GeneratorConfig;
use crate::error::KpError;
use crate::generate::{self, GenerationReport};
use crate::model::ProposalRequest;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Single-slot job runner.
#[derive(Clone)]
pub struct Worker {
    companies: Arc<CompanyDirectory>,
    config: GeneratorConfig,
    busy: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(companies: Arc<CompanyDirectory>, config: GeneratorConfig) -> Self {
        Self {
            companies,
            config,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `true` while a submitted job has not finished.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start `request` in the background.
    ///
    /// # Errors
    /// [`KpError::Busy`] when another job is still running.
    pub fn submit(&self, request: ProposalRequest) -> Result<GenerationHandle, KpError> {
        let guard = BusyGuard::acquire(&self.busy).ok_or(KpError::Busy)?;
        let cancel = CancelToken::new();
        let (tx, rx) = oneshot::channel();

        let companies = Arc::clone(&self.companies);
        let config = self.config.clone();
        let job_cancel = cancel.clone();
        std::thread::Builder::new()
            .name("kp-worker".into())
            .spawn(move || {
                let result = generate::run(&request, &companies, &config, &job_cancel);
                // Free the slot before the caller can observe the result.
                drop(guard);
                if tx.send(result).is_err() {
                    debug!("Generation result dropped: handle went away");
                }
            })
            .map_err(|e| KpError::Internal(format!("cannot start worker thread: {e}")))?;

        Ok(GenerationHandle { rx, cancel })
    }
}

/// A running job.
pub struct GenerationHandle {
    rx: oneshot::Receiver<Result<GenerationReport, KpError>>,
    cancel: CancelToken,
}

impl GenerationHandle {
    /// Ask the job to stop. It stops at the next OCR page or before writing
    /// output, and then resolves to [`KpError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<GenerationReport, KpError> {
        self.rx.await.map_err(|_| worker_lost())?
    }

    /// Blocking form of [`GenerationHandle::wait`]. Must not be called from
    /// inside an async context.
    pub fn wait_blocking(self) -> Result<GenerationReport, KpError> {
        self.rx.blocking_recv().map_err(|_| worker_lost())?
    }
}

fn worker_lost() -> KpError {
    warn!("Worker thread ended without a result");
    KpError::Internal("worker thread ended without a result".into())
}

/// Holds the busy flag; releases it on drop, including on panic.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PricingConfig, ProposalVariant};

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));
        let first = BusyGuard::acquire(&flag).unwrap();
        assert!(BusyGuard::acquire(&flag).is_none());
        drop(first);
        assert!(BusyGuard::acquire(&flag).is_some());
    }

    #[test]
    fn failed_job_frees_the_worker() {
        let worker = Worker::new(Arc::new(CompanyDirectory::default()), GeneratorConfig::default());
        let request = ProposalRequest {
            input: "missing.xlsx".into(),
            template: None,
            output_dir: "out".into(),
            variants: vec![ProposalVariant::new("nobody", PricingConfig::default())],
        };
        let handle = worker.submit(request.clone()).unwrap();
        let err = tokio_test::block_on(handle.wait()).unwrap_err();
        assert!(matches!(err, KpError::UnknownCompany { .. }));
        assert!(!worker.is_busy());
        assert!(worker.submit(request).is_ok());
    }
}
