//! Progress-callback trait for generation events.
//!
//! Inject an [`Arc<dyn GenerationProgress>`] via
//! [`crate::config::GeneratorConfigBuilder::progress_callback`] to follow a
//! run from a terminal spinner or a GUI status line.
//!
//! # Example
//!
//! ```rust
//! use kp_generator::{GenerationProgress, GeneratorConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl GenerationProgress for PageCounter {
//!     fn on_ocr_page_complete(&self, page: usize, total: usize, chars: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("OCR page {page}/{total}: {chars} chars");
//!     }
//! }
//!
//! let config = GeneratorConfig::builder()
//!     .progress_callback(Arc::new(PageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the generation pipeline as it advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events come from the worker thread running the
/// pipeline, never concurrently with each other.
pub trait GenerationProgress: Send + Sync {
    /// Called once the input file type is known.
    ///
    /// # Arguments
    /// * `input`: path of the price list
    /// * `kind`: `"spreadsheet"` or `"pdf"`
    fn on_extraction_start(&self, input: &Path, kind: &str) {
        let _ = (input, kind);
    }

    /// Called when a scanned PDF is about to be OCR'd page by page.
    fn on_ocr_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is rasterised and recognised.
    ///
    /// # Arguments
    /// * `page`: 1-indexed page number
    /// * `total`: pages in the document
    fn on_ocr_page_start(&self, page: usize, total: usize) {
        let _ = (page, total);
    }

    /// Called after a page has been recognised.
    ///
    /// # Arguments
    /// * `chars`: characters of text the engine returned
    fn on_ocr_page_complete(&self, page: usize, total: usize, chars: usize) {
        let _ = (page, total, chars);
    }

    /// Called once with the number of extracted item rows.
    fn on_items_extracted(&self, count: usize) {
        let _ = count;
    }

    /// Called before a variant is rendered.
    ///
    /// # Arguments
    /// * `variant`: 1-indexed variant number
    /// * `total`: variants in the request
    /// * `company_id`: issuing company
    fn on_variant_start(&self, variant: usize, total: usize, company_id: &str) {
        let _ = (variant, total, company_id);
    }

    /// Called after a variant has been rendered in memory.
    fn on_variant_complete(&self, variant: usize, total: usize) {
        let _ = (variant, total);
    }

    /// Called once after every output file has been written.
    fn on_generation_complete(&self, outputs: &[std::path::PathBuf]) {
        let _ = outputs;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl GenerationProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::GeneratorConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgress>;
