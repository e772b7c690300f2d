//! Optical character recognition of rasterised pages.
//!
//! [`OcrEngine`] is implemented by [`TesseractOcr`], which drives the
//! `tesseract` command-line binary. The binary is located when the engine is
//! created, so a missing installation is reported before any page is
//! rasterised.

use crate::error::KpError;
use image::{DynamicImage, ImageFormat};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tracing::{debug, info};

/// Text recogniser for one page image.
pub trait OcrEngine: Send + Sync {
    /// Engine identifier for logging.
    fn name(&self) -> &str;

    /// Recognise the text of `image`. Lines are separated by `\n`.
    fn recognize(&self, image: &DynamicImage) -> Result<String, KpError>;
}

/// [`OcrEngine`] backed by the tesseract binary.
///
/// Page images are written as PNG into a private temp directory that is
/// removed when the engine is dropped.
#[derive(Debug)]
pub struct TesseractOcr {
    binary: PathBuf,
    language: String,
    workdir: TempDir,
    counter: AtomicUsize,
}

impl TesseractOcr {
    /// Locate tesseract and prepare a work directory.
    ///
    /// # Errors
    /// [`KpError::OcrUnavailable`] when no binary is found.
    pub fn locate(
        explicit: Option<&Path>,
        search_path: Option<&OsStr>,
        language: &str,
    ) -> Result<Self, KpError> {
        let binary = kp_engines::locate_tesseract(explicit, search_path)?;
        info!("Using tesseract at {}", binary.display());
        Self::with_binary(binary, language)
    }

    /// Use a known tesseract binary.
    pub fn with_binary(binary: PathBuf, language: &str) -> Result<Self, KpError> {
        let workdir = tempfile::Builder::new()
            .prefix("kp-ocr-")
            .tempdir()
            .map_err(|e| KpError::Internal(format!("tempdir: {e}")))?;
        Ok(Self {
            binary,
            language: language.to_string(),
            workdir,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, KpError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let png = self.workdir.path().join(format!("page-{n:04}.png"));
        image
            .save_with_format(&png, ImageFormat::Png)
            .map_err(|e| KpError::Internal(format!("cannot write page image: {e}")))?;

        // `--psm 6`: treat the page as one uniform block, which keeps table
        // rows on single lines.
        let output = Command::new(&self.binary)
            .arg(&png)
            .arg("stdout")
            .args(["-l", self.language.as_str(), "--psm", "6"])
            .output()
            .map_err(|e| KpError::OcrUnavailable {
                reason: format!("cannot run '{}': {e}", self.binary.display()),
            })?;

        // The image is no longer needed; the directory goes on drop anyway.
        if let Err(e) = std::fs::remove_file(&png) {
            debug!("Could not remove OCR page image {}: {}", png.display(), e);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = if stderr.contains("Failed loading language")
                || stderr.contains("Error opening data file")
            {
                format!(
                    "language data '{}' is not installed for tesseract",
                    self.language
                )
            } else {
                format!("tesseract exited with {}: {}", output.status, stderr.trim())
            };
            return Err(KpError::OcrUnavailable { reason });
        }

        let text = String::from_utf8_lossy(&output.stdout).replace("\r\n", "\n");
        debug!("OCR image {}: {} chars", n, text.len());
        Ok(text)
    }
}
