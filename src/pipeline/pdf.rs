//! PDF access: text layer and page rasterisation.
//!
//! [`PdfBackend`] is the seam between extraction logic and pdfium, so the
//! text-or-OCR decision can be tested with an in-memory backend.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 drawing at 300 DPI is ~10 000 × 14 000 px.
//! `max_rendered_pixels` caps the longest edge regardless of physical size.

use crate::error::KpError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rasterisation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_pixels: u32,
}

/// One rasterised page, handed to the sink of [`PdfBackend::render_pages`].
pub struct RenderedPage {
    /// Zero-based page index.
    pub index: usize,
    pub total: usize,
    pub image: DynamicImage,
}

/// Backend trait for PDF access.
pub trait PdfBackend: Send + Sync {
    /// Backend identifier for logging.
    fn name(&self) -> &str;

    /// Embedded text of every page, in page order.
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, KpError>;

    /// Rasterise every page in order, passing each to `sink` as soon as it
    /// is ready. An error from `sink` stops rendering and is returned.
    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        options: RenderOptions,
        sink: &mut dyn FnMut(RenderedPage) -> Result<(), KpError>,
    ) -> Result<(), KpError>;
}

/// [`PdfBackend`] over the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    /// `library_path` overrides the discovery order of `kp_engines`.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, KpError> {
        Ok(kp_engines::bind_pdfium(self.library_path.as_deref())?)
    }
}

fn load_error(path: &Path, password: Option<&str>, e: PdfiumError) -> KpError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            KpError::format(path, "wrong PDF password")
        } else {
            KpError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        KpError::format(path, format!("PDF is corrupt or unreadable: {err_str}"))
    }
}

impl PdfBackend for PdfiumBackend {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, KpError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| load_error(path, password, e))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        info!("PDF loaded: {} pages", total);

        let mut texts = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| KpError::format(path, format!("page {}: {:?}", idx + 1, e)))?
                .all();
            debug!("Page {} text layer: {} chars", idx + 1, text.len());
            texts.push(text);
        }
        Ok(texts)
    }

    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        options: RenderOptions,
        sink: &mut dyn FnMut(RenderedPage) -> Result<(), KpError>,
    ) -> Result<(), KpError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| load_error(path, password, e))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.dpi as f32 / 72.0)
            .set_maximum_width(options.max_pixels as i32)
            .set_maximum_height(options.max_pixels as i32);

        for idx in 0..total {
            let page = pages.get(idx as u16).map_err(|e| {
                KpError::format(path, format!("page {}: {:?}", idx + 1, e))
            })?;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                KpError::Internal(format!("rasterisation of page {} failed: {:?}", idx + 1, e))
            })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            sink(RenderedPage {
                index: idx,
                total,
                image,
            })?;
        }
        Ok(())
    }
}
