//! Extraction stage: any supported input file → ordered item rows.
//!
//! ```text
//! spreadsheet ─────────────────────────────▶ spreadsheet::read_spreadsheet
//! pdf ── text layer ≥ threshold ───────────▶ table_text::parse_items_from_text
//!     └─ scanned ── locate OCR ── rasterise ── recognise ──┘
//! ```
//!
//! The OCR engine is created before the first page is rasterised: a missing
//! engine fails fast with [`KpError::OcrUnavailable`].

use crate::cancel::CancelToken;
use crate::config::GeneratorConfig;
use crate::error::KpError;
use crate::model::Item;
use crate::pipeline::input::{self, InputKind};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr};
use crate::pipeline::pdf::{PdfBackend, PdfiumBackend, RenderOptions};
use crate::pipeline::{spreadsheet, table_text};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Where the items came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExtractionSource {
    Spreadsheet { sheet: String },
    PdfText { pages: usize },
    PdfOcr { pages: usize },
}

/// Output of the extraction stage.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub items: Vec<Item>,
    pub source: ExtractionSource,
    pub duration_ms: u64,
}

/// Factory for the OCR engine, called only when a PDF turns out scanned.
pub type OcrFactory<'a> = &'a dyn Fn() -> Result<Box<dyn OcrEngine>, KpError>;

/// Extract items from `path` with the default engines.
pub fn extract_items(
    path: &Path,
    config: &GeneratorConfig,
    cancel: &CancelToken,
) -> Result<Extraction, KpError> {
    let kind = input::resolve_input(path)?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(path, kind.as_str());
    }

    match kind {
        InputKind::Spreadsheet => {
            let start = Instant::now();
            let sheet = spreadsheet::read_spreadsheet(path, &config.sheet, &config.column_layout)?;
            Ok(finish(
                config,
                sheet.items,
                ExtractionSource::Spreadsheet { sheet: sheet.sheet },
                start,
            ))
        }
        InputKind::Pdf => {
            let backend = PdfiumBackend::new(config.pdfium_library_path.clone());
            let make_ocr = || -> Result<Box<dyn OcrEngine>, KpError> {
                let engine = TesseractOcr::locate(
                    config.tesseract_path.as_deref(),
                    config.search_path.as_deref(),
                    &config.ocr_language,
                )?;
                Ok(Box::new(engine))
            };
            extract_pdf(path, config, &backend, &make_ocr, cancel)
        }
    }
}

/// Non-whitespace characters across all pages.
fn text_chars(texts: &[String]) -> usize {
    texts
        .iter()
        .map(|t| t.chars().filter(|c| !c.is_whitespace()).count())
        .sum()
}

/// Does the text layer look like a scan (little or no embedded text)?
pub fn is_scanned(texts: &[String], min_chars_per_page: usize) -> bool {
    text_chars(texts) < min_chars_per_page * texts.len().max(1)
}

/// Extract items from a PDF through the given backend and OCR factory.
pub fn extract_pdf(
    path: &Path,
    config: &GeneratorConfig,
    backend: &dyn PdfBackend,
    make_ocr: OcrFactory<'_>,
    cancel: &CancelToken,
) -> Result<Extraction, KpError> {
    let start = Instant::now();
    let password = config.pdf_password.as_deref();
    let texts = backend.page_texts(path, password)?;
    let pages = texts.len();

    if !is_scanned(&texts, config.min_text_chars_per_page) {
        info!(
            "Using PDF text layer ({} chars over {} pages, backend {})",
            text_chars(&texts),
            pages,
            backend.name()
        );
        let items = table_text::parse_items_from_text(&texts.join("\n"));
        if items.is_empty() {
            return Err(KpError::format(
                path,
                "the PDF text contains no recognisable item rows \
                 (expected lines like 'name  qty  unit  price  amount')",
            ));
        }
        return Ok(finish(config, items, ExtractionSource::PdfText { pages }, start));
    }

    info!("PDF has no usable text layer; running OCR on {} pages", pages);
    let ocr = make_ocr()?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_ocr_start(pages);
    }

    let mut recognised: Vec<String> = Vec::with_capacity(pages);
    let options = RenderOptions {
        dpi: config.ocr_dpi,
        max_pixels: config.max_rendered_pixels,
    };
    backend.render_pages(path, password, options, &mut |page| {
        cancel.check()?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_ocr_page_start(page.index + 1, page.total);
        }
        let text = ocr.recognize(&page.image)?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_ocr_page_complete(page.index + 1, page.total, text.chars().count());
        }
        recognised.push(text);
        Ok(())
    })?;

    if recognised.iter().all(|t| t.trim().is_empty()) {
        return Err(KpError::OcrUnavailable {
            reason: format!("{} produced no text for {} pages", ocr.name(), recognised.len()),
        });
    }

    let items = table_text::parse_items_from_text(&recognised.join("\n"));
    if items.is_empty() {
        warn!("OCR produced text but no item rows");
        return Err(KpError::format(
            path,
            "OCR found no recognisable item rows; check the scan quality or export the list to Excel",
        ));
    }
    Ok(finish(
        config,
        items,
        ExtractionSource::PdfOcr {
            pages: recognised.len(),
        },
        start,
    ))
}

fn finish(
    config: &GeneratorConfig,
    items: Vec<Item>,
    source: ExtractionSource,
    start: Instant,
) -> Extraction {
    if let Some(ref cb) = config.progress_callback {
        cb.on_items_extracted(items.len());
    }
    info!("Extracted {} items ({:?})", items.len(), source);
    Extraction {
        items,
        source,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
