//! Configuration types for proposal generation.
//!
//! All run-wide behaviour is controlled through [`GeneratorConfig`], built via
//! its [`GeneratorConfigBuilder`]. Per-variant pricing lives in
//! [`crate::model::PricingConfig`]; everything else is here.

use crate::error::KpError;
use crate::number::NumberFormat;
use crate::progress::ProgressCallback;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a proposal-generation run.
///
/// Built via [`GeneratorConfig::builder()`] or using
/// [`GeneratorConfig::default()`].
///
/// # Example
/// ```rust
/// use kp_generator::GeneratorConfig;
///
/// let config = GeneratorConfig::builder()
///     .ocr_language("rus+eng")
///     .ocr_dpi(200)
///     .vat_rate(20)
///     .build()
///     .unwrap();
/// assert_eq!(config.ocr_dpi, 200);
/// ```
#[derive(Clone)]
pub struct GeneratorConfig {
    /// Explicit tesseract binary (file or directory). When set, no other
    /// location is searched.
    pub tesseract_path: Option<PathBuf>,

    /// Overrides `PATH` when searching for tesseract. Mostly for tests.
    pub search_path: Option<std::ffi::OsString>,

    /// Explicit libpdfium (file or directory).
    pub pdfium_library_path: Option<PathBuf>,

    /// Tesseract language(s), `+`-separated. Default: `rus`.
    pub ocr_language: String,

    /// DPI at which scanned pages are rasterised for OCR. Range: 72–600. Default: 300.
    pub ocr_dpi: u32,

    /// Longest edge of a rasterised page in pixels. Default: 5000.
    ///
    /// Caps memory for oversized pages; A4 at 300 DPI is 3508 px tall.
    pub max_rendered_pixels: u32,

    /// Non-whitespace characters per page below which a PDF counts as
    /// scanned. Default: 100.
    pub min_text_chars_per_page: usize,

    /// PDF user password for encrypted documents.
    pub pdf_password: Option<String>,

    /// Which sheet of a spreadsheet input holds the price list.
    pub sheet: SheetSelector,

    /// How spreadsheet columns are mapped to item fields.
    pub column_layout: ColumnLayout,

    /// Sheet of an XLSX template that receives the goods table. Default: first.
    pub template_sheet: Option<String>,

    /// Text formatting of numbers in documents.
    pub number_format: NumberFormat,

    /// VAT rate in percent, already included in prices. Default: 20.
    pub vat_rate: Decimal,

    /// `chrono` format for `{{DATE}}`. Default: `%d.%m.%Y`.
    pub date_format: String,

    /// Progress callback for front ends.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            search_path: None,
            pdfium_library_path: None,
            ocr_language: "rus".to_string(),
            ocr_dpi: 300,
            max_rendered_pixels: 5000,
            min_text_chars_per_page: 100,
            pdf_password: None,
            sheet: SheetSelector::default(),
            column_layout: ColumnLayout::default(),
            template_sheet: None,
            number_format: NumberFormat::default(),
            vat_rate: Decimal::from(20),
            date_format: "%d.%m.%Y".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("tesseract_path", &self.tesseract_path)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("ocr_language", &self.ocr_language)
            .field("ocr_dpi", &self.ocr_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("min_text_chars_per_page", &self.min_text_chars_per_page)
            .field("pdf_password", &self.pdf_password.as_ref().map(|_| "<redacted>"))
            .field("sheet", &self.sheet)
            .field("column_layout", &self.column_layout)
            .field("template_sheet", &self.template_sheet)
            .field("number_format", &self.number_format)
            .field("vat_rate", &self.vat_rate)
            .field("date_format", &self.date_format)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgress>"),
            )
            .finish()
    }
}

impl GeneratorConfig {
    /// Create a new builder for `GeneratorConfig`.
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GeneratorConfig`].
#[derive(Debug)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = Some(path.into());
        self
    }

    pub fn search_path(mut self, path: impl Into<std::ffi::OsString>) -> Self {
        self.config.search_path = Some(path.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_dpi(mut self, dpi: u32) -> Self {
        self.config.ocr_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn min_text_chars_per_page(mut self, n: usize) -> Self {
        self.config.min_text_chars_per_page = n;
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    pub fn sheet(mut self, sheet: SheetSelector) -> Self {
        self.config.sheet = sheet;
        self
    }

    pub fn column_layout(mut self, layout: ColumnLayout) -> Self {
        self.config.column_layout = layout;
        self
    }

    pub fn template_sheet(mut self, name: impl Into<String>) -> Self {
        self.config.template_sheet = Some(name.into());
        self
    }

    pub fn number_format(mut self, format: NumberFormat) -> Self {
        self.config.number_format = format;
        self
    }

    pub fn vat_rate(mut self, percent: impl Into<Decimal>) -> Self {
        self.config.vat_rate = percent.into();
        self
    }

    pub fn date_format(mut self, fmt: impl Into<String>) -> Self {
        self.config.date_format = fmt.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GeneratorConfig, KpError> {
        let c = &self.config;
        if c.ocr_language.trim().is_empty() {
            return Err(KpError::InvalidConfig("OCR language must not be empty".into()));
        }
        if c.vat_rate < Decimal::ZERO || c.vat_rate >= Decimal::ONE_HUNDRED {
            return Err(KpError::InvalidConfig(format!(
                "VAT rate must be 0–99 %, got {}",
                c.vat_rate
            )));
        }
        if c.number_format.decimals > 6 {
            return Err(KpError::InvalidConfig(format!(
                "At most 6 decimals are supported, got {}",
                c.number_format.decimals
            )));
        }
        if c.date_format.trim().is_empty() {
            return Err(KpError::InvalidConfig("Date format must not be empty".into()));
        }
        if let ColumnLayout::Fixed(ref map) = c.column_layout {
            map.validate()?;
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which sheet of a workbook to read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SheetSelector {
    /// The first sheet in workbook order (default).
    #[default]
    First,
    /// A sheet by exact name.
    Named(String),
    /// A sheet by zero-based position.
    Index(usize),
}

impl SheetSelector {
    /// `"3"` selects by 1-based number, anything else by name.
    pub fn parse(s: &str) -> Self {
        match s.trim().parse::<usize>() {
            Ok(n) if n >= 1 => SheetSelector::Index(n - 1),
            _ => SheetSelector::Named(s.trim().to_string()),
        }
    }
}

/// How spreadsheet columns are found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnLayout {
    /// Find a header row by column-name synonyms (default).
    #[default]
    Detect,
    /// Fixed zero-based column positions.
    Fixed(ColumnMap),
}

/// Zero-based column positions for [`ColumnLayout::Fixed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    /// Zero-based row where item data starts.
    pub first_data_row: usize,
    pub name: usize,
    pub qty: usize,
    pub unit: Option<usize>,
    pub price: usize,
    pub amount: Option<usize>,
    pub code: Option<usize>,
}

impl ColumnMap {
    fn validate(&self) -> Result<(), KpError> {
        let mut cols = vec![self.name, self.qty, self.price];
        cols.extend(self.unit);
        cols.extend(self.amount);
        cols.extend(self.code);
        let mut sorted = cols.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != cols.len() {
            return Err(KpError::InvalidConfig(format!(
                "Column map uses a column twice: {cols:?}"
            )));
        }
        Ok(())
    }
}
