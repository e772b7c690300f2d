//! Error types for the kp-generator library.
//!
//! Every failure of a generation run is a [`KpError`]. Variants carry the
//! offending path and a human-readable detail; most messages end with a hint
//! line telling the user what to do next.
//!
//! Callers that only need the coarse taxonomy (a front end choosing an icon
//! or an exit code) use [`KpError::category`].

use std::path::PathBuf;
use thiserror::Error;

/// Coarse error taxonomy shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorCategory {
    /// Input could not be read or contained no usable table.
    FileFormat,
    /// A scanned PDF needs OCR but no engine produced text.
    OcrUnavailable,
    /// The template is missing required structure or has bad tokens.
    Template,
    /// The output could not be written.
    Io,
    /// Configuration or company directory problem.
    Config,
    /// A native engine could not be loaded.
    Engine,
    /// The run was cancelled or refused.
    Aborted,
    /// Bug or unexpected state.
    Internal,
}

/// What exactly is wrong with a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateIssue {
    /// No row with item tokens and no recognisable goods-table header.
    MissingRowMarker,
    /// A `{{…}}` token outside the supported vocabulary.
    UnknownToken(String),
    /// A per-item token used outside the repeating row.
    ItemTokenOutsideRow(String),
    /// A required package part is absent (e.g. `word/document.xml`).
    MissingPart(String),
    /// The named sheet does not exist in the template workbook.
    MissingSheet(String),
    /// The package or one of its XML parts could not be parsed.
    Malformed(String),
    /// The template extension is neither `.docx` nor `.xlsx`.
    UnsupportedFormat(String),
}

impl std::fmt::Display for TemplateIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateIssue::MissingRowMarker => write!(
                f,
                "no repeating item row found.\n\
                 Put {{{{ITEM_NAME}}}}, {{{{ITEM_QTY}}}}, {{{{ITEM_PRICE}}}}… into one table row, \
                 or give the goods table a header row (Наименование / Кол-во / Цена)."
            ),
            TemplateIssue::UnknownToken(t) => write!(f, "unknown placeholder {{{{{t}}}}}"),
            TemplateIssue::ItemTokenOutsideRow(t) => write!(
                f,
                "item placeholder {{{{{t}}}}} is used outside the repeating item row"
            ),
            TemplateIssue::MissingPart(p) => write!(f, "package part '{p}' is missing"),
            TemplateIssue::MissingSheet(s) => write!(f, "sheet '{s}' does not exist"),
            TemplateIssue::Malformed(d) => write!(f, "cannot be parsed: {d}"),
            TemplateIssue::UnsupportedFormat(ext) => {
                write!(f, "unsupported template type '{ext}' (expected .docx or .xlsx)")
            }
        }
    }
}

/// All errors returned by the kp-generator library.
#[derive(Debug, Error)]
pub enum KpError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The extension/magic bytes match no supported input type.
    #[error(
        "Unsupported input file '{path}'\n\
Supported: Excel (.xlsx, .xlsm, .xls, .xlsb, .ods) and PDF (.pdf)."
    )]
    UnsupportedInput { path: PathBuf },

    /// The file was opened but its content is unusable.
    #[error("Cannot read '{path}': {detail}")]
    FileFormat { path: PathBuf, detail: String },

    /// Encrypted PDF and no (or a wrong) password.
    #[error("PDF '{path}' is encrypted.\nProvide the password with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    // ── OCR ───────────────────────────────────────────────────────────────
    /// A scanned PDF needs OCR and the engine is missing or silent.
    #[error(
        "OCR unavailable: {reason}\n\n\
The PDF has no text layer and must be recognised with Tesseract.\n\
  • Install Tesseract OCR with the Russian language pack (rus).\n\
  • Or point TESSERACT_PATH / --tesseract at the tesseract binary.\n\
  • Or export the price list to Excel and use that instead."
    )]
    OcrUnavailable { reason: String },

    // ── Template ──────────────────────────────────────────────────────────
    /// Template could not be used.
    #[error("Template '{path}': {issue}")]
    Template { path: PathBuf, issue: TemplateIssue },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or request validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The company list file is unreadable or malformed.
    #[error("Company list '{path}': {detail}")]
    CompanyStore { path: PathBuf, detail: String },

    /// A variant references a company id that is not in the directory.
    #[error("Unknown company id '{id}'. Known ids: {known}")]
    UnknownCompany { id: String, known: String },

    /// A marked-up price or amount does not fit the decimal range.
    #[error("Cannot price '{item}': {detail}\nCheck the markup, surcharge and rounding step.")]
    Pricing { item: String, detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF input needs the PDFium shared library. You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n\
  • Pass --pdfium /path/to/libpdfium.\n\
  • Place libpdfium next to the kp-generator executable.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Run control ───────────────────────────────────────────────────────
    /// The caller cancelled the run; nothing was written.
    #[error("Generation cancelled; no files were written")]
    Cancelled,

    /// A worker already has a job in flight.
    #[error("A generation is already running; wait for it to finish")]
    Busy,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KpError {
    /// Shorthand for [`KpError::FileFormat`].
    pub fn format(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        KpError::FileFormat {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Shorthand for [`KpError::Template`].
    pub fn template(path: impl Into<PathBuf>, issue: TemplateIssue) -> Self {
        KpError::Template {
            path: path.into(),
            issue,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            KpError::FileNotFound { .. }
            | KpError::PermissionDenied { .. }
            | KpError::UnsupportedInput { .. }
            | KpError::FileFormat { .. }
            | KpError::PasswordRequired { .. } => ErrorCategory::FileFormat,
            KpError::OcrUnavailable { .. } => ErrorCategory::OcrUnavailable,
            KpError::Template { .. } => ErrorCategory::Template,
            KpError::OutputWriteFailed { .. } => ErrorCategory::Io,
            KpError::InvalidConfig(_)
            | KpError::CompanyStore { .. }
            | KpError::UnknownCompany { .. }
            | KpError::Pricing { .. } => ErrorCategory::Config,
            KpError::PdfiumBindingFailed(_) => ErrorCategory::Engine,
            KpError::Cancelled | KpError::Busy => ErrorCategory::Aborted,
            KpError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<kp_engines::EngineError> for KpError {
    fn from(e: kp_engines::EngineError) -> Self {
        match e {
            kp_engines::EngineError::TesseractNotFound { .. } => KpError::OcrUnavailable {
                reason: e.to_string(),
            },
            other => KpError::PdfiumBindingFailed(other.to_string()),
        }
    }
}
