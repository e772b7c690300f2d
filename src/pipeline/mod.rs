//! Extraction pipeline: input file → ordered [`Item`](crate::model::Item) rows.
//!
//! Each submodule implements exactly one step, so every step can be tested
//! without the others and the PDF engine can be swapped behind a trait.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ spreadsheet ─────────────────────────────┐
//!   │                                                ├──▶ Extraction
//!   └────▶ pdf (text layer) ──▶ table_text ──────────┤
//!               └──▶ pdf (rasterise) ──▶ ocr ──▶ table_text
//! ```
//!
//! 1. [`input`]       classify the file by extension and magic bytes
//! 2. [`spreadsheet`] read a goods table from a workbook with calamine
//! 3. [`pdf`]         text layer and rasterisation through pdfium
//! 4. [`ocr`]         recognise rasterised pages with tesseract
//! 5. [`table_text`]  rebuild item rows from plain text lines
//! 6. [`extract`]     choose the path and run it

pub mod extract;
pub mod input;
pub mod ocr;
pub mod pdf;
pub mod spreadsheet;
pub mod table_text;
