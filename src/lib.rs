//! # kp-generator
//!
//! Turn a supplier price list into commercial proposals (КП) issued by one
//! or more of your companies, each with its own markup and rounding.
//!
//! ## Pipeline Overview
//!
//! ```text
//! price list (.xlsx/.xls/.ods/.pdf)
//!  │
//!  ├─ 1. Input    classify by extension + signature
//!  ├─ 2. Extract  spreadsheet header detection, PDF text layer,
//!  │              or tesseract OCR for scanned pages
//!  ├─ 3. Price    markup % + fixed surcharge + rounding, per variant
//!  ├─ 4. Render   DOCX / XLSX template, or the built-in XLSX layout
//!  └─ 5. Persist  all variants, atomically, only once every one rendered
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kp_generator::{
//!     generate_sync, CompanyDirectory, GeneratorConfig, PricingConfig, ProposalRequest,
//!     ProposalVariant, RoundingPolicy,
//! };
//! use rust_decimal::Decimal;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let companies = CompanyDirectory::load("companies.json")?;
//!     let pricing = PricingConfig::new(Decimal::from(20), RoundingPolicy::NearestStep(Decimal::from(10)));
//!     let request = ProposalRequest {
//!         input: "price.xlsx".into(),
//!         template: Some("kp_template.docx".into()),
//!         output_dir: kp_generator::default_output_dir(),
//!         variants: vec![ProposalVariant::new("alpha", pricing)],
//!     };
//!     let report = generate_sync(&request, &companies, &GeneratorConfig::default())?;
//!     for doc in &report.documents {
//!         println!("{} ({} items)", doc.path.display(), doc.item_count);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `kp-generator` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding the library in a GUI:
//! ```toml
//! kp-generator = { version = "0.3", default-features = false }
//! ```
//!
//! ## Templates
//!
//! Templates use `{{TOKEN}}` placeholders. Document tokens (`{{COMPANY_NAME}}`,
//! `{{TOTAL}}`, `{{DATE}}`, ...) may appear anywhere; item tokens
//! (`{{ITEM_NAME}}`, `{{ITEM_PRICE}}`, ...) mark the table row that is
//! repeated once per item. Templates without item tokens are filled by
//! locating the goods table by its header.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod company;
pub mod config;
pub mod error;
pub mod generate;
pub mod header;
pub mod model;
pub mod number;
pub mod pipeline;
pub mod pricing;
pub mod progress;
pub mod render;
pub mod tokens;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancelToken;
pub use company::CompanyDirectory;
pub use config::{ColumnLayout, ColumnMap, GeneratorConfig, GeneratorConfigBuilder, SheetSelector};
pub use error::{ErrorCategory, KpError, TemplateIssue};
pub use generate::{default_output_dir, generate, generate_sync, inspect, GenerationReport};
pub use model::{
    CompanyProfile, GeneratedDocument, Item, OutputFormat, PricingConfig, ProposalRequest,
    ProposalVariant, RoundingPolicy, Totals,
};
pub use number::NumberFormat;
pub use pipeline::extract::{Extraction, ExtractionSource};
pub use pricing::apply_pricing;
pub use progress::{GenerationProgress, NoopProgress, ProgressCallback};
pub use tokens::Token;
pub use worker::{GenerationHandle, Worker};
