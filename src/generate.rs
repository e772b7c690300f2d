//! Generation entry points: one extraction, one rendered document per
//! proposal variant.
//!
//! All variants are rendered into memory before the first file is written.
//! A template problem in any variant therefore writes nothing, and a
//! cancellation observed before persisting leaves the output directory as
//! it was.

use crate::cancel::CancelToken;
use crate::company::CompanyDirectory;
use crate::config::GeneratorConfig;
use crate::error::KpError;
use crate::model::{GeneratedDocument, Item, OutputFormat, ProposalRequest, ProposalVariant, Totals};
use crate::pipeline::extract::{self, Extraction, ExtractionSource};
use crate::pricing;
use crate::render::{self, Template};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Name of the default output folder under the user's documents.
pub const OUTPUT_DIR_NAME: &str = "KP_Generator_Output";

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub source: ExtractionSource,
    /// Items as extracted, before any pricing.
    pub items: Vec<Item>,
    pub documents: Vec<GeneratedDocument>,
    pub duration_ms: u64,
}

impl GenerationReport {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.documents.iter().map(|d| d.path.clone()).collect()
    }
}

/// Generate every variant of `request`.
///
/// Runs the blocking pipeline on tokio's blocking pool, since pdfium,
/// calamine and the tesseract subprocess are all synchronous.
///
/// # Errors
/// Any [`KpError`]; no output file exists when an error is returned.
pub async fn generate(
    request: ProposalRequest,
    companies: Arc<CompanyDirectory>,
    config: GeneratorConfig,
) -> Result<GenerationReport, KpError> {
    tokio::task::spawn_blocking(move || run(&request, &companies, &config, &CancelToken::new()))
        .await
        .map_err(|e| KpError::Internal(format!("generation task panicked: {e}")))?
}

/// Synchronous form of [`generate`] for callers without a runtime.
pub fn generate_sync(
    request: &ProposalRequest,
    companies: &CompanyDirectory,
    config: &GeneratorConfig,
) -> Result<GenerationReport, KpError> {
    run(request, companies, config, &CancelToken::new())
}

/// Extract items only, for previewing an input.
pub fn inspect(input: &Path, config: &GeneratorConfig) -> Result<Extraction, KpError> {
    extract::extract_items(input, config, &CancelToken::new())
}

/// The pipeline itself. `cancel` is honoured between OCR pages and before
/// anything is written.
pub fn run(
    request: &ProposalRequest,
    companies: &CompanyDirectory,
    config: &GeneratorConfig,
    cancel: &CancelToken,
) -> Result<GenerationReport, KpError> {
    let start = Instant::now();
    info!(
        "Starting generation: {} ({} variants)",
        request.input.display(),
        request.variants.len()
    );

    // ── Step 1: Validate request ─────────────────────────────────────────
    if request.variants.is_empty() {
        return Err(KpError::InvalidConfig("at least one proposal variant is required".into()));
    }
    for variant in &request.variants {
        companies.get(&variant.company_id)?;
        variant.pricing.rounding.validate()?;
    }
    let template = request.template.as_deref().map(Template::load).transpose()?;
    let format = render::output_format(template.as_ref());

    // ── Step 2: Extract ──────────────────────────────────────────────────
    let extraction = extract::extract_items(&request.input, config, cancel)?;

    // ── Step 3: Price and render every variant in memory ─────────────────
    let now = Local::now();
    let date = now.format(&config.date_format).to_string();
    let total = request.variants.len();
    let mut rendered: Vec<(GeneratedDocument, Vec<u8>)> = Vec::with_capacity(total);
    let mut taken: HashSet<PathBuf> = HashSet::new();

    for (idx, variant) in request.variants.iter().enumerate() {
        let number = idx + 1;
        let company = companies.get(&variant.company_id)?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_variant_start(number, total, &company.id);
        }
        info!(
            "Variant {}: company '{}', markup {}%, +{}, rounding {}",
            number,
            company.name,
            variant.pricing.markup_percent,
            variant.pricing.fixed_add,
            variant.pricing.rounding
        );

        let items = pricing::apply_pricing(&extraction.items, &variant.pricing)?;
        let bytes = render::render_document(template.as_ref(), company, &items, &date, config)?;
        let path = output_path_for(request, variant, &company.name, number, format, now);
        if !taken.insert(path.clone()) {
            return Err(KpError::InvalidConfig(format!(
                "two variants would write the same file '{}'",
                path.display()
            )));
        }

        rendered.push((
            GeneratedDocument {
                variant: number,
                company_id: company.id.clone(),
                path,
                format,
                item_count: items.len(),
                total: Totals::compute(&items, config.vat_rate).total,
            },
            bytes,
        ));
        if let Some(ref cb) = config.progress_callback {
            cb.on_variant_complete(number, total);
        }
    }

    // ── Step 4: Persist ──────────────────────────────────────────────────
    cancel.check()?;
    // Temp files first: a failed write leaves every existing file as it was.
    let mut staged = Vec::with_capacity(rendered.len());
    let mut documents = Vec::with_capacity(rendered.len());
    for (doc, bytes) in rendered {
        staged.push(render::stage(&doc.path, &bytes)?);
        documents.push(doc);
    }
    let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
    let mut created: Vec<PathBuf> = Vec::new();
    for file in staged {
        let path = file.path().to_path_buf();
        let existed = path.exists();
        if let Err(e) = file.commit() {
            remove_partial(&created);
            return Err(e);
        }
        if !existed {
            created.push(path.clone());
        }
        written.push(path);
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_complete(&written);
    }
    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Generation complete: {} documents in {}ms",
        documents.len(),
        duration_ms
    );

    Ok(GenerationReport {
        source: extraction.source,
        items: extraction.items,
        documents,
        duration_ms,
    })
}

/// Undo the files a run created before a rename failed. Files it replaced
/// are kept.
fn remove_partial(paths: &[PathBuf]) {
    for p in paths {
        if let Err(e) = std::fs::remove_file(p) {
            warn!("Could not remove partial output {}: {}", p.display(), e);
        }
    }
}

// ── Output naming ────────────────────────────────────────────────────────

/// Company name reduced to characters safe in file names; spaces become
/// underscores.
pub fn safe_file_stem(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let stem = kept.trim().replace(' ', "_");
    if stem.is_empty() {
        "company".to_string()
    } else {
        stem
    }
}

/// `КП_{company}_{YYYYmmdd_HHMMSS}_v{n}.{ext}`
pub fn auto_file_name(company_name: &str, timestamp: DateTime<Local>, number: usize, format: OutputFormat) -> String {
    format!(
        "КП_{}_{}_v{}.{}",
        safe_file_stem(company_name),
        timestamp.format("%Y%m%d_%H%M%S"),
        number,
        format.extension()
    )
}

fn output_path_for(
    request: &ProposalRequest,
    variant: &ProposalVariant,
    company_name: &str,
    number: usize,
    format: OutputFormat,
    now: DateTime<Local>,
) -> PathBuf {
    match variant.output_path {
        Some(ref p) => p.clone(),
        None => request
            .output_dir
            .join(auto_file_name(company_name, now, number, format)),
    }
}

/// `~/Documents/KP_Generator_Output`, created if needed; `./output` when
/// that is not possible.
pub fn default_output_dir() -> PathBuf {
    let preferred = dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Documents")))
        .map(|d| d.join(OUTPUT_DIR_NAME));
    if let Some(dir) = preferred {
        match std::fs::create_dir_all(&dir) {
            Ok(()) => return dir,
            Err(e) => warn!("Cannot use {}: {}; falling back to ./output", dir.display(), e),
        }
    }
    PathBuf::from("output")
}
