//! CLI binary for kp-generator.
//!
//! A thin shim over the library crate: flags become a `GeneratorConfig`
//! and a `ProposalRequest`, the run goes through a `Worker` so Ctrl-C can
//! cancel it, and results are printed.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use kp_generator::number::parse_decimal;
use kp_generator::{
    default_output_dir, inspect, CompanyDirectory, GenerationProgress, GeneratorConfig,
    PricingConfig, ProgressCallback, ProposalRequest, ProposalVariant, RoundingPolicy,
    SheetSelector, Worker,
};
use rust_decimal::Decimal;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Progress ─────────────────────────────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Spinner while extracting, a page bar while OCR runs, one line per
/// rendered variant.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Reading");
        bar.set_message("price list…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl GenerationProgress for CliProgress {
    fn on_extraction_start(&self, input: &Path, kind: &str) {
        self.bar.set_message(format!("{} ({kind})", input.display()));
    }

    fn on_ocr_start(&self, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("OCR");
        self.bar.reset_eta();
    }

    fn on_ocr_page_complete(&self, page: usize, total: usize, chars: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page,
            total,
            dim(&format!("{chars:>5} chars"))
        ));
        self.bar.inc(1);
    }

    fn on_items_extracted(&self, count: usize) {
        self.bar.println(format!("{} {} items extracted", green("✓"), bold(&count.to_string())));
        self.bar.set_prefix("Rendering");
        self.bar.set_message("");
    }

    fn on_variant_start(&self, variant: usize, total: usize, company_id: &str) {
        self.bar.set_message(format!("variant {variant}/{total} for '{company_id}'"));
    }

    fn on_generation_complete(&self, _outputs: &[PathBuf]) {
        self.bar.finish_and_clear();
    }
}

// ── Arguments ────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # One proposal, 20 % markup rounded to tens, built-in layout
  kp-generator price.xlsx --company alpha --markup 20 --round 10

  # Two companies, two price levels, one DOCX template
  kp-generator price.pdf --template kp.docx \
      --variant company=alpha,markup=15,round=10 \
      --variant company=beta,markup=22,add=50,round=100,out=beta.docx

  # What would be extracted?
  kp-generator --inspect-only scan.pdf

VARIANT FIELDS:
  company=ID   company id from the companies file (required)
  markup=P     percent added to every price (default 0)
  add=A        fixed amount added per unit after the markup (default 0)
  round=R      none | 1 | any positive step such as 10, 50, 0.5 (default none)
  out=PATH     explicit output file (otherwise auto-named)

ENVIRONMENT VARIABLES:
  TESSERACT_PATH   tesseract binary used for scanned PDFs
  PDFIUM_LIB_PATH  libpdfium used to read PDFs
  RUST_LOG         overrides -v / -q
"#;

/// Generate commercial proposals from supplier price lists.
#[derive(Parser, Debug)]
#[command(
    name = "kp-generator",
    version,
    about = "Generate commercial proposals (DOCX/XLSX) from Excel or PDF price lists",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Price list: .xlsx, .xlsm, .xls, .xlsb, .ods or .pdf.
    input: Option<PathBuf>,

    /// DOCX or XLSX template. Without one the built-in XLSX layout is used.
    #[arg(short, long, env = "KP_TEMPLATE")]
    template: Option<PathBuf>,

    /// Company list (JSON).
    #[arg(long, env = "KP_COMPANIES", default_value = "companies.json")]
    companies: PathBuf,

    /// Directory for auto-named outputs. Default: ~/Documents/KP_Generator_Output.
    #[arg(short, long, env = "KP_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Proposal variant: company=ID,markup=P,add=A,round=R[,out=PATH]. Repeatable.
    #[arg(long = "variant", value_name = "SPEC")]
    variants: Vec<String>,

    /// Company of a single-variant run.
    #[arg(long, env = "KP_COMPANY")]
    company: Option<String>,

    /// Markup percent of a single-variant run.
    #[arg(long, env = "KP_MARKUP", default_value = "0", allow_hyphen_values = true)]
    markup: String,

    /// Fixed surcharge per unit of a single-variant run.
    #[arg(long, env = "KP_ADD", default_value = "0", allow_hyphen_values = true)]
    add: String,

    /// Rounding of a single-variant run: none, 1 or a step.
    #[arg(long, env = "KP_ROUND", default_value = "none")]
    round: String,

    /// Print extracted rows only, write nothing.
    #[arg(long)]
    inspect_only: bool,

    /// Print the companies file and exit.
    #[arg(long)]
    list_companies: bool,

    /// Machine-readable output on stdout.
    #[arg(long, env = "KP_JSON")]
    json: bool,

    /// Sheet of a spreadsheet input: name or 1-based number.
    #[arg(long, env = "KP_SHEET")]
    sheet: Option<String>,

    /// Sheet of an XLSX template that holds the goods table.
    #[arg(long, env = "KP_TEMPLATE_SHEET")]
    template_sheet: Option<String>,

    /// tesseract binary or the directory containing it.
    #[arg(long, env = "KP_TESSERACT")]
    tesseract: Option<PathBuf>,

    /// libpdfium file or the directory containing it.
    #[arg(long, env = "KP_PDFIUM")]
    pdfium: Option<PathBuf>,

    /// OCR language(s), `+`-separated.
    #[arg(long, env = "KP_OCR_LANG", default_value = "rus")]
    ocr_lang: String,

    /// Rasterisation DPI for OCR (72–600).
    #[arg(long, env = "KP_OCR_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    ocr_dpi: u32,

    /// VAT rate in percent, included in prices.
    #[arg(long, env = "KP_VAT", default_value = "20")]
    vat: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "KP_PDF_PASSWORD")]
    password: Option<String>,

    /// Also write a log file kp_generator_<timestamp>.log in this directory.
    #[arg(long, env = "KP_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "KP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "KP_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "KP_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    init_logging(&cli, show_progress)?;

    // ── Company list ─────────────────────────────────────────────────────
    let companies = CompanyDirectory::load(&cli.companies)
        .with_context(|| format!("Failed to load companies from {}", cli.companies.display()))?;

    if cli.list_companies {
        if cli.json {
            let profiles: Vec<_> = companies.iter().collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&profiles).context("Failed to serialize companies")?
            );
        } else {
            for c in companies.iter() {
                println!("{:<16} {}  {}", c.id, c.name, dim(&format!("ИНН {}", c.inn)));
            }
        }
        return Ok(());
    }

    let Some(input) = cli.input.clone() else {
        bail!("No input file given (see --help)");
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn GenerationProgress>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let extraction = tokio::task::block_in_place(|| inspect(&input, &config))
            .context("Failed to extract items")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&extraction).context("Failed to serialize items")?
            );
        } else {
            let fmt = &config.number_format;
            for (n, item) in extraction.items.iter().enumerate() {
                println!(
                    "{:>4}  {:<48} {:>10} {:<6} {:>14} {:>16}",
                    n + 1,
                    item.name,
                    fmt.qty(item.qty),
                    item.unit,
                    fmt.money(item.price),
                    fmt.money(item.amount)
                );
            }
            if !cli.quiet {
                eprintln!(
                    "{} items from {:?} in {}ms",
                    extraction.items.len(),
                    extraction.source,
                    extraction.duration_ms
                );
            }
        }
        return Ok(());
    }

    // ── Run generation ───────────────────────────────────────────────────
    let variants = build_variants(&cli, &companies)?;
    let request = ProposalRequest {
        input,
        template: cli.template.clone(),
        output_dir: cli.output_dir.clone().unwrap_or_else(default_output_dir),
        variants,
    };

    let worker = Worker::new(Arc::new(companies), config);
    let handle = worker.submit(request).context("Failed to start generation")?;
    let cancel = handle.cancel_token();
    let wait = handle.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        r = &mut wait => r,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelling…");
            cancel.cancel();
            wait.await
        }
    };
    let report = result.context("Generation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        for doc in &report.documents {
            println!("{}", doc.path.display());
        }
        if !cli.quiet {
            eprintln!(
                "{}  {} documents  {} items  {}ms",
                green("✔"),
                report.documents.len(),
                report.items.len(),
                report.duration_ms
            );
        }
    }
    Ok(())
}

fn init_logging(cli: &Cli, show_progress: bool) -> Result<()> {
    // The progress bar is the feedback; keep INFO logs off stderr while it runs.
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)));

    let file_layer = match cli.log_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let name = format!("kp_generator_{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"));
            let file = std::fs::File::create(dir.join(&name))
                .with_context(|| format!("Failed to create log file {name}"))?;
            let file_level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(file_level),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Map CLI args to `GeneratorConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GeneratorConfig> {
    let vat = parse_decimal(&cli.vat).with_context(|| format!("Invalid VAT rate '{}'", cli.vat))?;
    let mut builder = GeneratorConfig::builder()
        .ocr_language(cli.ocr_lang.clone())
        .ocr_dpi(cli.ocr_dpi)
        .vat_rate(vat);

    if let Some(ref p) = cli.tesseract {
        builder = builder.tesseract_path(p.clone());
    }
    if let Some(ref p) = cli.pdfium {
        builder = builder.pdfium_library_path(p.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.pdf_password(pwd.clone());
    }
    if let Some(ref s) = cli.sheet {
        builder = builder.sheet(SheetSelector::parse(s));
    }
    if let Some(ref s) = cli.template_sheet {
        builder = builder.template_sheet(s.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// `--variant` specs, or the single-variant shorthands when none is given.
fn build_variants(cli: &Cli, companies: &CompanyDirectory) -> Result<Vec<ProposalVariant>> {
    if !cli.variants.is_empty() {
        return cli.variants.iter().map(|s| parse_variant(s)).collect();
    }
    let company = match cli.company {
        Some(ref id) => id.clone(),
        None if companies.len() == 1 => companies.ids()[0].to_string(),
        None => bail!(
            "Choose a company with --company or --variant (known: {})",
            companies.ids().join(", ")
        ),
    };
    let pricing = pricing_from(&cli.markup, &cli.add, &cli.round)?;
    Ok(vec![ProposalVariant::new(company, pricing)])
}

fn pricing_from(markup: &str, add: &str, round: &str) -> Result<PricingConfig> {
    let number = |what: &str, raw: &str| -> Result<Decimal> {
        parse_decimal(raw).with_context(|| format!("Invalid {what} '{raw}'"))
    };
    let rounding: RoundingPolicy = round.parse()?;
    Ok(PricingConfig::new(number("markup", markup)?, rounding).with_fixed_add(number("surcharge", add)?))
}

/// Parse `company=ID,markup=P,add=A,round=R[,out=PATH]`.
///
/// A comma not followed by `key=` belongs to the previous value, so decimal
/// commas (`markup=12,5`) work.
fn parse_variant(spec: &str) -> Result<ProposalVariant> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for piece in spec.split(',') {
        match piece.split_once('=') {
            Some((key, value)) if is_variant_key(key.trim()) => {
                fields.push((key.trim().to_lowercase(), value.trim().to_string()));
            }
            _ => match fields.last_mut() {
                Some((_, value)) => {
                    value.push(',');
                    value.push_str(piece.trim());
                }
                None => bail!("Variant '{spec}': expected key=value, got '{piece}'"),
            },
        }
    }

    let get = |key: &str| fields.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
    let company = get("company").with_context(|| format!("Variant '{spec}' has no company="))?;
    let pricing = pricing_from(
        get("markup").unwrap_or("0"),
        get("add").unwrap_or("0"),
        get("round").unwrap_or("none"),
    )
    .with_context(|| format!("Variant '{spec}'"))?;

    let mut variant = ProposalVariant::new(company, pricing);
    if let Some(out) = get("out") {
        variant = variant.output_path(out);
    }
    Ok(variant)
}

fn is_variant_key(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "company" | "markup" | "add" | "round" | "out"
    )
}
