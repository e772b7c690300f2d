//! Data model shared by every pipeline stage.
//!
//! Money and quantities are [`Decimal`] throughout: prices must round exactly
//! to kopecks, and binary floats do not.

use crate::error::KpError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One goods/service line of a price list or proposal.
///
/// Extracted once from the input and never mutated afterwards; pricing
/// produces a new `Item`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub qty: Decimal,
    pub unit: String,
    /// Per-unit price.
    pub price: Decimal,
    /// Line total. `qty × price` unless the source stated its own value.
    pub amount: Decimal,
    /// Article / SKU column, when the source has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Section heading the item appeared under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Item {
    /// Build an item whose amount is `qty × price` rounded to kopecks.
    pub fn new(name: impl Into<String>, qty: Decimal, unit: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            qty,
            unit: unit.into(),
            price,
            amount: crate::pricing::round_money(price * qty),
            code: None,
            category: None,
        }
    }
}

/// One company the proposal can be issued from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: String,
    pub name: String,
    /// Taxpayer identification number (ИНН).
    pub inn: String,
    pub address: String,
    pub phone: String,
    /// Director's name as printed under the signature.
    pub ceo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<PathBuf>,
}

/// How adjusted prices are rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundingPolicy {
    /// Keep the computed value as is.
    #[default]
    None,
    /// Nearest whole ruble.
    NearestInteger,
    /// Nearest multiple of the step, e.g. 10, 50, 100 or 0.5.
    NearestStep(Decimal),
}

impl fmt::Display for RoundingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingPolicy::None => write!(f, "none"),
            RoundingPolicy::NearestInteger => write!(f, "1"),
            RoundingPolicy::NearestStep(step) => write!(f, "{}", step.normalize()),
        }
    }
}

impl FromStr for RoundingPolicy {
    type Err = KpError;

    /// Accepts `none`, `integer`/`1`, or any positive step (`10`, `0,5`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "" | "none" | "off" | "no" | "без округления" => Ok(RoundingPolicy::None),
            "integer" | "int" | "1" => Ok(RoundingPolicy::NearestInteger),
            other => {
                let step = crate::number::parse_decimal(other).ok_or_else(|| {
                    KpError::InvalidConfig(format!("Invalid rounding step '{other}'"))
                })?;
                if step <= Decimal::ZERO {
                    return Err(KpError::InvalidConfig(format!(
                        "Rounding step must be positive, got {other}"
                    )));
                }
                let policy = if step == Decimal::ONE {
                    RoundingPolicy::NearestInteger
                } else {
                    RoundingPolicy::NearestStep(step)
                };
                policy.validate()?;
                Ok(policy)
            }
        }
    }
}

impl RoundingPolicy {
    /// Steps must be positive and no finer than one kopeck, since rounded
    /// prices are printed with two decimals.
    pub fn validate(&self) -> Result<(), KpError> {
        match self {
            RoundingPolicy::NearestStep(step) if *step <= Decimal::ZERO => Err(KpError::InvalidConfig(
                format!("Rounding step must be positive, got {step}"),
            )),
            RoundingPolicy::NearestStep(step) if step.normalize().scale() > 2 => {
                Err(KpError::InvalidConfig(format!(
                    "Rounding step {step} is finer than 0.01"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Markup, surcharge and rounding applied to every price of one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Percentage added to the source price. May be zero or negative.
    pub markup_percent: Decimal,
    /// Fixed amount added per unit after the markup.
    #[serde(default)]
    pub fixed_add: Decimal,
    #[serde(default)]
    pub rounding: RoundingPolicy,
}

impl PricingConfig {
    pub fn new(markup_percent: Decimal, rounding: RoundingPolicy) -> Self {
        Self {
            markup_percent,
            fixed_add: Decimal::ZERO,
            rounding,
        }
    }

    pub fn with_fixed_add(mut self, fixed_add: Decimal) -> Self {
        self.fixed_add = fixed_add;
        self
    }
}

/// One output document of a run: which company issues it and at what prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalVariant {
    pub company_id: String,
    pub pricing: PricingConfig,
    /// Explicit output file. When `None` a name is generated in the output
    /// directory of the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl ProposalVariant {
    pub fn new(company_id: impl Into<String>, pricing: PricingConfig) -> Self {
        Self {
            company_id: company_id.into(),
            pricing,
            output_path: None,
        }
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

/// Everything one generation run needs besides configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRequest {
    /// Spreadsheet or PDF price list.
    pub input: PathBuf,
    /// DOCX or XLSX template. `None` generates the built-in XLSX layout.
    #[serde(default)]
    pub template: Option<PathBuf>,
    /// Where auto-named outputs go.
    pub output_dir: PathBuf,
    pub variants: Vec<ProposalVariant>,
}

/// Output document format, decided by the template (or its absence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Docx,
    Xlsx,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Docx => "docx",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

/// Result of one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedDocument {
    /// 1-based variant number.
    pub variant: usize,
    pub company_id: String,
    pub path: PathBuf,
    pub format: OutputFormat,
    pub item_count: usize,
    pub total: Decimal,
}

/// Totals printed below the goods table.
///
/// Prices are VAT-inclusive, so VAT is extracted from the total rather than
/// added on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total: Decimal,
    pub vat: Decimal,
    pub total_without_vat: Decimal,
}

impl Totals {
    pub fn compute(items: &[Item], vat_rate_percent: Decimal) -> Self {
        let total: Decimal = items.iter().map(|i| i.amount).sum();
        let hundred = Decimal::ONE_HUNDRED;
        let vat = if vat_rate_percent.is_zero() {
            Decimal::ZERO
        } else {
            let divisor = hundred + vat_rate_percent;
            let vat = match total.checked_mul(vat_rate_percent) {
                Some(scaled) => scaled / divisor,
                None => total / divisor * vat_rate_percent,
            };
            crate::pricing::round_money(vat)
        };
        Self {
            total,
            vat,
            total_without_vat: total - vat,
        }
    }
}
