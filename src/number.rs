//! Parsing and printing of money and quantities.
//!
//! Russian price lists write `12 345,67 руб.`; exported spreadsheets and
//! English sources write `12,345.67`. [`parse_decimal`] accepts both.
//! [`NumberFormat`] controls how values are printed into text documents.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Characters used as thousands separators in the wild.
const GROUP_CHARS: [char; 5] = [' ', '\u{a0}', '\u{202f}', '\u{2009}', '\''];

/// Currency markers stripped before parsing, longest first.
const CURRENCY_MARKERS: [&str; 8] = ["руб.", "руб", "rub", "rur", "р.", "₽", "р", "$"];

/// Parse a human-written number. Returns `None` for blanks and garbage.
///
/// ```
/// use kp_generator::number::parse_decimal;
/// use rust_decimal::Decimal;
///
/// assert_eq!(parse_decimal("12 345,67 руб."), Some(Decimal::new(1234567, 2)));
/// assert_eq!(parse_decimal("1,234.5"), Some(Decimal::new(12345, 1)));
/// assert_eq!(parse_decimal("abc"), None);
/// ```
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let mut s: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !GROUP_CHARS.contains(c))
        .collect();

    for marker in CURRENCY_MARKERS {
        if let Some(rest) = s.strip_suffix(marker) {
            s = rest.to_string();
            break;
        }
    }
    if let Some(rest) = s.strip_prefix('$') {
        s = rest.to_string();
    }
    if s.is_empty() {
        return None;
    }

    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(d), Some(c)) => {
            // The right-most separator is the decimal point.
            let (decimal, group) = if d > c { ('.', ',') } else { (',', '.') };
            s.replace(group, "").replace(decimal, ".")
        }
        (None, Some(_)) if s.matches(',').count() > 1 => s.replace(',', ""),
        (None, Some(_)) => s.replace(',', "."),
        (Some(_), None) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s,
    };

    if !normalized
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+')
    {
        return None;
    }
    Decimal::from_str(&normalized).ok()
}

/// Lossless-looking conversion of a spreadsheet float.
///
/// Goes through the shortest round-trip text form, so `0.1` becomes
/// `0.1` instead of `0.1000000000000000055511151231`.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string()).ok()
}

/// How numbers are printed into DOCX text and XLSX string cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    /// Fraction digits for money. Default: 2.
    pub decimals: u32,
    /// Default: `,`.
    pub decimal_separator: char,
    /// Inserted between groups of three digits. Default: a space.
    pub thousands_separator: String,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimals: 2,
            decimal_separator: ',',
            thousands_separator: " ".to_string(),
        }
    }
}

impl NumberFormat {
    /// Money with fixed decimals and grouped thousands: `12 345,67`.
    pub fn money(&self, value: Decimal) -> String {
        let rounded = value.round_dp_with_strategy(self.decimals, RoundingStrategy::MidpointAwayFromZero);
        let mut padded = rounded.abs();
        padded.rescale(self.decimals);
        let text = padded.to_string();
        let (int_part, frac_part) = match text.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (text.as_str(), None),
        };

        let mut out = String::new();
        if rounded.is_sign_negative() && !rounded.is_zero() {
            out.push('-');
        }
        out.push_str(&group_thousands(int_part, &self.thousands_separator));
        if let Some(f) = frac_part {
            out.push(self.decimal_separator);
            out.push_str(f);
        }
        out
    }

    /// Quantity: integral values print without decimals, others unpadded.
    pub fn qty(&self, value: Decimal) -> String {
        let v = value.normalize();
        if v.fract().is_zero() {
            return v.trunc().to_string();
        }
        v.to_string().replace('.', &self.decimal_separator.to_string())
    }
}

fn group_thousands(digits: &str, sep: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3 * sep.len());
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push_str(sep);
        }
        out.push(ch);
    }
    out
}
