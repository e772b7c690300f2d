//! Reconstruct item rows from plain text lines (PDF text layer or OCR).
//!
//! There is no table structure in extracted text, only lines. A line is an
//! item when it splits into at least four cells and ends with two money
//! values:
//!
//! ```text
//! 1   Болт М8 оцинкованный    10   шт   5,00   50,00
//! │   │                       │    │    │      └ amount
//! │   └ name                  │    │    └ price
//! └ running number (dropped)  qty  unit
//! ```
//!
//! Cells are separated by tabs, runs of two or more spaces, `|` or `;`.
//! Lines where the text layer collapsed the gaps to single spaces are tried
//! once more against a whole-line pattern.

use crate::header::classify_totals;
use crate::model::Item;
use crate::number::parse_decimal;
use crate::pricing::round_money;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

static CELL_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\t+|\s{2,}|\s*\|\s*|\s*;\s*").expect("valid regex"));

static RUNNING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,4}[.)]?$").expect("valid regex"));

/// Single-spaced fallback: `[N] name qty unit price amount`.
static SINGLE_SPACED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\d{1,4}[.)]?\s+)?(?P<name>.+?)\s+(?P<qty>\d+(?:[.,]\d+)?)\s+(?P<unit>[^\d\s]{1,12})\s+(?P<price>\d{1,3}(?:[ \u{a0}]\d{3})*(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)\s+(?P<amount>\d{1,3}(?:[ \u{a0}]\d{3})*(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)$",
    )
    .expect("valid regex")
});

/// Parse every item line of `text`, in order. Non-item lines are ignored.
pub fn parse_items_from_text(text: &str) -> Vec<Item> {
    let mut items = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(item) => items.push(item),
            None => debug!("Line {} is not an item: {:?}", n + 1, line),
        }
    }
    items
}

/// Parse one line into an item.
pub fn parse_line(line: &str) -> Option<Item> {
    let cells: Vec<&str> = CELL_SPLIT
        .split(line)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if cells.len() >= 4 {
        if let Some(item) = parse_cells(&cells) {
            return Some(item);
        }
    }
    parse_single_spaced(line)
}

fn parse_cells(cells: &[&str]) -> Option<Item> {
    let mut cells = cells;
    if cells.len() >= 5 && RUNNING_NUMBER.is_match(cells[0]) {
        cells = &cells[1..];
    }
    let n = cells.len();
    if n < 4 {
        return None;
    }

    let amount = parse_decimal(cells[n - 1])?;
    let price = parse_decimal(cells[n - 2])?;
    let name = cells[0];
    let middle = &cells[1..n - 2];

    let mut qty = None;
    let mut unit_parts = Vec::new();
    for cell in middle {
        match (qty, parse_decimal(cell)) {
            (None, Some(v)) => qty = Some(v),
            _ => unit_parts.push(*cell),
        }
    }
    build_item(name, qty?, &unit_parts.join(" "), price, amount)
}

fn parse_single_spaced(line: &str) -> Option<Item> {
    let caps = SINGLE_SPACED.captures(line)?;
    build_item(
        caps.name("name")?.as_str(),
        parse_decimal(caps.name("qty")?.as_str())?,
        caps.name("unit")?.as_str(),
        parse_decimal(caps.name("price")?.as_str())?,
        parse_decimal(caps.name("amount")?.as_str())?,
    )
}

fn build_item(name: &str, qty: Decimal, unit: &str, price: Decimal, amount: Decimal) -> Option<Item> {
    let name = name.trim();
    if name.is_empty() || qty <= Decimal::ZERO || classify_totals(name).is_some() {
        return None;
    }
    if parse_decimal(name).is_some() {
        return None;
    }
    let price = round_money(price);
    let amount = if amount > Decimal::ZERO {
        round_money(amount)
    } else {
        round_money(qty.checked_mul(price)?)
    };
    Some(Item {
        name: name.to_string(),
        qty,
        unit: unit.trim().to_string(),
        price,
        amount,
        code: None,
        category: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn parses_wide_spaced_lines() {
        let text = "\
КОММЕРЧЕСКОЕ ПРЕДЛОЖЕНИЕ

№   Наименование        Кол-во   Ед.   Цена      Сумма
1   Болт М8 оцинк.      10       шт    5,00      50,00
2   Кабель ВВГ 3х2,5    12,5     м     88,40     1 105,00
    Итого:                                        1 155,00
";
        let items = parse_items_from_text(text);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Болт М8 оцинк.");
        assert_eq!(items[0].qty, d("10"));
        assert_eq!(items[0].unit, "шт");
        assert_eq!(items[0].price, d("5.00"));
        assert_eq!(items[0].amount, d("50.00"));
        assert_eq!(items[1].name, "Кабель ВВГ 3х2,5");
        assert_eq!(items[1].qty, d("12.5"));
        assert_eq!(items[1].amount, d("1105.00"));
    }

    #[test]
    fn parses_tab_and_pipe_separated() {
        let item = parse_line("Гайка М8\t100\tшт\t1,25\t125,00").unwrap();
        assert_eq!(item.qty, d("100"));
        let item = parse_line("| Шайба | шт | 40 | 0,50 | 20,00 |").unwrap();
        assert_eq!(item.name, "Шайба");
        assert_eq!(item.unit, "шт");
        assert_eq!(item.qty, d("40"));
    }

    #[test]
    fn falls_back_to_single_spaced_pattern() {
        let item = parse_line("3 Дюбель 6x40 200 шт 0,90 180,00").unwrap();
        assert_eq!(item.name, "Дюбель 6x40");
        assert_eq!(item.qty, d("200"));
        assert_eq!(item.unit, "шт");
        assert_eq!(item.price, d("0.90"));
        assert_eq!(item.amount, d("180.00"));
    }

    #[test]
    fn zero_amount_is_recomputed() {
        let item = parse_line("Трос  3  м  10,00  0").unwrap();
        assert_eq!(item.amount, d("30.00"));
    }

    #[test]
    fn skips_non_items() {
        assert!(parse_line("Наименование  Кол-во  Ед.  Цена  Сумма").is_none());
        assert!(parse_line("Итого  1  шт  10,00  10,00").is_none());
        assert!(parse_line("Болт  0  шт  5,00  0,00").is_none());
        assert!(parse_line("Телефон: +7 495 000-00-00").is_none());
        assert!(parse_items_from_text("").is_empty());
    }

    #[test]
    fn item_names_mentioning_vat_are_items() {
        let text = "\
1   Консультация по НДС    1   усл   100,00   100,00
2   Болт                   1   шт    5,00     5,00
    В т.ч. НДС 20%                              17,50
";
        let items = parse_items_from_text(text);
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Консультация по НДС", "Болт"]);
        assert!(parse_line("НДС 20%  1  шт  17,50  17,50").is_none());
    }
}
