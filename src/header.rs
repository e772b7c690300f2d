//! Recognition of goods-table header rows and totals rows.
//!
//! Input spreadsheets and templates without explicit item tokens are read by
//! looking for a header row (`Наименование | Кол-во | Ед. | Цена | Сумма`).
//! Cells are normalised to lowercase words before matching, so `Кол-во`,
//! `кол. во` and `КОЛ-ВО` all become `кол во`.

use std::collections::HashMap;

/// Semantic role of a goods-table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnRole {
    Code,
    Name,
    Qty,
    Unit,
    Price,
    Amount,
}

impl ColumnRole {
    /// Matching order: `Amount` claims "стоимость всего" before `Price`
    /// can claim it through "стоимость".
    const MATCH_ORDER: [ColumnRole; 6] = [
        ColumnRole::Code,
        ColumnRole::Name,
        ColumnRole::Qty,
        ColumnRole::Unit,
        ColumnRole::Amount,
        ColumnRole::Price,
    ];

    fn synonyms(self) -> &'static [&'static str] {
        match self {
            ColumnRole::Code => &["артикул", "арт", "код", "code", "sku", "part no"],
            ColumnRole::Name => &[
                "наименование",
                "наименования",
                "товар",
                "товары",
                "услуга",
                "услуги",
                "работы",
                "name",
                "description",
                "item",
            ],
            ColumnRole::Qty => &["количество", "кол во", "колво", "кол", "qty", "quantity"],
            ColumnRole::Unit => &[
                "ед",
                "ед изм",
                "едизм",
                "единица измерения",
                "единицы измерения",
                "unit",
                "units",
                "uom",
            ],
            ColumnRole::Price => &["цена", "цены", "стоимость", "price", "unit price"],
            ColumnRole::Amount => &["сумма", "итого", "стоимость всего", "всего", "amount", "total"],
        }
    }
}

/// Lowercase, `ё`→`е`, every non-alphanumeric run becomes one space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        let ch = if ch == 'ё' { 'е' } else { ch };
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Does the normalised `cell` contain `synonym` as a word sequence?
///
/// Single words of four or more letters also match as a word prefix
/// (`количество` matches `количеством`), shorter ones must match exactly so
/// that `ед` does not match `единицу`.
fn contains_phrase(cell: &str, synonym: &str) -> bool {
    let words: Vec<&str> = cell.split(' ').collect();
    let wanted: Vec<&str> = synonym.split(' ').collect();
    if wanted.len() > words.len() {
        return false;
    }
    if wanted.len() == 1 {
        let w = wanted[0];
        let prefix_ok = w.chars().count() >= 4;
        return words
            .iter()
            .any(|word| *word == w || (prefix_ok && word.starts_with(w)));
    }
    words.windows(wanted.len()).any(|win| win == wanted.as_slice())
}

/// Which role, if any, a single header cell names.
pub fn classify_header_cell(cell: &str) -> Option<ColumnRole> {
    let norm = normalize(cell);
    if norm.is_empty() {
        return None;
    }
    ColumnRole::MATCH_ORDER
        .into_iter()
        .find(|role| role.synonyms().iter().any(|s| contains_phrase(&norm, s)))
}

/// Column positions of a recognised header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMatch {
    pub columns: HashMap<ColumnRole, usize>,
}

impl HeaderMatch {
    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        self.columns.get(&role).copied()
    }

    pub fn has_all(&self, roles: &[ColumnRole]) -> bool {
        roles.iter().all(|r| self.columns.contains_key(r))
    }
}

/// Match one row of cell texts against the role synonyms.
///
/// Each column gets at most one role and each role its left-most column.
pub fn match_header<S: AsRef<str>>(cells: &[S]) -> HeaderMatch {
    let normalized: Vec<String> = cells.iter().map(|c| normalize(c.as_ref())).collect();
    let mut columns = HashMap::new();
    let mut taken = vec![false; normalized.len()];

    for role in ColumnRole::MATCH_ORDER {
        let found = normalized.iter().enumerate().find(|(idx, norm)| {
            !taken[*idx]
                && !norm.is_empty()
                && role.synonyms().iter().any(|s| contains_phrase(norm, s))
        });
        if let Some((idx, _)) = found {
            taken[idx] = true;
            columns.insert(role, idx);
        }
    }
    HeaderMatch { columns }
}

/// Summary rows printed under a goods table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalsRow {
    /// `Итого`, `Всего`, `Total`.
    Total,
    /// `В т.ч. НДС`, `НДС 20%`.
    Vat,
    /// `Итого без НДС`.
    WithoutVat,
}

/// Words that open a grand-total label.
const TOTAL_WORDS: [&str; 4] = ["итого", "итог", "всего", "total"];

/// Openers of a VAT line that may be followed by anything.
const VAT_PHRASES: [&str; 6] = [
    "в т ч ндс",
    "в том числе ндс",
    "включая ндс",
    "сумма ндс",
    "ндс по ставке",
    "including vat",
];

const WITHOUT_VAT_PHRASES: [&str; 5] = [
    "без ндс",
    "сумма без ндс",
    "ндс не облагается",
    "excluding vat",
    "excl vat",
];

/// Do `words` open with the word sequence `phrase`?
fn starts_with_phrase(words: &[&str], phrase: &str) -> bool {
    words.len() >= phrase.split(' ').count()
        && words.iter().zip(phrase.split(' ')).all(|(w, p)| *w == p)
}

fn vat_kind(words: &[&str]) -> Option<TotalsRow> {
    if WITHOUT_VAT_PHRASES.iter().any(|p| starts_with_phrase(words, p)) {
        return Some(TotalsRow::WithoutVat);
    }
    if VAT_PHRASES.iter().any(|p| starts_with_phrase(words, p)) {
        return Some(TotalsRow::Vat);
    }
    // Bare `НДС` / `VAT` only as the whole label or before a rate.
    match words {
        ["ндс" | "vat"] => Some(TotalsRow::Vat),
        ["ндс" | "vat", rate, ..] if rate.chars().all(|c| c.is_ascii_digit()) => Some(TotalsRow::Vat),
        _ => None,
    }
}

/// Classify the leading text of a row as a totals row.
///
/// The text must open with a totals label (`Итого`, `Всего`, `В т.ч. НДС`,
/// `НДС 20%`, `Total`, `VAT`). A label further into the text does not count:
/// `Консультация по НДС` is an item.
pub fn classify_totals(text: &str) -> Option<TotalsRow> {
    let norm = normalize(text);
    if norm.is_empty() {
        return None;
    }
    let words: Vec<&str> = norm.split(' ').collect();
    if TOTAL_WORDS.iter().any(|w| *w == words[0]) {
        return Some(vat_kind(&words[1..]).unwrap_or(TotalsRow::Total));
    }
    vat_kind(&words)
}
