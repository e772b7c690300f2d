//! Placeholder tokens of DOCX and XLSX templates.
//!
//! The vocabulary is closed: every `{{NAME}}` in a template must be one of
//! [`Token::ALL`], otherwise the template is rejected before anything is
//! rendered. Row tokens (`ITEM_*`) are only valid inside the repeating item
//! row.

use crate::error::TemplateIssue;
use crate::model::{CompanyProfile, Item, Totals};
use crate::number::NumberFormat;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use std::collections::HashMap;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("valid regex"));

/// One placeholder of the template vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    // ── Document ──────────────────────────────────────────────────────────
    CompanyName,
    Inn,
    Address,
    Phone,
    Ceo,
    Date,
    Total,
    Vat,
    TotalWithoutVat,
    ItemCount,
    // ── Row ───────────────────────────────────────────────────────────────
    ItemNo,
    ItemName,
    ItemQty,
    ItemUnit,
    ItemPrice,
    ItemAmount,
    ItemCode,
    ItemCategory,
}

impl Token {
    pub const ALL: [Token; 18] = [
        Token::CompanyName,
        Token::Inn,
        Token::Address,
        Token::Phone,
        Token::Ceo,
        Token::Date,
        Token::Total,
        Token::Vat,
        Token::TotalWithoutVat,
        Token::ItemCount,
        Token::ItemNo,
        Token::ItemName,
        Token::ItemQty,
        Token::ItemUnit,
        Token::ItemPrice,
        Token::ItemAmount,
        Token::ItemCode,
        Token::ItemCategory,
    ];

    /// Name as written between the braces.
    pub fn name(self) -> &'static str {
        match self {
            Token::CompanyName => "COMPANY_NAME",
            Token::Inn => "INN",
            Token::Address => "ADDRESS",
            Token::Phone => "PHONE",
            Token::Ceo => "CEO",
            Token::Date => "DATE",
            Token::Total => "TOTAL",
            Token::Vat => "VAT",
            Token::TotalWithoutVat => "TOTAL_WITHOUT_VAT",
            Token::ItemCount => "ITEM_COUNT",
            Token::ItemNo => "ITEM_NO",
            Token::ItemName => "ITEM_NAME",
            Token::ItemQty => "ITEM_QTY",
            Token::ItemUnit => "ITEM_UNIT",
            Token::ItemPrice => "ITEM_PRICE",
            Token::ItemAmount => "ITEM_AMOUNT",
            Token::ItemCode => "ITEM_CODE",
            Token::ItemCategory => "ITEM_CATEGORY",
        }
    }

    pub fn from_name(name: &str) -> Option<Token> {
        Token::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Per-item token, valid only inside the repeating row.
    pub fn is_row(self) -> bool {
        matches!(
            self,
            Token::ItemNo
                | Token::ItemName
                | Token::ItemQty
                | Token::ItemUnit
                | Token::ItemPrice
                | Token::ItemAmount
                | Token::ItemCode
                | Token::ItemCategory
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{{{}}}}}", self.name())
    }
}

/// Every token of `text`, in order of appearance.
///
/// # Errors
/// [`TemplateIssue::UnknownToken`] for the first name outside the vocabulary.
pub fn scan(text: &str) -> Result<Vec<Token>, TemplateIssue> {
    TOKEN_RE
        .captures_iter(text)
        .map(|caps| {
            let name = &caps[1];
            Token::from_name(name).ok_or_else(|| TemplateIssue::UnknownToken(name.to_string()))
        })
        .collect()
}

/// Does `text` contain any row token? Unknown tokens are ignored here;
/// [`validate`] reports them.
pub fn has_row_token(text: &str) -> bool {
    TOKEN_RE
        .captures_iter(text)
        .any(|caps| Token::from_name(&caps[1]).is_some_and(Token::is_row))
}

/// Check the tokens of one piece of template text.
///
/// `in_row` is true for text inside the repeating item row.
pub fn validate(text: &str, in_row: bool) -> Result<(), TemplateIssue> {
    for token in scan(text)? {
        if token.is_row() && !in_row {
            return Err(TemplateIssue::ItemTokenOutsideRow(token.name().to_string()));
        }
    }
    Ok(())
}

/// Number of `{{…}}` placeholders in `text`, known or not.
pub fn count_placeholders(text: &str) -> usize {
    TOKEN_RE.find_iter(text).count()
}

/// The token when `text` is exactly one placeholder (surrounding whitespace
/// allowed). XLSX uses this to keep numeric cells numeric.
pub fn sole_token(text: &str) -> Option<Token> {
    let caps = TOKEN_RE.captures(text.trim())?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != text.trim().len() {
        return None;
    }
    Token::from_name(&caps[1])
}

/// Values substituted for tokens.
///
/// Every token has a text form; numeric tokens also carry the raw number so
/// spreadsheet cells can stay numeric.
#[derive(Debug, Clone, Default)]
pub struct TokenValues {
    text: HashMap<Token, String>,
    numbers: HashMap<Token, Decimal>,
}

impl TokenValues {
    pub fn set_text(&mut self, token: Token, value: impl Into<String>) {
        self.text.insert(token, value.into());
    }

    pub fn set_number(&mut self, token: Token, value: Decimal, formatted: impl Into<String>) {
        self.numbers.insert(token, value);
        self.text.insert(token, formatted.into());
    }

    pub fn text(&self, token: Token) -> Option<&str> {
        self.text.get(&token).map(String::as_str)
    }

    pub fn number(&self, token: Token) -> Option<Decimal> {
        self.numbers.get(&token).copied()
    }

    /// Company block, totals, item count and date.
    pub fn for_document(
        company: &CompanyProfile,
        totals: &Totals,
        item_count: usize,
        date: &str,
        format: &NumberFormat,
    ) -> Self {
        let mut v = TokenValues::default();
        v.set_text(Token::CompanyName, &company.name);
        v.set_text(Token::Inn, &company.inn);
        v.set_text(Token::Address, &company.address);
        v.set_text(Token::Phone, &company.phone);
        v.set_text(Token::Ceo, &company.ceo);
        v.set_text(Token::Date, date);
        v.set_number(Token::Total, totals.total, format.money(totals.total));
        v.set_number(Token::Vat, totals.vat, format.money(totals.vat));
        v.set_number(
            Token::TotalWithoutVat,
            totals.total_without_vat,
            format.money(totals.total_without_vat),
        );
        let count = Decimal::from(item_count as u64);
        v.set_number(Token::ItemCount, count, item_count.to_string());
        v
    }

    /// Values of one item row. `number` is 1-based.
    pub fn for_row(number: usize, item: &Item, format: &NumberFormat) -> Self {
        let mut v = TokenValues::default();
        v.set_number(Token::ItemNo, Decimal::from(number as u64), number.to_string());
        v.set_text(Token::ItemName, &item.name);
        v.set_number(Token::ItemQty, item.qty, format.qty(item.qty));
        v.set_text(Token::ItemUnit, &item.unit);
        v.set_number(Token::ItemPrice, item.price, format.money(item.price));
        v.set_number(Token::ItemAmount, item.amount, format.money(item.amount));
        v.set_text(Token::ItemCode, item.code.clone().unwrap_or_default());
        v.set_text(Token::ItemCategory, item.category.clone().unwrap_or_default());
        v
    }

    /// `self` with every value of `other` added on top.
    pub fn with(&self, other: &TokenValues) -> TokenValues {
        let mut merged = self.clone();
        merged.text.extend(other.text.iter().map(|(k, v)| (*k, v.clone())));
        merged.numbers.extend(other.numbers.iter().map(|(k, v)| (*k, *v)));
        merged
    }
}

/// Replace every token that has a value. Tokens without one are kept.
pub fn substitute(text: &str, values: &TokenValues) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    TOKEN_RE
        .replace_all(text, |caps: &Captures<'_>| {
            Token::from_name(&caps[1])
                .and_then(|t| values.text(t))
                .map(str::to_string)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company() -> CompanyProfile {
        CompanyProfile {
            id: "alpha".into(),
            name: "ООО «Альфа»".into(),
            inn: "7701234567".into(),
            address: "Москва".into(),
            phone: "+7 495 000-00-00".into(),
            ceo: "Иванов И.И.".into(),
            logo_path: None,
        }
    }

    #[test]
    fn names_round_trip() {
        for t in Token::ALL {
            assert_eq!(Token::from_name(t.name()), Some(t));
        }
        assert_eq!(Token::ItemName.to_string(), "{{ITEM_NAME}}");
    }

    #[test]
    fn scan_reports_unknown_tokens() {
        assert_eq!(
            scan("Поставщик: {{COMPANY_NAME}}, ИНН {{ INN }}").unwrap(),
            vec![Token::CompanyName, Token::Inn]
        );
        assert_eq!(
            scan("{{COMPANY}}").unwrap_err(),
            TemplateIssue::UnknownToken("COMPANY".into())
        );
        assert!(scan("no tokens, {single} braces").unwrap().is_empty());
    }

    #[test]
    fn row_tokens_outside_row_are_rejected() {
        assert!(validate("{{ITEM_NAME}}", true).is_ok());
        assert_eq!(
            validate("Итого {{ITEM_AMOUNT}}", false).unwrap_err(),
            TemplateIssue::ItemTokenOutsideRow("ITEM_AMOUNT".into())
        );
        assert!(validate("{{TOTAL}}", true).is_ok());
        assert!(has_row_token("x {{ITEM_QTY}} y"));
        assert!(!has_row_token("{{TOTAL}} {{BOGUS}}"));
    }

    #[test]
    fn sole_token_requires_whole_cell() {
        assert_eq!(sole_token(" {{ITEM_PRICE}} "), Some(Token::ItemPrice));
        assert_eq!(sole_token("{{ITEM_PRICE}} руб."), None);
        assert_eq!(sole_token("{{NOPE}}"), None);
    }

    #[test]
    fn substitutes_document_and_row_values() {
        let fmt = NumberFormat::default();
        let item = Item::new("Болт М8", "10".parse().unwrap(), "шт", "1234.5".parse().unwrap());
        let totals = Totals::compute(std::slice::from_ref(&item), Decimal::from(20));
        let doc = TokenValues::for_document(&company(), &totals, 1, "14.10.2026", &fmt);
        let row = doc.with(&TokenValues::for_row(1, &item, &fmt));

        assert_eq!(
            substitute("{{COMPANY_NAME}} (ИНН {{INN}}) от {{DATE}}", &doc),
            "ООО «Альфа» (ИНН 7701234567) от 14.10.2026"
        );
        assert_eq!(
            substitute("{{ITEM_NO}}. {{ITEM_NAME}} {{ITEM_QTY}} {{ITEM_UNIT}} × {{ITEM_PRICE}} = {{ITEM_AMOUNT}}", &row),
            "1. Болт М8 10 шт × 1 234,50 = 12 345,00"
        );
        assert_eq!(row.number(Token::ItemAmount), Some("12345.00".parse().unwrap()));
        assert_eq!(row.number(Token::ItemName), None);
        // Row tokens stay untouched at document level.
        assert_eq!(substitute("{{ITEM_NAME}}", &doc), "{{ITEM_NAME}}");
    }
}
