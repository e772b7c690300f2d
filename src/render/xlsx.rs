//! Fill an Excel (XLSX) template.
//!
//! The goods table is anchored on one row of the designated sheet:
//!
//! * **Marker row**: the first row with an `ITEM_*` token.
//! * **Header row**: the first of the top 80 rows that reads as a goods
//!   header. The anchor is the row below it, and existing goods rows there
//!   are replaced.
//!
//! The anchor row, styles included, is copied once per item. Rows below are
//! shifted together with their merged ranges and formula references, the
//! sheet dimension is recomputed, and `calcChain.xml` is dropped so the
//! spreadsheet application recomputes formulas on open. Number fields are
//! written as numeric cells, text as inline strings; shared strings are only
//! read.

use crate::error::{KpError, TemplateIssue};
use crate::header::{classify_totals, match_header, ColumnRole, HeaderMatch, TotalsRow};
use crate::model::Item;
use crate::number::NumberFormat;
use crate::render::ooxml::{Element, Node, Package};
use crate::tokens::{self, Token, TokenValues};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::debug;

const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const CONTENT_TYPES: &str = "[Content_Types].xml";
const CALC_CHAIN: &str = "xl/calcChain.xml";

const HEADER_SCAN_ROWS: u32 = 80;
const HEADER_SCAN_COLS: u32 = 50;
/// Totals rows are looked for this far below the goods.
const TOTALS_SCAN_ROWS: usize = 5;

static FORMULA_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<sep>:?)(?P<col>\$?[A-Z]{1,3})(?P<abs>\$?)(?P<row>[0-9]+)\b").expect("valid regex")
});

/// Render `items` into the XLSX `package` loaded from `template`.
///
/// `sheet` names the sheet holding the goods table; `None` means the first.
pub fn render_xlsx(
    template: &Path,
    package: &Package,
    sheet: Option<&str>,
    items: &[Item],
    values: &TokenValues,
    format: &NumberFormat,
) -> Result<Vec<u8>, KpError> {
    let malformed = |e: String| KpError::template(template, TemplateIssue::Malformed(e));

    let mut package = package.clone();
    let sheet_part = resolve_sheet_part(template, &package, sheet)?;
    let shared = shared_strings(&package).map_err(malformed)?;
    let mut doc = package
        .xml(&sheet_part)
        .map_err(malformed)?
        .ok_or_else(|| KpError::template(template, TemplateIssue::MissingPart(sheet_part.clone())))?;

    let sheet_data = doc
        .root
        .child_mut("sheetData")
        .ok_or_else(|| malformed(format!("{sheet_part} has no sheetData")))?;
    let mut rows = take_rows(sheet_data);

    let marker = rows.iter().position(|row| {
        cells(&row.el).any(|(_, c)| tokens::has_row_token(&cell_text(c, &shared)))
    });
    for (pos, row) in rows.iter().enumerate() {
        for (_, c) in cells(&row.el) {
            tokens::validate(&cell_text(c, &shared), Some(pos) == marker)
                .map_err(|issue| KpError::template(template, issue))?;
        }
    }

    let plan = match marker {
        Some(pos) => marker_plan(&rows, pos, items, values, format, &shared),
        None => header_plan(&rows, items, &shared)
            .ok_or_else(|| KpError::template(template, TemplateIssue::MissingRowMarker))?,
    };
    debug!(
        "Anchor row {} ({} rows replaced) → {} item rows",
        plan.anchor,
        plan.consumed,
        plan.new_rows.len()
    );
    let shift = Shift {
        anchor: plan.anchor,
        consumed: plan.consumed,
        inserted: plan.new_rows.len() as u32,
    };

    // Reassemble rows in order: above, new, shifted.
    let mut assembled: Vec<SheetRow> = Vec::with_capacity(rows.len() + plan.new_rows.len());
    let mut new_rows = Some(plan.new_rows);
    for mut row in rows.drain(..) {
        if row.r >= shift.anchor {
            if let Some(new) = new_rows.take() {
                assembled.extend(new);
            }
        }
        if row.r < shift.anchor {
            shift_formulas(&mut row.el, &shift);
            assembled.push(row);
        } else if row.r >= shift.end() {
            let r = shift.row(row.r);
            renumber(&mut row.el, r);
            shift_formulas(&mut row.el, &shift);
            row.r = r;
            assembled.push(row);
        }
    }
    if let Some(new) = new_rows.take() {
        assembled.extend(new);
    }

    if let Some(header) = plan.header.as_ref() {
        fill_totals(&mut assembled, &shift, header, values, &shared);
    }
    for row in &mut assembled {
        substitute_row(&mut row.el, values, &shared);
    }

    let sheet_data = doc
        .root
        .child_mut("sheetData")
        .ok_or_else(|| malformed("sheetData vanished".into()))?;
    sheet_data.children = assembled.into_iter().map(|r| Node::Element(r.el)).collect();
    update_dimension(&mut doc.root);
    shift_merges(&mut doc.root, &shift);

    package.set_xml(&sheet_part, &doc).map_err(malformed)?;
    drop_calc_chain(&mut package).map_err(malformed)?;
    package.to_bytes().map_err(malformed)
}

// ── Workbook structure ───────────────────────────────────────────────────

fn resolve_sheet_part(template: &Path, package: &Package, sheet: Option<&str>) -> Result<String, KpError> {
    let malformed = |e: String| KpError::template(template, TemplateIssue::Malformed(e));
    let workbook = package
        .xml(WORKBOOK)
        .map_err(malformed)?
        .ok_or_else(|| KpError::template(template, TemplateIssue::MissingPart(WORKBOOK.into())))?;
    let rels = package
        .xml(WORKBOOK_RELS)
        .map_err(malformed)?
        .ok_or_else(|| KpError::template(template, TemplateIssue::MissingPart(WORKBOOK_RELS.into())))?;

    let sheets = workbook
        .root
        .child("sheets")
        .map(|s| s.elements().filter(|e| e.is("sheet")).collect::<Vec<_>>())
        .unwrap_or_default();
    let wanted = match sheet {
        Some(name) => sheets.iter().find(|s| s.attr("name") == Some(name)),
        None => sheets.first(),
    };
    let missing = || {
        KpError::template(
            template,
            TemplateIssue::MissingSheet(sheet.unwrap_or("<first>").to_string()),
        )
    };
    let wanted = wanted.ok_or_else(missing)?;
    let rel_id = wanted
        .attrs
        .iter()
        .find(|(k, _)| k.ends_with(":id"))
        .map(|(_, v)| v.as_str())
        .ok_or_else(missing)?;
    let target = rels
        .root
        .elements()
        .find(|r| r.attr("Id") == Some(rel_id))
        .and_then(|r| r.attr("Target"))
        .ok_or_else(missing)?;

    Ok(match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    })
}

/// Text of every shared string, by index.
fn shared_strings(package: &Package) -> Result<Vec<String>, String> {
    let Some(sst) = package.xml(SHARED_STRINGS)? else {
        return Ok(Vec::new());
    };
    Ok(sst
        .root
        .elements()
        .filter(|e| e.is("si"))
        .map(rich_text)
        .collect())
}

/// Text of an `si` / `is` element, skipping phonetic runs.
fn rich_text(e: &Element) -> String {
    e.elements()
        .map(|child| {
            if child.is("t") {
                child.text()
            } else if child.is("r") {
                child.child("t").map(Element::text).unwrap_or_default()
            } else {
                String::new()
            }
        })
        .collect()
}

fn drop_calc_chain(package: &mut Package) -> Result<(), String> {
    if !package.remove_part(CALC_CHAIN) {
        return Ok(());
    }
    if let Some(mut types) = package.xml(CONTENT_TYPES)? {
        types
            .root
            .children
            .retain(|n| !matches!(n, Node::Element(e) if e.attr("PartName") == Some("/xl/calcChain.xml")));
        package.set_xml(CONTENT_TYPES, &types)?;
    }
    if let Some(mut rels) = package.xml(WORKBOOK_RELS)? {
        rels.root.children.retain(|n| {
            !matches!(n, Node::Element(e) if e.attr("Target").is_some_and(|t| t.ends_with("calcChain.xml")))
        });
        package.set_xml(WORKBOOK_RELS, &rels)?;
    }
    if let Some(mut workbook) = package.xml(WORKBOOK)? {
        if let Some(calc) = workbook.root.child_mut("calcPr") {
            calc.set_attr("fullCalcOnLoad", "1");
            package.set_xml(WORKBOOK, &workbook)?;
        }
    }
    Ok(())
}

// ── Cells and rows ───────────────────────────────────────────────────────

struct SheetRow {
    r: u32,
    el: Element,
}

/// Zero-based column of a cell reference like `AB12`.
fn parse_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_uppercase() {
            return None;
        }
        col = col * 26 + (ch as u32 - 'A' as u32 + 1);
    }
    Some((col - 1, digits.parse().ok()?))
}

fn col_letters(col: u32) -> String {
    let mut n = col + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

fn make_ref(col: u32, row: u32) -> String {
    format!("{}{}", col_letters(col), row)
}

fn cell_col(c: &Element) -> Option<u32> {
    c.attr("r").and_then(parse_ref).map(|(col, _)| col)
}

/// Take the rows out of `sheetData`, giving every row and cell an explicit
/// reference.
fn take_rows(sheet_data: &mut Element) -> Vec<SheetRow> {
    let mut rows = Vec::new();
    let mut next_r = 1;
    for node in std::mem::take(&mut sheet_data.children) {
        let Node::Element(mut el) = node else {
            continue;
        };
        if !el.is("row") {
            continue;
        }
        let r = el.attr("r").and_then(|v| v.parse().ok()).unwrap_or(next_r);
        el.set_attr("r", r.to_string());
        let mut next_col = 0;
        for c in el.elements_mut().filter(|c| c.is("c")) {
            let col = cell_col(c).unwrap_or(next_col);
            c.set_attr("r", make_ref(col, r));
            next_col = col + 1;
        }
        next_r = r + 1;
        rows.push(SheetRow { r, el });
    }
    rows
}

fn cells(row: &Element) -> impl Iterator<Item = (u32, &Element)> {
    row.elements()
        .filter(|c| c.is("c"))
        .filter_map(|c| cell_col(c).map(|col| (col, c)))
}

fn cell_text(c: &Element, shared: &[String]) -> String {
    match c.attr("t") {
        Some("s") => c
            .child("v")
            .and_then(|v| v.text().trim().parse::<usize>().ok())
            .and_then(|i| shared.get(i))
            .cloned()
            .unwrap_or_default(),
        Some("inlineStr") => c.child("is").map(rich_text).unwrap_or_default(),
        _ => c.child("v").map(Element::text).unwrap_or_default(),
    }
}

/// Cell texts of a row indexed by column.
fn dense_texts(row: &Element, shared: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for (col, c) in cells(row) {
        if col >= HEADER_SCAN_COLS {
            break;
        }
        let col = col as usize;
        if out.len() <= col {
            out.resize(col + 1, String::new());
        }
        out[col] = cell_text(c, shared).trim().to_string();
    }
    out
}

fn is_blank(row: &Element, shared: &[String]) -> bool {
    cells(row).all(|(_, c)| cell_text(c, shared).trim().is_empty())
}

fn clear_value(c: &mut Element) {
    c.remove_attr("t");
    c.children.clear();
}

fn set_number(c: &mut Element, value: Decimal) {
    clear_value(c);
    let mut v = Element::new(c.qualified("v"));
    v.set_text(value.normalize().to_string());
    c.push(v);
}

fn set_string(c: &mut Element, text: &str) {
    clear_value(c);
    if text.is_empty() {
        return;
    }
    c.set_attr("t", "inlineStr");
    let mut t = Element::new(c.qualified("t"));
    t.set_attr("xml:space", "preserve");
    t.set_text(text);
    let mut is = Element::new(c.qualified("is"));
    is.push(t);
    c.push(is);
}

/// The cell at `col`, created in column order when absent.
fn cell_mut(row: &mut Element, col: u32) -> Option<&mut Element> {
    let r: u32 = row.attr("r").and_then(|v| v.parse().ok()).unwrap_or(1);
    let pos = row.children.iter().position(|n| {
        matches!(n, Node::Element(c) if c.is("c") && cell_col(c).is_some_and(|x| x >= col))
    });
    let exists = pos.is_some_and(|i| matches!(&row.children[i], Node::Element(c) if cell_col(c) == Some(col)));
    let idx = match pos {
        Some(i) if exists => i,
        _ => {
            let mut c = Element::new(row.qualified("c"));
            c.set_attr("r", make_ref(col, r));
            let i = pos.unwrap_or(row.children.len());
            row.children.insert(i, Node::Element(c));
            i
        }
    };
    row.at_path_mut(&[idx])
}

/// Move a row to number `r`, cell references included.
fn renumber(row: &mut Element, r: u32) {
    row.set_attr("r", r.to_string());
    for c in row.elements_mut().filter(|c| c.is("c")) {
        if let Some(col) = cell_col(c) {
            c.set_attr("r", make_ref(col, r));
        }
    }
}

/// Substitute tokens of every cell; a cell that is exactly one numeric token
/// becomes a numeric cell.
fn substitute_row(row: &mut Element, values: &TokenValues, shared: &[String]) {
    for c in row.elements_mut().filter(|c| c.is("c")) {
        let text = cell_text(c, shared);
        if !text.contains("{{") {
            continue;
        }
        match tokens::sole_token(&text).and_then(|t| values.number(t)) {
            Some(number) => set_number(c, number),
            None => {
                let replaced = tokens::substitute(&text, values);
                set_string(c, &replaced);
            }
        }
    }
}

// ── Row shifting ─────────────────────────────────────────────────────────

/// `consumed` rows starting at `anchor` are replaced by `inserted` rows.
#[derive(Debug, Clone, Copy)]
struct Shift {
    anchor: u32,
    consumed: u32,
    inserted: u32,
}

impl Shift {
    /// First row below the replaced block.
    fn end(&self) -> u32 {
        self.anchor + self.consumed
    }

    /// New number of a row at or below [`Shift::end`].
    fn row(&self, r: u32) -> u32 {
        (r + self.inserted).saturating_sub(self.consumed).max(1)
    }

    /// Last row of the inserted block.
    fn last_inserted(&self) -> u32 {
        (self.anchor + self.inserted).saturating_sub(1).max(self.anchor)
    }
}

/// A `FORMULA_REF` match that really is a cell reference: not the tail of
/// a longer name (`ATAN2`), not a function name (`LOG10(`) and not inside a
/// string literal.
struct CellRef<'h> {
    sep: &'h str,
    col: &'h str,
    abs: &'h str,
    row: u32,
}

fn cell_ref<'h>(formula: &'h str, caps: &Captures<'h>) -> Option<CellRef<'h>> {
    let col = caps.name("col")?;
    let whole = caps.get(0)?;
    let before = &formula[..col.start()];
    if before
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
    {
        return None;
    }
    if formula[whole.end()..].starts_with('(') || before.matches('"').count() % 2 == 1 {
        return None;
    }
    Some(CellRef {
        sep: caps.name("sep").map_or("", |m| m.as_str()),
        col: col.as_str(),
        abs: caps.name("abs").map_or("", |m| m.as_str()),
        row: caps["row"].parse().ok()?,
    })
}

/// Rewrite row references of a formula for the shift. References below the
/// block move, absolute ones included; a range ending inside the block grows
/// to cover the new rows.
fn shift_formula(formula: &str, shift: &Shift) -> String {
    FORMULA_REF
        .replace_all(formula, |caps: &Captures<'_>| {
            let Some(cr) = cell_ref(formula, caps) else {
                return caps[0].to_string();
            };
            let new_r = if cr.row >= shift.end() {
                shift.row(cr.row)
            } else if cr.row >= shift.anchor && !cr.sep.is_empty() {
                shift.last_inserted()
            } else {
                cr.row
            };
            format!("{}{}{}{}", cr.sep, cr.col, cr.abs, new_r)
        })
        .into_owned()
}

/// Formula of a copied template row: relative references to the template
/// row follow the copy.
fn retarget_formula(formula: &str, from: u32, to: u32) -> String {
    FORMULA_REF
        .replace_all(formula, |caps: &Captures<'_>| match cell_ref(formula, caps) {
            Some(cr) if cr.abs.is_empty() && cr.row == from => {
                format!("{}{}{}", cr.sep, cr.col, to)
            }
            _ => caps[0].to_string(),
        })
        .into_owned()
}

fn shift_formulas(row: &mut Element, shift: &Shift) {
    for c in row.elements_mut().filter(|c| c.is("c")) {
        if let Some(f) = c.child_mut("f") {
            let text = f.text();
            if !text.is_empty() {
                f.set_text(shift_formula(&text, shift));
            }
            if let Some(range) = f.attr("ref").map(|r| shift_formula(r, shift)) {
                f.set_attr("ref", range);
            }
        }
    }
}

/// Copy `template` to row `r`. Shared formulas are dropped (their cached
/// value stays); ordinary ones follow the row.
fn copy_row(template: &Element, from: u32, r: u32) -> Element {
    let mut row = template.clone();
    renumber(&mut row, r);
    for c in row.elements_mut().filter(|c| c.is("c")) {
        let shared = c.child("f").is_some_and(|f| f.attr("t") == Some("shared"));
        if shared {
            c.remove_children("f");
        } else if let Some(f) = c.child_mut("f") {
            let text = f.text();
            f.set_text(retarget_formula(&text, from, r));
        }
    }
    row
}

fn parse_range(range: &str) -> Option<((u32, u32), (u32, u32))> {
    let (a, b) = range.split_once(':').unwrap_or((range, range));
    Some((parse_ref(a)?, parse_ref(b)?))
}

/// Shift merged ranges. Single-row merges on the first replaced row are
/// repeated on every inserted row; other merges inside the block are dropped.
fn shift_merges(root: &mut Element, shift: &Shift) {
    let Some(merges) = root.child_mut("mergeCells") else {
        return;
    };
    let mut out = Vec::new();
    for m in merges.elements().filter(|e| e.is("mergeCell")) {
        let Some(((c1, r1), (c2, r2))) = m.attr("ref").and_then(parse_range) else {
            continue;
        };
        let mut push = |r1: u32, r2: u32| {
            let mut e = m.clone();
            e.set_attr("ref", format!("{}:{}", make_ref(c1, r1), make_ref(c2, r2)));
            out.push(e);
        };
        if r1 >= shift.end() {
            push(shift.row(r1), shift.row(r2));
        } else if r1 >= shift.anchor {
            if r1 == shift.anchor && r2 == r1 {
                for i in 0..shift.inserted {
                    push(shift.anchor + i, shift.anchor + i);
                }
            }
        } else if r2 >= shift.end() {
            push(r1, shift.row(r2));
        } else {
            push(r1, r2);
        }
    }

    if out.is_empty() {
        root.remove_children("mergeCells");
        return;
    }
    if let Some(merges) = root.child_mut("mergeCells") {
        merges.set_attr("count", out.len().to_string());
        merges.children = out.into_iter().map(Node::Element).collect();
    }
}

fn update_dimension(root: &mut Element) {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    if let Some(data) = root.child("sheetData") {
        for row in data.elements() {
            for c in row.elements().filter(|c| c.is("c")) {
                if let Some((col, r)) = c.attr("r").and_then(parse_ref) {
                    bounds = Some(match bounds {
                        None => (col, r, col, r),
                        Some((c0, r0, c1, r1)) => (c0.min(col), r0.min(r), c1.max(col), r1.max(r)),
                    });
                }
            }
        }
    }
    let reference = match bounds {
        Some((c0, r0, c1, r1)) if (c0, r0) == (c1, r1) => make_ref(c0, r0),
        Some((c0, r0, c1, r1)) => format!("{}:{}", make_ref(c0, r0), make_ref(c1, r1)),
        None => "A1".to_string(),
    };
    if let Some(dim) = root.child_mut("dimension") {
        dim.set_attr("ref", reference);
    }
}

// ── Placement plans ──────────────────────────────────────────────────────

struct Plan {
    anchor: u32,
    consumed: u32,
    new_rows: Vec<SheetRow>,
    /// Present in header mode; totals rows are filled by column.
    header: Option<HeaderColumns>,
}

struct HeaderColumns {
    matched: HeaderMatch,
    number_col: Option<u32>,
}

impl HeaderColumns {
    fn amount_col(&self) -> Option<u32> {
        self.matched
            .get(ColumnRole::Amount)
            .or_else(|| self.matched.get(ColumnRole::Price))
            .map(|c| c as u32)
    }
}

fn marker_plan(
    rows: &[SheetRow],
    pos: usize,
    items: &[Item],
    values: &TokenValues,
    format: &NumberFormat,
    shared: &[String],
) -> Plan {
    let template = &rows[pos];
    let new_rows = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let r = template.r + i as u32;
            let mut el = copy_row(&template.el, template.r, r);
            let row_values = values.with(&TokenValues::for_row(i + 1, item, format));
            substitute_row(&mut el, &row_values, shared);
            SheetRow { r, el }
        })
        .collect();
    Plan {
        anchor: template.r,
        consumed: 1,
        new_rows,
        header: None,
    }
}

fn header_plan(rows: &[SheetRow], items: &[Item], shared: &[String]) -> Option<Plan> {
    let (header_pos, matched, texts) = rows
        .iter()
        .take_while(|row| row.r <= HEADER_SCAN_ROWS)
        .enumerate()
        .find_map(|(pos, row)| {
            let texts = dense_texts(&row.el, shared);
            let m = match_header(&texts);
            let priced = m.get(ColumnRole::Price).is_some() || m.get(ColumnRole::Amount).is_some();
            (m.has_all(&[ColumnRole::Name, ColumnRole::Qty]) && priced).then_some((pos, m, texts))
        })?;
    let header_r = rows[header_pos].r;
    let anchor = header_r + 1;

    // Existing goods rows: contiguous, non-blank, not totals.
    let mut consumed = 0;
    let mut style: Option<&SheetRow> = None;
    for row in &rows[header_pos + 1..] {
        if row.r != anchor + consumed {
            break;
        }
        let label = dense_texts(&row.el, shared).into_iter().find(|t| !t.is_empty());
        if label.as_deref().and_then(classify_totals).is_some() {
            break;
        }
        if label.is_none() {
            // A blank first row still lends its styles.
            if consumed == 0 {
                style = Some(row);
                consumed = 1;
            }
            break;
        }
        style.get_or_insert(row);
        consumed += 1;
    }

    let mapped: Vec<usize> = matched.columns.values().copied().collect();
    let number_col = texts
        .iter()
        .position(|t| !t.is_empty())
        .filter(|first| !mapped.contains(first))
        .map(|c| c as u32);
    let header = HeaderColumns { matched, number_col };

    let base = match style {
        Some(row) => row.el.clone(),
        None => {
            let mut el = rows[header_pos].el.clone();
            for c in el.elements_mut().filter(|c| c.is("c")) {
                c.remove_attr("s");
            }
            el
        }
    };
    let new_rows = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let r = anchor + i as u32;
            let mut el = base.clone();
            renumber(&mut el, r);
            for c in el.elements_mut().filter(|c| c.is("c")) {
                clear_value(c);
            }
            fill_item_row(&mut el, &header, i + 1, item);
            SheetRow { r, el }
        })
        .collect();

    Some(Plan {
        anchor,
        consumed,
        new_rows,
        header: Some(header),
    })
}

fn fill_item_row(row: &mut Element, header: &HeaderColumns, number: usize, item: &Item) {
    if let Some(col) = header.number_col {
        if let Some(c) = cell_mut(row, col) {
            set_number(c, Decimal::from(number as u64));
        }
    }
    for (role, &col) in &header.matched.columns {
        let Some(c) = cell_mut(row, col as u32) else {
            continue;
        };
        match role {
            ColumnRole::Name => set_string(c, &item.name),
            ColumnRole::Unit => set_string(c, &item.unit),
            ColumnRole::Code => set_string(c, item.code.as_deref().unwrap_or_default()),
            ColumnRole::Qty => set_number(c, item.qty),
            ColumnRole::Price => set_number(c, item.price),
            ColumnRole::Amount => set_number(c, item.amount),
        }
    }
}

/// Put the totals into the rows labelled Итого / НДС below the goods.
fn fill_totals(
    rows: &mut [SheetRow],
    shift: &Shift,
    header: &HeaderColumns,
    values: &TokenValues,
    shared: &[String],
) {
    let Some(amount_col) = header.amount_col() else {
        return;
    };
    let below = shift.anchor + shift.inserted;
    for row in rows
        .iter_mut()
        .filter(|row| row.r >= below)
        .take(TOTALS_SCAN_ROWS)
    {
        if is_blank(&row.el, shared) {
            continue;
        }
        let label = cells(&row.el)
            .filter(|(col, _)| *col != amount_col)
            .map(|(_, c)| cell_text(c, shared))
            .find(|t| !t.trim().is_empty());
        let Some(kind) = label.as_deref().and_then(classify_totals) else {
            break;
        };
        let token = match kind {
            TotalsRow::Total => Token::Total,
            TotalsRow::Vat => Token::Vat,
            TotalsRow::WithoutVat => Token::TotalWithoutVat,
        };
        if let (Some(value), Some(c)) = (values.number(token), cell_mut(&mut row.el, amount_col)) {
            set_number(c, value);
        }
    }
}
