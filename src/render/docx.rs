//! Fill a Word (DOCX) template.
//!
//! Two ways to find where the goods go:
//!
//! * **Marker row**: the first table row that contains an `ITEM_*` token is
//!   cloned once per item and removed.
//! * **Header row**: without markers, the first table whose first five rows
//!   hold a goods header (Наименование / Кол-во / Цена). The row below the
//!   header is the style sample; old goods rows down to the first totals row
//!   are replaced, and the totals rows receive the computed sums.
//!
//! Document tokens are substituted in every paragraph, including headers and
//! footers. Word splits text into runs at arbitrary points, so a paragraph
//! whose placeholders straddle runs has its text merged into the first run
//! before anything is matched.

use crate::error::{KpError, TemplateIssue};
use crate::header::{classify_totals, match_header, ColumnRole, HeaderMatch, TotalsRow};
use crate::model::Item;
use crate::number::NumberFormat;
use crate::render::ooxml::{Element, Node, Package, XmlDocument};
use crate::tokens::{self, Token, TokenValues};
use std::path::Path;
use tracing::debug;

const DOCUMENT_PART: &str = "word/document.xml";

/// Header rows are looked for among the first rows of each table.
const HEADER_SCAN_ROWS: usize = 5;

/// Render `items` into the DOCX `package` loaded from `template`.
pub fn render_docx(
    template: &Path,
    package: &Package,
    items: &[Item],
    values: &TokenValues,
    format: &NumberFormat,
) -> Result<Vec<u8>, KpError> {
    let malformed = |e: String| KpError::template(template, TemplateIssue::Malformed(e));

    let mut package = package.clone();
    let mut document = package
        .xml(DOCUMENT_PART)
        .map_err(malformed)?
        .ok_or_else(|| {
            KpError::template(template, TemplateIssue::MissingPart(DOCUMENT_PART.into()))
        })?;
    let root = &mut document.root;
    merge_split_runs(root);

    match find_path(root, &|e| e.is("tr") && tokens::has_row_token(&e.text())) {
        Some(row_path) => {
            validate_marker_mode(template, root, &row_path)?;
            expand_marker_row(root, &row_path, items, values, format);
        }
        None => {
            validate_paragraphs(template, root, false)?;
            let (tbl_path, header_pos, header) = find_header_table(root)
                .ok_or_else(|| KpError::template(template, TemplateIssue::MissingRowMarker))?;
            fill_header_table(root, &tbl_path, header_pos, &header, items, values, format);
        }
    }
    substitute_texts(root, values);
    package.set_xml(DOCUMENT_PART, &document).map_err(malformed)?;

    // Headers and footers only take document tokens.
    let side_parts: Vec<String> = package
        .part_names()
        .filter(|n| is_header_or_footer(n))
        .map(str::to_string)
        .collect();
    for name in side_parts {
        let Some(mut part) = package.xml(&name).map_err(malformed)? else {
            continue;
        };
        merge_split_runs(&mut part.root);
        validate_paragraphs(template, &part.root, false)?;
        substitute_texts(&mut part.root, values);
        package.set_xml(&name, &part).map_err(malformed)?;
    }

    package.to_bytes().map_err(malformed)
}

fn is_header_or_footer(name: &str) -> bool {
    (name.starts_with("word/header") || name.starts_with("word/footer")) && name.ends_with(".xml")
}

// ── Runs ─────────────────────────────────────────────────────────────────

/// Merge the run texts of every paragraph whose placeholders are split
/// across runs into its first text run.
fn merge_split_runs(root: &mut Element) {
    root.walk_mut(&mut |e| {
        if e.is("p") {
            merge_paragraph(e);
        }
    });
}

fn merge_paragraph(p: &mut Element) {
    let run_texts: Vec<String> = p.elements().filter(|e| e.is("r")).map(run_text).collect();
    let joined: String = run_texts.concat();
    if !joined.contains("{{") {
        return;
    }
    let whole = tokens::count_placeholders(&joined);
    let per_run: usize = run_texts.iter().map(|t| tokens::count_placeholders(t)).sum();
    if whole == per_run {
        return;
    }
    debug!("Merging {} runs to rebuild split placeholders", run_texts.len());

    let mut first = true;
    for run in p.elements_mut().filter(|e| e.is("r")) {
        if run.child("t").is_none() {
            continue;
        }
        if first {
            let mut kept = false;
            run.children.retain(|n| match n {
                Node::Element(e) if e.is("t") => !std::mem::replace(&mut kept, true),
                _ => true,
            });
            if let Some(t) = run.child_mut("t") {
                t.set_attr("xml:space", "preserve");
                t.set_text(joined.clone());
            }
            first = false;
        } else {
            run.remove_children("t");
        }
    }
}

fn run_text(run: &Element) -> String {
    run.elements().filter(|e| e.is("t")).map(Element::text).collect()
}

/// Substitute tokens in every `w:t`.
fn substitute_texts(root: &mut Element, values: &TokenValues) {
    root.walk_mut(&mut |e| {
        if e.is("t") {
            let text = e.text();
            if text.contains("{{") {
                e.set_text(tokens::substitute(&text, values));
                e.set_attr("xml:space", "preserve");
            }
        }
    });
}

// ── Validation ───────────────────────────────────────────────────────────

fn validate_paragraphs(template: &Path, root: &Element, in_row: bool) -> Result<(), KpError> {
    for p in root.descendants("p") {
        tokens::validate(&p.text(), in_row).map_err(|issue| KpError::template(template, issue))?;
    }
    Ok(())
}

fn validate_marker_mode(template: &Path, root: &Element, row_path: &[usize]) -> Result<(), KpError> {
    let Some(row) = root.at_path(row_path) else {
        return Err(KpError::Internal("marker row vanished".into()));
    };
    validate_paragraphs(template, row, true)?;

    let mut rest = root.clone();
    let (row_idx, tbl_path) = split_last(row_path);
    if let Some(tbl) = rest.at_path_mut(tbl_path) {
        tbl.children.remove(row_idx);
    }
    validate_paragraphs(template, &rest, false)
}

// ── Marker mode ──────────────────────────────────────────────────────────

fn expand_marker_row(
    root: &mut Element,
    row_path: &[usize],
    items: &[Item],
    values: &TokenValues,
    format: &NumberFormat,
) {
    let (row_idx, tbl_path) = split_last(row_path);
    let Some(tbl) = root.at_path_mut(tbl_path) else {
        return;
    };
    let Node::Element(template_row) = tbl.children.remove(row_idx) else {
        return;
    };
    for (i, item) in items.iter().enumerate().rev() {
        let row_values = values.with(&TokenValues::for_row(i + 1, item, format));
        let mut row = template_row.clone();
        substitute_texts(&mut row, &row_values);
        tbl.children.insert(row_idx, Node::Element(row));
    }
    debug!("Marker row expanded to {} rows", items.len());
}

// ── Header mode ──────────────────────────────────────────────────────────

fn cell_texts(row: &Element) -> Vec<String> {
    row.elements()
        .filter(|e| e.is("tc"))
        .map(|tc| tc.text().trim().to_string())
        .collect()
}

/// Table path, position of the header among the table rows, and the
/// column mapping.
fn find_header_table(root: &Element) -> Option<(Vec<usize>, usize, HeaderMatch)> {
    for path in find_all_paths(root, &|e| e.is("tbl")) {
        let tbl = root.at_path(&path)?;
        let rows = tbl.elements().filter(|e| e.is("tr")).take(HEADER_SCAN_ROWS);
        for (pos, row) in rows.enumerate() {
            let header = match_header(&cell_texts(row));
            let priced = header.get(ColumnRole::Price).is_some()
                || header.get(ColumnRole::Amount).is_some();
            if header.has_all(&[ColumnRole::Name, ColumnRole::Qty]) && priced {
                return Some((path, pos, header));
            }
        }
    }
    None
}

fn totals_label(row: &Element) -> Option<TotalsRow> {
    cell_texts(row)
        .iter()
        .find(|t| !t.is_empty())
        .and_then(|t| classify_totals(t))
}

fn fill_header_table(
    root: &mut Element,
    tbl_path: &[usize],
    header_pos: usize,
    header: &HeaderMatch,
    items: &[Item],
    values: &TokenValues,
    format: &NumberFormat,
) {
    let Some(tbl) = root.at_path_mut(tbl_path) else {
        return;
    };

    // Child indices of the table rows.
    let rows: Vec<usize> = tbl
        .children
        .iter()
        .enumerate()
        .filter(|(_, n)| matches!(n, Node::Element(e) if e.is("tr")))
        .map(|(i, _)| i)
        .collect();
    let row_at = |tbl: &Element, pos: usize| tbl.at_path(&[rows[pos]]).cloned();

    let Some(header_row) = row_at(tbl, header_pos) else {
        return;
    };

    let mut end = header_pos + 1;
    while end < rows.len() {
        match row_at(tbl, end) {
            Some(row) if totals_label(&row).is_none() => end += 1,
            _ => break,
        }
    }

    let sample = if header_pos + 1 < end {
        row_at(tbl, header_pos + 1).unwrap_or_else(|| header_row.clone())
    } else {
        header_row.clone()
    };

    let number_col = (!header.columns.values().any(|&c| c == 0)).then_some(0);

    // Replace old goods rows with one row per item.
    for pos in (header_pos + 1..end).rev() {
        tbl.children.remove(rows[pos]);
    }
    let insert_at = rows[header_pos] + 1;
    for (i, item) in items.iter().enumerate().rev() {
        let mut row = sample.clone();
        for (col, tc) in row.elements_mut().filter(|e| e.is("tc")).enumerate() {
            let text = if Some(col) == number_col {
                (i + 1).to_string()
            } else {
                column_value(header, col, item, format)
            };
            set_cell_text(tc, &text);
        }
        tbl.children.insert(insert_at, Node::Element(row));
    }

    // Totals rows directly below the goods.
    let amount_col = header
        .get(ColumnRole::Amount)
        .or_else(|| header.get(ColumnRole::Price));
    let mut idx = insert_at;
    let mut seen_items = 0;
    while idx < tbl.children.len() {
        let Node::Element(row) = &mut tbl.children[idx] else {
            idx += 1;
            continue;
        };
        if !row.is("tr") {
            idx += 1;
            continue;
        }
        if seen_items < items.len() {
            seen_items += 1;
            idx += 1;
            continue;
        }
        let Some(kind) = totals_label(row) else {
            break;
        };
        let token = match kind {
            TotalsRow::Total => Token::Total,
            TotalsRow::Vat => Token::Vat,
            TotalsRow::WithoutVat => Token::TotalWithoutVat,
        };
        let value = values.text(token).unwrap_or_default().to_string();
        let cells = row.elements().filter(|e| e.is("tc")).count();
        let label_col = cell_texts(row).iter().position(|t| !t.is_empty());
        let target = match amount_col {
            Some(c) if c < cells && Some(c) != label_col => c,
            _ => cells.saturating_sub(1),
        };
        if Some(target) != label_col {
            if let Some(tc) = row.elements_mut().filter(|e| e.is("tc")).nth(target) {
                set_cell_text(tc, &value);
            }
        }
        idx += 1;
    }
}

fn column_value(header: &HeaderMatch, col: usize, item: &Item, format: &NumberFormat) -> String {
    let role = header
        .columns
        .iter()
        .find(|(_, &c)| c == col)
        .map(|(role, _)| *role);
    match role {
        Some(ColumnRole::Name) => item.name.clone(),
        Some(ColumnRole::Qty) => format.qty(item.qty),
        Some(ColumnRole::Unit) => item.unit.clone(),
        Some(ColumnRole::Price) => format.money(item.price),
        Some(ColumnRole::Amount) => format.money(item.amount),
        Some(ColumnRole::Code) => item.code.clone().unwrap_or_default(),
        None => String::new(),
    }
}

/// Replace the content of a table cell with one run of `text`, keeping the
/// first paragraph's properties and the first run's formatting.
fn set_cell_text(tc: &mut Element, text: &str) {
    let mut p = tc
        .child("p")
        .cloned()
        .unwrap_or_else(|| Element::new(tc.qualified("p")));
    let run_props = p
        .child("r")
        .and_then(|r| r.child("rPr"))
        .cloned();
    p.children
        .retain(|n| !matches!(n, Node::Element(e) if e.is("r") || e.is("hyperlink")));
    if !text.is_empty() {
        let mut r = Element::new(p.qualified("r"));
        if let Some(props) = run_props {
            r.push(props);
        }
        let mut t = Element::new(p.qualified("t"));
        t.set_attr("xml:space", "preserve");
        t.set_text(text);
        r.push(t);
        p.push(r);
    }
    tc.remove_children("p");
    tc.push(p);
}

// ── Tree paths ───────────────────────────────────────────────────────────

fn split_last(path: &[usize]) -> (usize, &[usize]) {
    match path.split_last() {
        Some((last, rest)) => (*last, rest),
        None => (0, path),
    }
}

fn find_path(root: &Element, pred: &dyn Fn(&Element) -> bool) -> Option<Vec<usize>> {
    find_all_paths(root, pred).into_iter().next()
}

/// Paths to every element matching `pred`, in document order. Matches are
/// not searched further down.
fn find_all_paths(root: &Element, pred: &dyn Fn(&Element) -> bool) -> Vec<Vec<usize>> {
    fn go(e: &Element, pred: &dyn Fn(&Element) -> bool, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        for (i, node) in e.children.iter().enumerate() {
            if let Node::Element(child) = node {
                path.push(i);
                if pred(child) {
                    out.push(path.clone());
                } else {
                    go(child, pred, path, out);
                }
                path.pop();
            }
        }
    }
    let mut out = Vec::new();
    go(root, pred, &mut Vec::new(), &mut out);
    out
}

// ── Reading back ─────────────────────────────────────────────────────────

/// Cell texts of every table in a DOCX, in document order.
pub fn read_tables(bytes: &[u8]) -> Result<Vec<Vec<Vec<String>>>, String> {
    let doc = document_of(bytes)?;
    Ok(doc
        .root
        .descendants("tbl")
        .into_iter()
        .map(|tbl| {
            tbl.elements()
                .filter(|e| e.is("tr"))
                .map(|row| {
                    row.elements()
                        .filter(|e| e.is("tc"))
                        .map(|tc| {
                            tc.descendants("p")
                                .iter()
                                .map(|p| p.text())
                                .collect::<Vec<_>>()
                                .join("\n")
                        })
                        .collect()
                })
                .collect()
        })
        .collect())
}

/// Paragraph texts of the document body, one per line.
pub fn read_text(bytes: &[u8]) -> Result<String, String> {
    let doc = document_of(bytes)?;
    Ok(doc
        .root
        .descendants("p")
        .iter()
        .map(|p| p.text())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn document_of(bytes: &[u8]) -> Result<XmlDocument, String> {
    Package::from_bytes(bytes)?
        .xml(DOCUMENT_PART)?
        .ok_or_else(|| format!("{DOCUMENT_PART} is missing"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompanyProfile, Totals};
    use rust_decimal::Decimal;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn docx(body: &str) -> Package {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        );
        let mut pkg = Package::default();
        pkg.set_part("word/document.xml", xml.into_bytes());
        pkg
    }

    fn p(text: &str) -> String {
        format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
    }

    fn row(cells: &[&str]) -> String {
        let cells: String = cells.iter().map(|c| format!("<w:tc>{}</w:tc>", p(c))).collect();
        format!("<w:tr>{cells}</w:tr>")
    }

    fn items() -> Vec<Item> {
        vec![
            Item::new("Болт М8", d("10"), "шт", d("6.00")),
            Item::new("Гайка М8", d("100"), "шт", d("1.50")),
        ]
    }

    fn values(items: &[Item]) -> TokenValues {
        let company = CompanyProfile {
            id: "alpha".into(),
            name: "ООО Альфа".into(),
            inn: "7701234567".into(),
            address: "Москва".into(),
            phone: "+7".into(),
            ceo: "Иванов".into(),
            logo_path: None,
        };
        let totals = Totals::compute(items, d("20"));
        TokenValues::for_document(&company, &totals, items.len(), "14.10.2026", &NumberFormat::default())
    }

    fn render(pkg: &Package) -> Result<Vec<u8>, KpError> {
        let items = items();
        render_docx(Path::new("t.docx"), pkg, &items, &values(&items), &NumberFormat::default())
    }

    #[test]
    fn marker_row_is_cloned_per_item() {
        let body = format!(
            "{}<w:tbl>{}{}{}</w:tbl>",
            p("{{COMPANY_NAME}}, ИНН {{INN}}"),
            row(&["№", "Товар", "Кол-во", "Цена", "Сумма"]),
            row(&["{{ITEM_NO}}", "{{ITEM_NAME}}", "{{ITEM_QTY}} {{ITEM_UNIT}}", "{{ITEM_PRICE}}", "{{ITEM_AMOUNT}}"]),
            row(&["", "Итого", "", "", "{{TOTAL}}"]),
        );
        let out = render(&docx(&body)).unwrap();
        let tables = read_tables(&out).unwrap();
        assert_eq!(tables[0].len(), 4);
        assert_eq!(tables[0][1], vec!["1", "Болт М8", "10 шт", "6,00", "60,00"]);
        assert_eq!(tables[0][2], vec!["2", "Гайка М8", "100 шт", "1,50", "150,00"]);
        assert_eq!(tables[0][3][4], "210,00");
        assert!(read_text(&out).unwrap().contains("ООО Альфа, ИНН 7701234567"));
    }

    #[test]
    fn placeholders_split_across_runs_are_merged() {
        let body = format!(
            "<w:p><w:r><w:t>Дата: {{{{DA</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>TE}}}}</w:t></w:r></w:p><w:tbl>{}</w:tbl>",
            row(&["{{ITEM_NAME}}"])
        );
        let out = render(&docx(&body)).unwrap();
        assert!(read_text(&out).unwrap().contains("Дата: 14.10.2026"));
    }

    #[test]
    fn header_mode_replaces_old_rows_and_fills_totals() {
        let body = format!(
            "<w:tbl>{}{}{}{}{}{}</w:tbl>",
            row(&["№", "Наименование", "Кол-во", "Ед.", "Цена", "Сумма"]),
            row(&["1", "Старый товар", "1", "шт", "9,00", "9,00"]),
            row(&["2", "Ещё старый", "2", "шт", "1,00", "2,00"]),
            row(&["", "Итого:", "", "", "", ""]),
            row(&["", "В т.ч. НДС 20%", "", "", "", ""]),
            row(&["", "Итого без НДС", "", "", "", ""]),
        );
        let out = render(&docx(&body)).unwrap();
        let t = &read_tables(&out).unwrap()[0];
        assert_eq!(t.len(), 6);
        assert_eq!(t[1], vec!["1", "Болт М8", "10", "шт", "6,00", "60,00"]);
        assert_eq!(t[2], vec!["2", "Гайка М8", "100", "шт", "1,50", "150,00"]);
        assert_eq!(t[3][5], "210,00");
        assert_eq!(t[4][5], "35,00");
        assert_eq!(t[5][5], "175,00");
    }

    #[test]
    fn missing_marker_and_header_is_template_error() {
        let body = format!("{}<w:tbl>{}</w:tbl>", p("Hello"), row(&["a", "b"]));
        let err = render(&docx(&body)).unwrap_err();
        assert!(
            matches!(err, KpError::Template { issue: TemplateIssue::MissingRowMarker, .. }),
            "got: {err}"
        );
    }

    #[test]
    fn unknown_and_misplaced_tokens_are_rejected() {
        let body = format!("{}<w:tbl>{}</w:tbl>", p("{{BOSS}}"), row(&["{{ITEM_NAME}}"]));
        assert!(matches!(
            render(&docx(&body)).unwrap_err(),
            KpError::Template { issue: TemplateIssue::UnknownToken(_), .. }
        ));

        let body = format!("{}<w:tbl>{}</w:tbl>", p("{{ITEM_PRICE}}"), row(&["{{ITEM_NAME}}"]));
        assert!(matches!(
            render(&docx(&body)).unwrap_err(),
            KpError::Template { issue: TemplateIssue::ItemTokenOutsideRow(_), .. }
        ));
    }

    #[test]
    fn missing_document_part() {
        let err = render(&Package::default()).unwrap_err();
        assert!(matches!(err, KpError::Template { issue: TemplateIssue::MissingPart(_), .. }));
    }

    #[test]
    fn footer_tokens_are_substituted() {
        let mut pkg = docx(&format!("<w:tbl>{}</w:tbl>", row(&["{{ITEM_NAME}}"])));
        pkg.set_part(
            "word/footer1.xml",
            format!(
                r#"<w:ftr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">{}</w:ftr>"#,
                p("{{CEO}}")
            )
            .into_bytes(),
        );
        let out = render(&pkg).unwrap();
        let footer = Package::from_bytes(&out)
            .unwrap()
            .xml("word/footer1.xml")
            .unwrap()
            .unwrap();
        assert_eq!(footer.root.text(), "Иванов");
    }
}
