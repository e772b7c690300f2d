//! Spreadsheet price lists via `calamine` (xlsx, xlsm, xls, xlsb, ods).
//!
//! The selected sheet is copied into a grid indexed by absolute row and
//! column, then [`parse_grid`] finds the goods table in it. Keeping the grid
//! step separate lets the table logic be tested without files.

use crate::config::{ColumnLayout, ColumnMap, SheetSelector};
use crate::error::KpError;
use crate::header::{self, ColumnRole};
use crate::model::Item;
use crate::number::{decimal_from_f64, parse_decimal};
use crate::pricing::round_money;
use calamine::{open_workbook_auto, Data, Range, Reader};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info, warn};

/// Rows scanned for a header.
const HEADER_SCAN_ROWS: usize = 80;
/// Columns scanned for a header.
const HEADER_SCAN_COLS: usize = 50;

/// Items read from one sheet.
#[derive(Debug, Clone)]
pub struct SheetItems {
    pub sheet: String,
    /// Zero-based header row, `None` for a fixed layout.
    pub header_row: Option<usize>,
    pub items: Vec<Item>,
}

/// Read the goods table of a workbook.
pub fn read_spreadsheet(
    path: &Path,
    sheet: &SheetSelector,
    layout: &ColumnLayout,
) -> Result<SheetItems, KpError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| KpError::format(path, e.to_string()))?;
    let names = workbook.sheet_names().to_vec();
    if names.is_empty() {
        return Err(KpError::format(path, "workbook has no sheets"));
    }

    let sheet_name = match sheet {
        SheetSelector::First => names[0].clone(),
        SheetSelector::Named(name) => names
            .iter()
            .find(|n| n.as_str() == name)
            .cloned()
            .ok_or_else(|| {
                KpError::format(
                    path,
                    format!("sheet '{name}' not found (sheets: {})", names.join(", ")),
                )
            })?,
        SheetSelector::Index(i) => names.get(*i).cloned().ok_or_else(|| {
            KpError::format(
                path,
                format!("sheet #{} not found (workbook has {})", i + 1, names.len()),
            )
        })?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| KpError::format(path, format!("sheet '{sheet_name}': {e}")))?;
    let grid = to_grid(&range);
    debug!(
        "Sheet '{}': {} rows loaded from {}",
        sheet_name,
        grid.len(),
        path.display()
    );

    let (header_row, items) = parse_grid(&grid, layout).map_err(|detail| KpError::format(path, detail))?;
    info!("Extracted {} items from sheet '{}'", items.len(), sheet_name);
    Ok(SheetItems {
        sheet: sheet_name,
        header_row,
        items,
    })
}

/// Copy a calamine range into a grid addressed by absolute positions.
fn to_grid(range: &Range<Data>) -> Vec<Vec<Data>> {
    let (row0, col0) = range.start().unwrap_or((0, 0));
    let mut grid: Vec<Vec<Data>> = vec![Vec::new(); row0 as usize];
    for row in range.rows() {
        let mut cells = vec![Data::Empty; col0 as usize];
        cells.extend(row.iter().cloned());
        grid.push(cells);
    }
    grid
}

/// Text of a cell as a user would read it.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => decimal_from_f64(*f)
            .map(|d| d.normalize().to_string())
            .unwrap_or_else(|| f.to_string()),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Numeric value of a cell, parsing text such as `1 200,50 руб.`.
pub fn cell_number(cell: &Data) -> Option<Decimal> {
    match cell {
        Data::Int(i) => Some(Decimal::from(*i)),
        Data::Float(f) => decimal_from_f64(*f),
        Data::String(s) => parse_decimal(s),
        _ => None,
    }
}

fn get(row: &[Data], col: usize) -> &Data {
    row.get(col).unwrap_or(&Data::Empty)
}

fn is_blank(row: &[Data]) -> bool {
    row.iter().all(|c| cell_text(c).is_empty())
}

fn find_header(grid: &[Vec<Data>]) -> Option<(usize, ColumnMap)> {
    for (r, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let texts: Vec<String> = row.iter().take(HEADER_SCAN_COLS).map(cell_text).collect();
        let m = header::match_header(&texts);
        if m.has_all(&[ColumnRole::Name, ColumnRole::Qty, ColumnRole::Unit, ColumnRole::Price]) {
            let map = ColumnMap {
                first_data_row: r + 1,
                name: m.get(ColumnRole::Name)?,
                qty: m.get(ColumnRole::Qty)?,
                unit: m.get(ColumnRole::Unit),
                price: m.get(ColumnRole::Price)?,
                amount: m.get(ColumnRole::Amount),
                code: m.get(ColumnRole::Code),
            };
            return Some((r, map));
        }
    }
    None
}

/// Locate the goods table in `grid` and read its rows.
///
/// Returns the header row (for detected layouts) and the items in source
/// order. Errors are plain messages; the caller attaches the file path.
pub fn parse_grid(
    grid: &[Vec<Data>],
    layout: &ColumnLayout,
) -> Result<(Option<usize>, Vec<Item>), String> {
    let (header_row, map) = match layout {
        ColumnLayout::Detect => {
            let (r, map) = find_header(grid).ok_or_else(|| {
                "no goods-table header found in the first 80 rows \
                 (expected columns like Наименование, Кол-во, Ед., Цена)"
                    .to_string()
            })?;
            debug!("Header at row {}: {:?}", r + 1, map);
            (Some(r), map)
        }
        ColumnLayout::Fixed(map) => (None, map.clone()),
    };

    let mut items = Vec::new();
    let mut category: Option<String> = None;

    for (r, row) in grid.iter().enumerate().skip(map.first_data_row) {
        if is_blank(row) {
            continue;
        }
        let name = cell_text(get(row, map.name));
        let qty_cell = get(row, map.qty);
        let price_cell = get(row, map.price);
        // A row with a quantity and a price is an item whatever its name says.
        let priced = cell_number(qty_cell).is_some() && cell_number(price_cell).is_some();
        if !priced {
            let lead = row.iter().map(cell_text).find(|t| !t.is_empty()).unwrap_or_default();
            if header::classify_totals(&name).is_some() || header::classify_totals(&lead).is_some() {
                debug!("Totals row at {} ends the table", r + 1);
                break;
            }
        }
        if name.is_empty() {
            debug!("Row {} has no name, skipped", r + 1);
            continue;
        }

        let qty_text = cell_text(qty_cell);
        let price_text = cell_text(price_cell);
        if qty_text.is_empty() && price_text.is_empty() {
            debug!("Row {} is a section heading: {}", r + 1, name);
            category = Some(name);
            continue;
        }

        let qty = cell_number(qty_cell).ok_or_else(|| {
            format!("row {}: cannot read quantity '{qty_text}' of '{name}'", r + 1)
        })?;
        let price = cell_number(price_cell).ok_or_else(|| {
            format!("row {}: cannot read price '{price_text}' of '{name}'", r + 1)
        })?;

        let stated_amount = map.amount.and_then(|c| {
            let cell = get(row, c);
            if cell_text(cell).is_empty() {
                return None;
            }
            let parsed = cell_number(cell);
            if parsed.is_none() {
                warn!("Row {}: unreadable amount '{}', recomputed", r + 1, cell_text(cell));
            }
            parsed
        });

        let price = round_money(price);
        let amount = match stated_amount {
            Some(amount) => round_money(amount),
            None => qty
                .checked_mul(price)
                .map(round_money)
                .ok_or_else(|| format!("row {}: amount of '{name}' is out of range", r + 1))?,
        };

        let unit = map.unit.map(|c| cell_text(get(row, c))).unwrap_or_default();
        let code = map
            .code
            .map(|c| cell_text(get(row, c)))
            .filter(|s| !s.is_empty());

        items.push(Item {
            name,
            qty,
            unit,
            price,
            amount,
            code,
            category: category.clone(),
        });
    }

    if items.is_empty() {
        return Err("goods table found but it has no item rows".into());
    }
    Ok((header_row, items))
}
