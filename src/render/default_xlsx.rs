//! Built-in proposal workbook, used when no template is given.
//!
//! ```text
//!  КОММЕРЧЕСКОЕ ПРЕДЛОЖЕНИЕ                                 [logo]
//!  ООО «Альфа»
//!  ИНН 7701234567
//!  Адрес / Телефон / Дата
//!
//!  № | Наименование | [Артикул] | Кол-во | Ед. изм. | Цена | Сумма
//!  ...
//!                                          Итого: | 12 345,00
//!                                   В т.ч. НДС 20%: |  2 057,50
//!                                    Итого без НДС: | 10 287,50
//!
//!  Генеральный директор ____________ Иванов И.И.
//! ```

use crate::error::KpError;
use crate::model::{CompanyProfile, Item, Totals};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Image, Workbook, Worksheet, XlsxError};
use tracing::warn;

pub const SHEET_NAME: &str = "КП";

const HEADER_ROW: u32 = 7;

/// Everything the default layout prints.
pub struct DefaultLayout<'a> {
    pub company: &'a CompanyProfile,
    pub items: &'a [Item],
    pub totals: &'a Totals,
    pub vat_rate: Decimal,
    pub date: &'a str,
}

/// Render the default proposal workbook into memory.
pub fn render_default_xlsx(layout: &DefaultLayout<'_>) -> Result<Vec<u8>, KpError> {
    build(layout).map_err(|e| KpError::Internal(format!("default workbook: {e}")))
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

fn build(layout: &DefaultLayout<'_>) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let title = Format::new().set_bold().set_font_size(16);
    let bold = Format::new().set_bold();
    let header = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center)
        .set_text_wrap();
    let text = Format::new().set_border(FormatBorder::Thin).set_text_wrap();
    let qty = Format::new().set_border(FormatBorder::Thin).set_num_format("0.###");
    let money = Format::new().set_border(FormatBorder::Thin).set_num_format("#,##0.00");
    let total_label = Format::new().set_bold().set_align(FormatAlign::Right);
    let total_money = Format::new().set_bold().set_num_format("#,##0.00");

    let company = layout.company;
    sheet.write_string_with_format(0, 0, "КОММЕРЧЕСКОЕ ПРЕДЛОЖЕНИЕ", &title)?;
    sheet.write_string_with_format(1, 0, &company.name, &bold)?;
    sheet.write_string(2, 0, &format!("ИНН {}", company.inn))?;
    sheet.write_string(3, 0, &format!("Адрес: {}", company.address))?;
    sheet.write_string(4, 0, &format!("Телефон: {}", company.phone))?;
    sheet.write_string(5, 0, &format!("Дата: {}", layout.date))?;

    let with_code = layout.items.iter().any(|i| i.code.is_some());
    let mut columns: Vec<(&str, f64)> = vec![("№", 5.0), ("Наименование", 45.0)];
    if with_code {
        columns.push(("Артикул", 14.0));
    }
    columns.extend([("Кол-во", 9.0), ("Ед. изм.", 9.0), ("Цена", 13.0), ("Сумма", 15.0)]);
    for (col, (name, width)) in columns.iter().enumerate() {
        let col = col as u16;
        sheet.set_column_width(col, *width)?;
        sheet.write_string_with_format(HEADER_ROW, col, *name, &header)?;
    }
    let offset: u16 = if with_code { 1 } else { 0 };
    let (qty_col, unit_col, price_col, amount_col) = (2 + offset, 3 + offset, 4 + offset, 5 + offset);

    if let Some(logo) = company.logo_path.as_deref() {
        if logo.is_file() {
            match Image::new(logo) {
                Ok(image) => {
                    sheet.insert_image(0, amount_col, &image)?;
                }
                Err(e) => warn!("Logo '{}' skipped: {}", logo.display(), e),
            }
        } else {
            warn!("Logo '{}' does not exist; skipped", logo.display());
        }
    }

    let mut row = HEADER_ROW + 1;
    let mut category: Option<&str> = None;
    for (n, item) in layout.items.iter().enumerate() {
        if item.category.as_deref() != category {
            category = item.category.as_deref();
            if let Some(heading) = category {
                sheet.write_string_with_format(row, 1, heading, &bold)?;
                row += 1;
            }
        }
        sheet.write_number_with_format(row, 0, (n + 1) as f64, &text)?;
        sheet.write_string_with_format(row, 1, &item.name, &text)?;
        if with_code {
            sheet.write_string_with_format(row, 2, item.code.as_deref().unwrap_or_default(), &text)?;
        }
        sheet.write_number_with_format(row, qty_col, to_f64(item.qty), &qty)?;
        sheet.write_string_with_format(row, unit_col, &item.unit, &text)?;
        sheet.write_number_with_format(row, price_col, to_f64(item.price), &money)?;
        sheet.write_number_with_format(row, amount_col, to_f64(item.amount), &money)?;
        row += 1;
    }

    let totals = layout.totals;
    let rate = layout.vat_rate.normalize();
    let rows: [(String, Decimal); 3] = [
        ("Итого:".to_string(), totals.total),
        (format!("В т.ч. НДС {rate}%:"), totals.vat),
        ("Итого без НДС:".to_string(), totals.total_without_vat),
    ];
    for (label, value) in rows.iter() {
        sheet.write_string_with_format(row, price_col, label, &total_label)?;
        sheet.write_number_with_format(row, amount_col, to_f64(*value), &total_money)?;
        row += 1;
    }

    signature(sheet, row + 1, company)?;
    workbook.save_to_buffer()
}

fn signature(sheet: &mut Worksheet, row: u32, company: &CompanyProfile) -> Result<(), XlsxError> {
    sheet.write_string(row, 1, &format!("Генеральный директор ____________ {}", company.ceo))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Reader, Xlsx};
    use std::io::Cursor;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn company() -> CompanyProfile {
        CompanyProfile {
            id: "alpha".into(),
            name: "ООО «Альфа»".into(),
            inn: "7701234567".into(),
            address: "Москва".into(),
            phone: "+7 495 000-00-00".into(),
            ceo: "Иванов И.И.".into(),
            logo_path: Some("/nonexistent/logo.png".into()),
        }
    }

    #[test]
    fn default_workbook_has_items_and_totals() {
        let items = vec![
            Item::new("Болт М8", d("10"), "шт", d("6.00")),
            Item::new("Гайка М8", d("100"), "шт", d("1.50")),
        ];
        let totals = Totals::compute(&items, d("20"));
        let company = company();
        let bytes = render_default_xlsx(&DefaultLayout {
            company: &company,
            items: &items,
            totals: &totals,
            vat_rate: d("20"),
            date: "14.10.2026",
        })
        .unwrap();

        let mut wb: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
        assert_eq!(wb.sheet_names(), vec![SHEET_NAME.to_string()]);
        let range = wb.worksheet_range(SHEET_NAME).unwrap();
        assert_eq!(
            range.get_value((1, 0)),
            Some(&Data::String("ООО «Альфа»".into()))
        );
        assert_eq!(range.get_value((8, 1)), Some(&Data::String("Болт М8".into())));
        assert_eq!(range.get_value((8, 5)), Some(&Data::Float(60.0)));
        assert_eq!(range.get_value((10, 5)), Some(&Data::Float(210.0)));
        assert_eq!(range.get_value((11, 5)), Some(&Data::Float(35.0)));
    }
}
