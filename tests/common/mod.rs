//! Fixtures shared by the integration tests: price lists, templates and a
//! company file written into a temp directory.

#![allow(dead_code)]

use kp_generator::{CompanyDirectory, PricingConfig, ProposalRequest, ProposalVariant};
use rust_decimal::Decimal;
use rust_xlsxwriter::Workbook;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const COMPANIES_JSON: &str = r#"{
  "companies": [
    {"id": "alpha", "name": "ООО «Альфа»", "inn": "7701234567",
     "address": "Москва, ул. Ленина, 1", "phone": "+7 495 000-00-00",
     "ceo": "Иванов И. И.", "logo_path": "logos/alpha.png"},
    {"id": "beta", "name": "ИП Бета", "inn": "500100732259",
     "address": "Тверь", "phone": "+7 4822 00-00-00", "ceo": "Петров П. П."}
  ]
}"#;

pub fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// A temp workspace with `in/`, `out/` and a company file.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("in")).unwrap();
        std::fs::write(dir.path().join("companies.json"), COMPANIES_JSON).unwrap();
        Self { dir }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.path("out")
    }

    pub fn companies(&self) -> CompanyDirectory {
        CompanyDirectory::load(self.path("companies.json")).unwrap()
    }

    pub fn request(&self, input: &Path, template: Option<&Path>, variants: Vec<ProposalVariant>) -> ProposalRequest {
        ProposalRequest {
            input: input.to_path_buf(),
            template: template.map(Path::to_path_buf),
            output_dir: self.out_dir(),
            variants,
        }
    }

    /// Files in the output directory, sorted; empty when it does not exist.
    pub fn outputs(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.out_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn variant(company: &str, pricing: PricingConfig) -> ProposalVariant {
    ProposalVariant::new(company, pricing)
}

// ── Price lists ──────────────────────────────────────────────────────────

/// `(name, qty, unit, price)` rows under a title and a header row.
pub fn write_price_list(path: &Path, rows: &[(&str, f64, &str, f64)]) {
    let mut wb = Workbook::new();
    let sheet = wb.add_worksheet();
    sheet.write_string(0, 0, "Прайс-лист ООО Поставщик").unwrap();
    for (col, title) in ["№", "Наименование", "Кол-во", "Ед. изм.", "Цена, руб."].iter().enumerate() {
        sheet.write_string(2, col as u16, *title).unwrap();
    }
    for (i, (name, qty, unit, price)) in rows.iter().enumerate() {
        let r = 3 + i as u32;
        sheet.write_number(r, 0, (i + 1) as f64).unwrap();
        sheet.write_string(r, 1, *name).unwrap();
        sheet.write_number(r, 2, *qty).unwrap();
        sheet.write_string(r, 3, *unit).unwrap();
        sheet.write_number(r, 4, *price).unwrap();
    }
    wb.save(path).unwrap();
}

pub fn bolt_and_nut(fx: &Fixture) -> PathBuf {
    let path = fx.path("in/price.xlsx");
    write_price_list(&path, &[("Болт М8", 10.0, "шт", 5.0), ("Гайка М8", 100.0, "шт", 1.5)]);
    path
}

// ── Templates ────────────────────────────────────────────────────────────

/// XLSX template with document tokens on top, a goods header and an Итого row.
pub fn write_xlsx_template(path: &Path) {
    let mut wb = Workbook::new();
    let sheet = wb.add_worksheet();
    sheet.set_name("КП").unwrap();
    sheet.write_string(0, 0, "{{COMPANY_NAME}}").unwrap();
    sheet.write_string(1, 0, "ИНН {{INN}}, {{DATE}}").unwrap();
    for (col, title) in ["№", "Наименование", "Кол-во", "Ед. изм.", "Цена", "Сумма"].iter().enumerate() {
        sheet.write_string(3, col as u16, *title).unwrap();
    }
    sheet.write_string(4, 4, "Итого:").unwrap();
    sheet.write_string(7, 1, "Директор {{CEO}}").unwrap();
    wb.save(path).unwrap();
}

fn docx_paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
}

pub fn docx_row(cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|c| format!("<w:tc>{}</w:tc>", docx_paragraph(c)))
        .collect();
    format!("<w:tr>{cells}</w:tr>")
}

/// Minimal WordprocessingML package whose body holds `paragraphs` and then
/// one table of `rows`.
pub fn write_docx(path: &Path, paragraphs: &[&str], rows: &[String]) {
    let mut body: String = paragraphs.iter().map(|p| docx_paragraph(p)).collect();
    if !rows.is_empty() {
        body.push_str("<w:tbl>");
        body.extend(rows.iter().cloned());
        body.push_str("</w:tbl>");
    }
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    );
    let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;
    let rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in [
        ("[Content_Types].xml", content_types.to_string()),
        ("_rels/.rels", rels.to_string()),
        ("word/document.xml", document),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// DOCX template with a repeating item row.
pub fn write_docx_marker_template(path: &Path) {
    write_docx(
        path,
        &["Коммерческое предложение {{COMPANY_NAME}}", "Дата: {{DATE}}"],
        &[
            docx_row(&["№", "Наименование", "Кол-во", "Ед.", "Цена", "Сумма"]),
            docx_row(&["{{ITEM_NO}}", "{{ITEM_NAME}}", "{{ITEM_QTY}}", "{{ITEM_UNIT}}", "{{ITEM_PRICE}}", "{{ITEM_AMOUNT}}"]),
            docx_row(&["", "Итого", "", "", "", "{{TOTAL}}"]),
        ],
    );
}

// ── Read-back ────────────────────────────────────────────────────────────

/// Typed cell values of the first sheet of an XLSX file.
pub fn read_xlsx(path: &Path) -> calamine::Range<calamine::Data> {
    use calamine::Reader;
    let mut wb: calamine::Xlsx<_> = calamine::open_workbook(path).unwrap();
    let first = wb.sheet_names()[0].clone();
    wb.worksheet_range(&first).unwrap()
}

/// Formulas of the first sheet, without the leading `=`.
pub fn read_formulas(path: &Path) -> calamine::Range<String> {
    use calamine::Reader;
    let mut wb: calamine::Xlsx<_> = calamine::open_workbook(path).unwrap();
    let first = wb.sheet_names()[0].clone();
    wb.worksheet_formula(&first).unwrap()
}

/// A config that never finds a real OCR engine.
pub fn no_ocr_config() -> kp_generator::GeneratorConfig {
    kp_generator::GeneratorConfig::builder()
        .tesseract_path("/nonexistent/kp-tests/tesseract")
        .search_path("")
        .build()
        .unwrap()
}
