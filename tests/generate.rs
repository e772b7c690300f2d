//! End-to-end generation runs over spreadsheet inputs.

mod common;

use calamine::Data;
use common::*;
use kp_generator::number::parse_decimal;
use kp_generator::render::docx::{read_tables, read_text};
use kp_generator::{
    generate, generate_sync, inspect, ErrorCategory, ExtractionSource, GeneratorConfig, KpError,
    PricingConfig, RoundingPolicy, TemplateIssue,
};
use std::sync::Arc;

fn markup(percent: &str, rounding: RoundingPolicy) -> PricingConfig {
    PricingConfig::new(d(percent), rounding)
}

// ── Default layout ───────────────────────────────────────────────────────

#[test]
fn bolt_with_markup_and_rounding_to_tens() {
    let fx = Fixture::new();
    let input = fx.path("in/bolt.xlsx");
    write_price_list(&input, &[("Bolt", 10.0, "pcs", 5.0)]);

    let pricing = markup("20", RoundingPolicy::NearestStep(d("10")));
    let request = fx.request(&input, None, vec![variant("alpha", pricing)]);
    let report = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap();

    assert_eq!(report.documents.len(), 1);
    let doc = &report.documents[0];
    assert_eq!(doc.item_count, 1);
    assert_eq!(doc.total, d("100.00"));
    assert_eq!(report.items[0].price, d("5.00"), "report keeps source prices");

    let range = read_xlsx(&doc.path);
    assert_eq!(range.get_value((8, 1)), Some(&Data::String("Bolt".into())));
    assert_eq!(range.get_value((8, 4)), Some(&Data::Float(10.0)));
    assert_eq!(range.get_value((8, 5)), Some(&Data::Float(100.0)));
}

#[test]
fn default_output_is_auto_named_and_re_extractable() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let request = fx.request(&input, None, vec![variant("alpha", PricingConfig::default())]);
    let report = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap();

    let outputs = fx.outputs();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].starts_with("КП_ООО_Альфа_"), "{}", outputs[0]);
    assert!(outputs[0].ends_with("_v1.xlsx"), "{}", outputs[0]);

    // Zero markup without rounding leaves prices untouched, and the
    // generated workbook reads back as the same goods table.
    let again = inspect(&report.documents[0].path, &GeneratorConfig::default()).unwrap();
    let prices: Vec<_> = again.items.iter().map(|i| (i.name.as_str(), i.qty, i.price, i.amount)).collect();
    assert_eq!(
        prices,
        vec![
            ("Болт М8", d("10"), d("5.00"), d("50.00")),
            ("Гайка М8", d("100"), d("1.50"), d("150.00")),
        ]
    );
}

#[test]
fn every_variant_gets_its_own_document() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let request = fx.request(
        &input,
        None,
        vec![
            variant("alpha", markup("10", RoundingPolicy::None)),
            variant("beta", markup("50", RoundingPolicy::NearestInteger).with_fixed_add(d("1"))),
        ],
    );
    let report = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap();

    let totals: Vec<_> = report.documents.iter().map(|doc| (doc.company_id.as_str(), doc.total)).collect();
    // alpha: 5.50 × 10 + 1.65 × 100; beta: round(8.50) × 10 + round(3.25) × 100
    assert_eq!(totals, vec![("alpha", d("220.00")), ("beta", d("390.00"))]);
    assert_eq!(fx.outputs().len(), 2);
    assert!(fx.outputs().iter().any(|n| n.starts_with("КП_ИП_Бета_") && n.ends_with("_v2.xlsx")));
}

#[test]
fn colliding_output_paths_write_nothing() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let target = fx.out_dir().join("same.xlsx");
    let request = fx.request(
        &input,
        None,
        vec![
            variant("alpha", PricingConfig::default()).output_path(&target),
            variant("beta", PricingConfig::default()).output_path(&target),
        ],
    );
    let err = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);
    assert!(fx.outputs().is_empty());
}

#[test]
fn failed_write_keeps_existing_output_file() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    std::fs::create_dir_all(fx.out_dir()).unwrap();
    let existing = fx.out_dir().join("keep.xlsx");
    std::fs::write(&existing, b"previous proposal").unwrap();
    // The parent of this target is a regular file, so it cannot be written.
    let unwritable = input.join("nested.xlsx");

    let request = fx.request(
        &input,
        None,
        vec![
            variant("alpha", PricingConfig::default()),
            variant("beta", PricingConfig::default()).output_path(&existing),
            variant("alpha", PricingConfig::default()).output_path(&unwritable),
        ],
    );
    let err = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Io, "got: {err}");
    assert_eq!(fx.outputs(), ["keep.xlsx"]);
    assert_eq!(std::fs::read(&existing).unwrap(), b"previous proposal");
}

#[test]
fn input_without_goods_table_is_a_format_error() {
    let fx = Fixture::new();
    let input = fx.path("in/notes.xlsx");
    let mut wb = rust_xlsxwriter::Workbook::new();
    wb.add_worksheet().write_string(0, 0, "просто заметки").unwrap();
    wb.save(&input).unwrap();

    let request = fx.request(&input, None, vec![variant("alpha", PricingConfig::default())]);
    let err = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap_err();
    assert!(matches!(err, KpError::FileFormat { .. }), "got: {err}");
    assert!(fx.outputs().is_empty());
}

#[test]
fn disguised_input_is_rejected() {
    let fx = Fixture::new();
    let input = fx.path("in/price.pdf");
    std::fs::write(&input, b"this is not a pdf").unwrap();
    let request = fx.request(&input, None, vec![variant("alpha", PricingConfig::default())]);
    let err = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::FileFormat);
}

#[test]
fn spreadsheet_source_is_reported() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let extraction = inspect(&input, &GeneratorConfig::default()).unwrap();
    assert!(matches!(extraction.source, ExtractionSource::Spreadsheet { .. }));
    assert_eq!(extraction.items.len(), 2);
}

#[test]
fn item_named_after_vat_is_kept() {
    let fx = Fixture::new();
    let input = fx.path("in/services.xlsx");
    write_price_list(
        &input,
        &[("Консультация по НДС", 1.0, "усл", 100.0), ("Болт М8", 10.0, "шт", 5.0)],
    );
    let request = fx.request(&input, None, vec![variant("alpha", PricingConfig::default())]);
    let report = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap();

    let names: Vec<_> = report.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["Консультация по НДС", "Болт М8"]);
    assert_eq!(report.documents[0].item_count, 2);
    assert_eq!(report.documents[0].total, d("150.00"));
}

#[test]
fn overflowing_surcharge_is_a_config_error() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let request = fx.request(
        &input,
        None,
        vec![variant("alpha", PricingConfig::default().with_fixed_add(rust_decimal::Decimal::MAX))],
    );
    let err = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap_err();
    assert!(matches!(err, KpError::Pricing { .. }), "got: {err}");
    assert_eq!(err.category(), ErrorCategory::Config);
    assert!(fx.outputs().is_empty());
}

#[test]
fn sub_kopeck_rounding_step_is_refused() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let request = fx.request(
        &input,
        None,
        vec![variant("alpha", markup("10", RoundingPolicy::NearestStep(d("0.003"))))],
    );
    let err = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);
}

// ── XLSX templates ───────────────────────────────────────────────────────

#[test]
fn xlsx_template_is_filled_below_its_header() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let template = fx.path("in/template.xlsx");
    write_xlsx_template(&template);

    let request = fx.request(
        &input,
        Some(&template),
        vec![variant("alpha", markup("20", RoundingPolicy::NearestStep(d("10"))))],
    );
    let report = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap();
    let path = &report.documents[0].path;
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("xlsx"));

    let range = read_xlsx(path);
    assert_eq!(range.get_value((0, 0)), Some(&Data::String("ООО «Альфа»".into())));
    // Bolt: 5.00 → 6.00 → 10; nut: 1.50 → 1.80 → 0
    assert_eq!(range.get_value((4, 0)), Some(&Data::Float(1.0)));
    assert_eq!(range.get_value((4, 1)), Some(&Data::String("Болт М8".into())));
    assert_eq!(range.get_value((4, 4)), Some(&Data::Float(10.0)));
    assert_eq!(range.get_value((4, 5)), Some(&Data::Float(100.0)));
    assert_eq!(range.get_value((5, 1)), Some(&Data::String("Гайка М8".into())));
    // The Итого row moved down by the inserted item rows and got the total.
    assert_eq!(range.get_value((6, 4)), Some(&Data::String("Итого:".into())));
    assert_eq!(range.get_value((6, 5)), Some(&Data::Float(100.0)));
    assert_eq!(range.get_value((9, 1)), Some(&Data::String("Директор Иванов И. И.".into())));

    // Render → re-extract gives the priced numbers back.
    let again = inspect(path, &GeneratorConfig::default()).unwrap();
    assert_eq!(again.items.len(), 2);
    assert_eq!(again.items[0].price, d("10"));
    assert_eq!(again.items[0].amount, d("100"));
}

#[test]
fn xlsx_template_formulas_follow_inserted_rows() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let template = fx.path("in/formulas.xlsx");
    {
        let mut wb = rust_xlsxwriter::Workbook::new();
        let sheet = wb.add_worksheet();
        sheet.write_string(0, 0, "{{COMPANY_NAME}}").unwrap();
        sheet.write_formula(1, 5, "=$C$6/100").unwrap();
        for (col, title) in ["№", "Наименование", "Кол-во", "Ед. изм.", "Цена", "Сумма"].iter().enumerate() {
            sheet.write_string(3, col as u16, *title).unwrap();
        }
        sheet.write_string(4, 4, "Итого:").unwrap();
        sheet.write_string(5, 0, "Ставка НДС, %").unwrap();
        sheet.write_number(5, 2, 20).unwrap();
        sheet.write_formula(6, 5, "=LOG10(100)+$C$6").unwrap();
        wb.save(&template).unwrap();
    }

    let request = fx.request(&input, Some(&template), vec![variant("alpha", PricingConfig::default())]);
    let report = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap();
    let path = &report.documents[0].path;

    // Two item rows were inserted at row 5, so everything from there moves
    // down by two, absolute references included.
    let range = read_xlsx(path);
    assert_eq!(range.get_value((6, 4)), Some(&Data::String("Итого:".into())));
    assert_eq!(range.get_value((6, 5)), Some(&Data::Float(200.0)));
    assert_eq!(range.get_value((7, 0)), Some(&Data::String("Ставка НДС, %".into())));
    assert_eq!(range.get_value((7, 2)), Some(&Data::Float(20.0)));
    assert!(
        !matches!(range.get_value((7, 5)), Some(Data::Float(_))),
        "the VAT-rate row is not a totals row"
    );

    let formulas = read_formulas(path);
    assert_eq!(formulas.get_value((8, 5)).map(String::as_str), Some("LOG10(100)+$C$8"));
    assert_eq!(formulas.get_value((1, 5)).map(String::as_str), Some("$C$8/100"));
}

// ── DOCX templates ───────────────────────────────────────────────────────

#[test]
fn docx_template_round_trip() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let template = fx.path("in/template.docx");
    write_docx_marker_template(&template);

    let request = fx.request(
        &input,
        Some(&template),
        vec![variant("beta", markup("10", RoundingPolicy::None))],
    );
    let report = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap();
    let doc = &report.documents[0];
    assert!(doc.path.to_string_lossy().ends_with("_v1.docx"));

    let bytes = std::fs::read(&doc.path).unwrap();
    let table = &read_tables(&bytes).unwrap()[0];
    assert_eq!(table.len(), 4, "header + 2 items + totals");
    assert_eq!(table[1][1], "Болт М8");

    // Numbers printed in the document parse back to the priced values.
    let number = |s: &str| parse_decimal(s).unwrap();
    assert_eq!(number(&table[1][4]), d("5.50"));
    assert_eq!(number(&table[1][5]), d("55.00"));
    assert_eq!(number(&table[2][4]), d("1.65"));
    assert_eq!(number(&table[2][5]), d("165.00"));
    assert_eq!(number(&table[3][5]), d("220.00"));
    assert!(read_text(&bytes).unwrap().contains("Коммерческое предложение ИП Бета"));
}

#[test]
fn docx_without_item_row_writes_nothing() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let template = fx.path("in/letter.docx");
    write_docx(&template, &["Уважаемые коллеги!", "{{COMPANY_NAME}}"], &[]);

    let request = fx.request(
        &input,
        Some(&template),
        vec![
            variant("alpha", PricingConfig::default()),
            variant("beta", PricingConfig::default()),
        ],
    );
    let err = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap_err();
    assert!(
        matches!(err, KpError::Template { issue: TemplateIssue::MissingRowMarker, .. }),
        "got: {err}"
    );
    assert!(fx.outputs().is_empty());
}

#[test]
fn unknown_placeholder_is_a_template_error() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let template = fx.path("in/typo.docx");
    write_docx(
        &template,
        &["{{COMPANY_NAM}}"],
        &[docx_row(&["{{ITEM_NAME}}", "{{ITEM_PRICE}}"])],
    );
    let request = fx.request(&input, Some(&template), vec![variant("alpha", PricingConfig::default())]);
    let err = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        KpError::Template { issue: TemplateIssue::UnknownToken(ref t), .. } if t == "COMPANY_NAM"
    ));
}

#[test]
fn template_of_other_type_is_refused() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let template = fx.path("in/template.odt");
    std::fs::write(&template, b"whatever").unwrap();
    let request = fx.request(&input, Some(&template), vec![variant("alpha", PricingConfig::default())]);
    let err = generate_sync(&request, &fx.companies(), &GeneratorConfig::default()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Template);
}

// ── Async entry point ────────────────────────────────────────────────────

#[tokio::test]
async fn async_generate_matches_sync() {
    let fx = Fixture::new();
    let input = bolt_and_nut(&fx);
    let request = fx.request(&input, None, vec![variant("alpha", markup("0", RoundingPolicy::None))]);
    let report = generate(request, Arc::new(fx.companies()), GeneratorConfig::default())
        .await
        .unwrap();
    assert_eq!(report.documents[0].total, d("200.00"));
    assert!(report.documents[0].path.is_file());
}
