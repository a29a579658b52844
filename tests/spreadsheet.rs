//! Integration tests for spreadsheet extraction on damaged workbooks.
//!
//! Workbooks are assembled in-test with `zip::ZipWriter`, one part at a time,
//! so each test can break exactly the piece it is about.

use std::io::Write;

use docchat::config::SpreadsheetConfig;
use docchat::corpus::CorpusStore;
use docchat::models::{ExtractionStatus, UploadedDocument};
use docchat::spreadsheet::{SpreadsheetExtractor, UNREADABLE_WORKBOOK};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// One sheet in a test workbook. `xml: None` links the sheet in the
/// manifest but leaves its part out of the archive.
struct Sheet<'a> {
    name: &'a str,
    xml: Option<String>,
}

fn sheet<'a>(name: &'a str, body: &str) -> Sheet<'a> {
    Sheet {
        name,
        xml: Some(format!(
            "<?xml version=\"1.0\"?><worksheet xmlns=\"{}\">{}</worksheet>",
            MAIN_NS, body
        )),
    }
}

fn zip_parts(parts: &[(String, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, content) in parts {
            zip.start_file(name.as_str(), zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn build_xlsx(sheets: &[Sheet<'_>], shared: &[&str], with_manifest: bool) -> Vec<u8> {
    let mut parts = Vec::new();
    if with_manifest {
        let entries: String = sheets
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
                    s.name,
                    i + 1,
                    i + 1
                )
            })
            .collect();
        parts.push((
            "xl/workbook.xml".to_string(),
            format!(
                "<?xml version=\"1.0\"?><workbook xmlns=\"{}\" xmlns:r=\"{}\"><sheets>{}</sheets></workbook>",
                MAIN_NS, REL_NS, entries
            ),
        ));
        let rels: String = (1..=sheets.len())
            .map(|i| {
                format!(
                    "<Relationship Id=\"rId{i}\" Type=\"{REL_NS}/worksheet\" Target=\"worksheets/sheet{i}.xml\"/>"
                )
            })
            .collect();
        parts.push((
            "xl/_rels/workbook.xml.rels".to_string(),
            format!(
                "<?xml version=\"1.0\"?><Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{}</Relationships>",
                rels
            ),
        ));
    }
    if !shared.is_empty() {
        let items: String = shared.iter().map(|s| format!("<si><t>{}</t></si>", s)).collect();
        parts.push((
            "xl/sharedStrings.xml".to_string(),
            format!("<?xml version=\"1.0\"?><sst xmlns=\"{}\">{}</sst>", MAIN_NS, items),
        ));
    }
    for (i, s) in sheets.iter().enumerate() {
        if let Some(xml) = &s.xml {
            parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), xml.clone()));
        }
    }
    zip_parts(&parts)
}

fn table_sheet<'a>(name: &'a str, label: &str, value: u32) -> Sheet<'a> {
    sheet(
        name,
        &format!(
            r#"<dimension ref="A1:B2"/><sheetData>
                 <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>{label}</t></is></c></row>
                 <row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2"><v>{value}</v></c></row>
               </sheetData>"#
        ),
    )
}

fn extract(bytes: &[u8]) -> docchat::models::ExtractionResult {
    SpreadsheetExtractor::default().extract(bytes, "book.xlsx")
}

#[test]
fn clean_workbook_reads_every_sheet() {
    let bytes = build_xlsx(
        &[table_sheet("Sales", "Units", 12), table_sheet("Costs", "Euros", 7)],
        &["Item", "Widget"],
        true,
    );
    let result = extract(&bytes);

    assert_eq!(result.status, ExtractionStatus::Ok);
    assert!(result.text.starts_with(
        "Excel File: book.xlsx\nEngine: openxml\nNumber of sheets: 2\nSheet names: Sales, Costs\n\n"
    ));
    assert!(result
        .text
        .contains("--- Sheet: Sales [1 rows × 2 columns] (header row, typed values) ---\nItem | Units\nWidget | 12"));
    assert!(result.text.contains("Item | Euros\nWidget | 7"));
}

#[test]
fn one_unreadable_sheet_does_not_affect_the_others() {
    let bytes = build_xlsx(
        &[
            table_sheet("Alpha", "A", 1),
            Sheet {
                name: "Beta",
                xml: None,
            },
            table_sheet("Gamma", "G", 3),
        ],
        &["Item", "Widget"],
        true,
    );
    let result = extract(&bytes);

    assert_eq!(
        result.status,
        ExtractionStatus::PartialFailure("1 of 3 sheets failed: Beta".into())
    );
    assert!(result.text.contains("--- Sheet: Beta --- [Error: "));
    assert!(result.text.contains("Item | A\nWidget | 1"));
    assert!(result.text.contains("Item | G\nWidget | 3"));

    let alpha = result.text.find("Sheet: Alpha").unwrap();
    let beta = result.text.find("Sheet: Beta").unwrap();
    let gamma = result.text.find("Sheet: Gamma").unwrap();
    assert!(alpha < beta && beta < gamma);
}

#[test]
fn missing_manifest_falls_back_to_part_scan() {
    let bytes = build_xlsx(&[table_sheet("Ignored", "Units", 5)], &["Item", "Widget"], false);
    let result = extract(&bytes);

    assert_eq!(result.status, ExtractionStatus::Ok);
    assert!(result.text.contains("Engine: part-scan"));
    assert!(result.text.contains("Sheet names: sheet1"));
    assert!(result.text.contains("Widget | 5"));
}

#[test]
fn truncated_sheet_xml_is_salvaged_by_cell_walk() {
    let broken = Sheet {
        name: "Broken",
        xml: Some(format!(
            r#"<worksheet xmlns="{}"><sheetData><row r="1"><c r="A1"><v>10</v></c><c r="B1" t="s"><v>0</v></c></row><row r="2"><c r="A2"><v>2"#,
            MAIN_NS
        )),
    };
    let result = extract(&build_xlsx(&[broken], &["label"], true));

    assert_eq!(result.status, ExtractionStatus::Ok);
    assert!(result
        .text
        .contains("--- Sheet: Broken [1 rows × 2 columns] (Manual cell extraction) ---\n10 | label"));
}

#[test]
fn cell_walk_is_not_used_by_the_part_scan_engine() {
    let broken = Sheet {
        name: "Broken",
        xml: Some(r#"<worksheet><sheetData><row r="1"><c r="A1"><v>10</v></c>"#.to_string()),
    };
    let result = extract(&build_xlsx(&[broken], &[], false));

    assert!(matches!(result.status, ExtractionStatus::PartialFailure(_)));
    assert!(result
        .text
        .contains("--- Sheet: sheet1 --- [Error: failed to read with all methods: "));
}

#[test]
fn empty_and_dimensionless_sheets_terminate() {
    let bytes = build_xlsx(
        &[
            sheet("Zero", r#"<dimension ref="A1"/><sheetData/>"#),
            sheet("Nothing", ""),
            Sheet {
                name: "Garbage",
                xml: Some("<<<not xml at all".to_string()),
            },
        ],
        &[],
        true,
    );
    let result = extract(&bytes);

    assert_eq!(
        result.status,
        ExtractionStatus::PartialFailure("1 of 3 sheets failed: Garbage".into())
    );
    assert!(result.text.contains("--- Sheet: Zero [0 rows × 0 columns] (no header, text values) ---\n[Empty sheet]"));
    assert!(result.text.contains("--- Sheet: Garbage --- [Error: "));
}

#[test]
fn non_zip_bytes_are_an_unreadable_workbook() {
    for bytes in [&b"definitely not a spreadsheet"[..], &[][..]] {
        let result = extract(bytes);
        assert_eq!(
            result.status,
            ExtractionStatus::Failure(UNREADABLE_WORKBOOK.to_string())
        );
        assert_eq!(
            result.text,
            format!("[Error processing book.xlsx: {}]", UNREADABLE_WORKBOOK)
        );
    }
}

#[test]
fn zip_without_workbook_parts_is_an_unreadable_workbook() {
    let bytes = zip_parts(&[("readme.txt".to_string(), "hello".to_string())]);
    assert!(extract(&bytes).status.is_failure());
}

#[test]
fn sheet_cap_is_reported() {
    let sheets: Vec<Sheet<'_>> = ["S1", "S2", "S3"]
        .into_iter()
        .map(|n| table_sheet(n, "V", 1))
        .collect();
    let extractor = SpreadsheetExtractor::new(SpreadsheetConfig {
        max_sheets: 2,
        ..SpreadsheetConfig::default()
    });
    let result = extractor.extract(&build_xlsx(&sheets, &["Item", "Widget"], true), "many.xlsx");

    assert_eq!(result.status, ExtractionStatus::Ok);
    assert!(result.text.contains("Number of sheets: 3"));
    assert!(!result.text.contains("--- Sheet: S3"));
    assert!(result.text.contains("[Note: only the first 2 of 3 sheets were read]"));
}

#[test]
fn partial_workbook_lands_in_the_corpus() {
    let bytes = build_xlsx(
        &[
            table_sheet("Alpha", "A", 1),
            Sheet {
                name: "Beta",
                xml: None,
            },
        ],
        &["Item", "Widget"],
        true,
    );
    let mut store = CorpusStore::default();
    let summary = store.add_files(vec![UploadedDocument::new("book.xlsx", bytes).unwrap()]);

    assert_eq!(summary.partial, vec!["book.xlsx".to_string()]);
    let text = store.source_text("book.xlsx").unwrap();
    assert!(text.contains("Widget | 1"));
    assert!(text.contains("--- Sheet: Beta --- [Error: "));
}

#[test]
fn far_corner_cell_is_read_within_display_limits() {
    let far = sheet(
        "Sparse",
        r#"<dimension ref="A1:XFD1048576"/><sheetData>
             <row r="1"><c r="A1" t="inlineStr"><is><t>Key</t></is></c></row>
             <row r="1048576"><c r="XFD1048576"><v>7</v></c></row>
           </sheetData>"#,
    );
    let result = extract(&build_xlsx(&[far], &[], true));

    assert_eq!(result.status, ExtractionStatus::Ok);
    assert!(result
        .text
        .contains("--- Sheet: Sparse [1048575 rows × 16384 columns] (header row, typed values) ---"));
    assert!(result
        .text
        .contains("[Note: Large sheet - showing only first 200 rows of 1048575 total]"));
    assert!(result
        .text
        .contains("[Note: Wide sheet - showing only first 30 columns of 16384 total]"));

    let table_lines: Vec<&str> = result.text.lines().filter(|l| l.contains(" | ")).collect();
    assert_eq!(table_lines.len(), 201);
    assert!(table_lines.iter().all(|l| l.matches(" | ").count() == 29));
}
