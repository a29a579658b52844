//! Last-resort cell-by-cell extraction for sheets no read method accepts.

use crate::config::SpreadsheetConfig;

use super::read_method::raw_value;
use super::sheet::SheetScan;

/// Renders whatever cells `scan` salvaged as a bounded ` | ` table.
///
/// The extent comes from the declared dimension; when that is missing, the
/// probe window (`probe_rows` × `probe_cols`) is searched for the furthest
/// non-empty cell. A sheet with no content yields an empty-sheet marker.
pub(crate) fn walk(
    sheet: &str,
    scan: &SheetScan,
    shared: &[String],
    limits: &SpreadsheetConfig,
) -> Result<String, String> {
    if scan.cells.is_empty() {
        if let Some(err) = &scan.error {
            return Err(format!("worksheet XML unreadable: {}", err));
        }
    }

    let (max_row, max_col) = match scan.dimension {
        Some((rows, cols)) if rows > 0 && cols > 0 => (rows, cols),
        _ => probe_extent(scan, limits),
    };
    if max_row == 0 || max_col == 0 {
        return Ok(format!(
            "--- Sheet: {} --- [Empty sheet or could not determine dimensions]",
            sheet
        ));
    }

    let mut lines = vec![format!(
        "--- Sheet: {} [{} rows × {} columns] (Manual cell extraction) ---",
        sheet, max_row, max_col
    )];
    for row in 1..=max_row.min(limits.max_rows) {
        let cells: Vec<String> = (1..=max_col.min(limits.max_cols))
            .map(|col| {
                scan.cells
                    .get(&(row, col))
                    .map(|cell| raw_value(cell, shared))
                    .unwrap_or_default()
            })
            .collect();
        lines.push(cells.join(" | "));
    }
    if max_row > limits.max_rows {
        lines.push(format!(
            "[Note: Large sheet - showing only first {} rows of {} total]",
            limits.max_rows, max_row
        ));
    }
    if max_col > limits.max_cols {
        lines.push(format!(
            "[Note: Wide sheet - showing only first {} columns of {} total]",
            limits.max_cols, max_col
        ));
    }
    Ok(lines.join("\n"))
}

fn probe_extent(scan: &SheetScan, limits: &SpreadsheetConfig) -> (u32, u32) {
    let mut found = (0, 0);
    for row in 1..=limits.probe_rows {
        for col in 1..=limits.probe_cols {
            let occupied = scan
                .cells
                .get(&(row, col))
                .is_some_and(|cell| !cell.value.trim().is_empty());
            if occupied {
                found = (found.0.max(row), found.1.max(col));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_extent_when_dimension_is_missing() {
        let scan = SheetScan::parse(
            br#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row><row r="3"><c r="C3"><v>9</v></c></row><row r="4"><c r="A4"><v>tr"#,
        );
        assert!(scan.error.is_some());
        assert!(scan.dimension.is_none());
        let text = walk("Broken", &scan, &[], &SpreadsheetConfig::default()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "--- Sheet: Broken [3 rows × 3 columns] (Manual cell extraction) ---"
        );
        assert_eq!(lines[1], "1 |  | ");
        assert_eq!(lines[3], " |  | 9");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn content_outside_probe_window_is_not_found() {
        let scan = SheetScan::parse(
            br#"<worksheet><sheetData><row r="150"><c r="A150"><v>1</v></c></row><row>"#,
        );
        let text = walk("Far", &scan, &[], &SpreadsheetConfig::default()).unwrap();
        assert_eq!(
            text,
            "--- Sheet: Far --- [Empty sheet or could not determine dimensions]"
        );
    }

    #[test]
    fn declared_dimension_drives_truncation() {
        let scan = SheetScan::parse(
            br#"<worksheet><dimension ref="A1:AH500"/><sheetData><row r="1"><c r="A1"><v>x</v></c>"#,
        );
        let text = walk("Big", &scan, &[], &SpreadsheetConfig::default()).unwrap();
        assert!(text.starts_with("--- Sheet: Big [500 rows × 34 columns] (Manual cell extraction) ---"));
        assert!(text.contains("[Note: Large sheet - showing only first 200 rows of 500 total]"));
        assert!(text.contains("[Note: Wide sheet - showing only first 30 columns of 34 total]"));
        assert_eq!(text.lines().count(), 1 + 200 + 2);
    }

    #[test]
    fn unreadable_xml_with_nothing_salvaged_fails() {
        let scan = SheetScan::parse(b"<worksheet><sheetData><row r=\"1\"><c r=\"A1\"><v>");
        assert!(walk("Gone", &scan, &[], &SpreadsheetConfig::default()).is_err());
    }
}
