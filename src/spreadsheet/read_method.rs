//! The per-sheet read-method cascade.
//!
//! Each [`ReadMethod`] turns a clean [`SheetScan`] into a [`Table`] or
//! explains why it cannot. Methods run in [`ReadMethod::CASCADE`] order, from
//! strictest to most permissive; the first `Ok` is used.

use std::collections::BTreeMap;

use crate::config::SpreadsheetConfig;

use super::sheet::{cell_label, CellKind, RawCell, SheetScan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMethod {
    /// First row as header, values decoded by type.
    HeaderTyped,
    /// First row as header, every cell taken as text.
    HeaderText,
    /// No header, every cell taken as text.
    NoHeaderText,
    /// No header, stored values verbatim.
    NoHeaderRaw,
}

impl ReadMethod {
    pub const CASCADE: [ReadMethod; 4] = [
        ReadMethod::HeaderTyped,
        ReadMethod::HeaderText,
        ReadMethod::NoHeaderText,
        ReadMethod::NoHeaderRaw,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ReadMethod::HeaderTyped => "header row, typed values",
            ReadMethod::HeaderText => "header row, text values",
            ReadMethod::NoHeaderText => "no header, text values",
            ReadMethod::NoHeaderRaw => "no header, raw values",
        }
    }

    fn uses_header(&self) -> bool {
        matches!(self, ReadMethod::HeaderTyped | ReadMethod::HeaderText)
    }

    /// Reads `scan` with this method. Every stored cell is decoded so a bad
    /// value anywhere rejects the method, but only the window shown by
    /// `limits` is materialized; `Table` keeps the true extent.
    pub(crate) fn read(
        &self,
        scan: &SheetScan,
        shared: &[String],
        limits: &SpreadsheetConfig,
    ) -> Result<Table, String> {
        if let Some(err) = &scan.error {
            return Err(format!("malformed worksheet XML: {}", err));
        }

        let (max_row, width) = scan.occupied_extent();
        let first_data_row: u32 = if self.uses_header() { 2 } else { 1 };
        let last_row = max_row.min(
            first_data_row
                .saturating_add(limits.max_rows)
                .saturating_sub(1),
        );
        let shown_cols = width.min(limits.max_cols);

        let mut window = BTreeMap::new();
        let mut header_seen = false;
        for (&(row, col), cell) in &scan.cells {
            let value = self.decode(cell, row, col, shared)?;
            if row == 1 && !value.trim().is_empty() {
                header_seen = true;
            }
            if row <= last_row && col <= shown_cols {
                window.insert((row, col), value);
            }
        }
        let mut take_row = |row: u32| -> Vec<String> {
            (1..=shown_cols)
                .map(|col| window.remove(&(row, col)).unwrap_or_default())
                .collect()
        };

        let header = if self.uses_header() {
            if !header_seen {
                return Err("first row is empty, no header to read".to_string());
            }
            Some(take_row(1))
        } else {
            None
        };
        let rows = (first_data_row..=last_row).map(&mut take_row).collect();

        Ok(Table {
            header,
            rows,
            row_count: (max_row + 1).saturating_sub(first_data_row),
            width,
        })
    }

    fn decode(&self, cell: &RawCell, row: u32, col: u32, shared: &[String]) -> Result<String, String> {
        match self {
            ReadMethod::HeaderTyped => typed_value(cell, row, col, shared),
            ReadMethod::HeaderText | ReadMethod::NoHeaderText => text_value(cell, row, col, shared),
            ReadMethod::NoHeaderRaw => Ok(raw_value(cell, shared)),
        }
    }
}

/// A sheet read into rows of display strings, already cut to the display
/// window. `row_count` and `width` are the full extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Table {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub row_count: u32,
    pub width: u32,
}

impl Table {
    pub fn render(&self, sheet: &str, method: ReadMethod, limits: &SpreadsheetConfig) -> String {
        let mut lines = vec![format!(
            "--- Sheet: {} [{} rows × {} columns] ({}) ---",
            sheet,
            self.row_count,
            self.width,
            method.label()
        )];
        if self.row_count == 0 && self.header.is_none() {
            lines.push("[Empty sheet]".to_string());
            return lines.join("\n");
        }

        let shown_cols = self.width.min(limits.max_cols) as usize;
        let render_row = |cells: &[String]| {
            cells
                .iter()
                .take(shown_cols)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" | ")
        };
        if let Some(header) = &self.header {
            lines.push(render_row(&header[..]));
        }
        for row in self.rows.iter().take(limits.max_rows as usize) {
            lines.push(render_row(&row[..]));
        }
        if self.row_count > limits.max_rows {
            lines.push(format!(
                "[Note: Large sheet - showing only first {} rows of {} total]",
                limits.max_rows, self.row_count
            ));
        }
        if self.width > limits.max_cols {
            lines.push(format!(
                "[Note: Wide sheet - showing only first {} columns of {} total]",
                limits.max_cols, self.width
            ));
        }
        lines.join("\n")
    }
}

fn shared_string<'a>(
    cell: &RawCell,
    row: u32,
    col: u32,
    shared: &'a [String],
) -> Result<&'a str, String> {
    cell.value
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|i| shared.get(i))
        .map(String::as_str)
        .ok_or_else(|| {
            format!(
                "cell {} references missing shared string {}",
                cell_label(row, col),
                cell.value.trim()
            )
        })
}

fn typed_value(cell: &RawCell, row: u32, col: u32, shared: &[String]) -> Result<String, String> {
    let label = || cell_label(row, col);
    match cell.kind {
        CellKind::SharedString => shared_string(cell, row, col, shared).map(str::to_owned),
        CellKind::InlineString | CellKind::FormulaString | CellKind::Date => Ok(cell.value.clone()),
        CellKind::Number => {
            let n: f64 = cell
                .value
                .trim()
                .parse()
                .map_err(|_| format!("cell {}: '{}' is not a number", label(), cell.value))?;
            Ok(format_number(n))
        }
        CellKind::Boolean => match cell.value.trim() {
            "1" => Ok("TRUE".to_string()),
            "0" => Ok("FALSE".to_string()),
            other => Err(format!("cell {}: '{}' is not a boolean", label(), other)),
        },
        CellKind::Error => Err(format!("cell {} holds error value {}", label(), cell.value)),
    }
}

fn text_value(cell: &RawCell, row: u32, col: u32, shared: &[String]) -> Result<String, String> {
    match cell.kind {
        CellKind::SharedString => shared_string(cell, row, col, shared).map(str::to_owned),
        _ => Ok(cell.value.clone()),
    }
}

/// Stored value, with shared strings resolved where the index is valid.
pub(crate) fn raw_value(cell: &RawCell, shared: &[String]) -> String {
    if cell.kind == CellKind::SharedString {
        if let Some(s) = cell
            .value
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i))
        {
            return s.clone();
        }
    }
    cell.value.clone()
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
