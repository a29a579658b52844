//! Tolerant worksheet scanner.
//!
//! [`SheetScan::parse`] walks a worksheet's XML once and keeps every cell it
//! could read. On malformed XML it stops at the first error, records it, and
//! keeps the cells read so far; the read methods refuse such a scan while the
//! manual cell walk salvages it.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Largest row and column Excel can address.
const MAX_ROW: u32 = 1_048_576;
const MAX_COL: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellKind {
    Number,
    SharedString,
    InlineString,
    FormulaString,
    Boolean,
    Error,
    Date,
}

impl CellKind {
    fn from_type_attr(t: Option<&str>) -> Self {
        match t {
            Some("s") => CellKind::SharedString,
            Some("inlineStr") => CellKind::InlineString,
            Some("str") => CellKind::FormulaString,
            Some("b") => CellKind::Boolean,
            Some("e") => CellKind::Error,
            Some("d") => CellKind::Date,
            _ => CellKind::Number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawCell {
    pub kind: CellKind,
    /// Stored value as written in the XML (`<v>` or inline `<t>` text).
    pub value: String,
}

#[derive(Debug, Default)]
pub(crate) struct SheetScan {
    /// `(rows, cols)` extent from `<dimension ref>`, if declared and parseable.
    pub dimension: Option<(u32, u32)>,
    /// Cells keyed by 1-based `(row, col)`.
    pub cells: BTreeMap<(u32, u32), RawCell>,
    pub error: Option<String>,
}

struct PendingCell {
    pos: (u32, u32),
    kind: CellKind,
    value: String,
    has_value: bool,
}

impl SheetScan {
    pub fn parse(xml: &[u8]) -> Self {
        let mut scan = SheetScan::default();
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();

        let mut depth = 0usize;
        let mut saw_root = false;
        let mut row = 0u32;
        let mut next_col = 1u32;
        let mut pending: Option<PendingCell> = None;
        let mut in_value = false;

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    scan.error = Some(format!("{} (at byte {})", e, reader.buffer_position()));
                    break;
                }
            };
            match event {
                Event::Start(e) => {
                    depth += 1;
                    match e.local_name().as_ref() {
                        b"worksheet" => saw_root = true,
                        b"dimension" => scan.dimension = declared_extent(&e),
                        b"row" => {
                            row = row_number(&e).unwrap_or(row + 1);
                            next_col = 1;
                        }
                        b"c" => {
                            let pos = cell_position(&e).unwrap_or((row, next_col));
                            next_col = pos.1 + 1;
                            pending = Some(PendingCell {
                                pos,
                                kind: CellKind::from_type_attr(attr(&e, b"t").as_deref()),
                                value: String::new(),
                                has_value: false,
                            });
                        }
                        b"v" => in_value = true,
                        // Inline strings: <is><t>..</t></is>; rich runs land here too.
                        b"t" => in_value = pending.is_some(),
                        _ => {}
                    }
                }
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"dimension" => scan.dimension = declared_extent(&e),
                    b"row" => {
                        row = row_number(&e).unwrap_or(row + 1);
                        next_col = 1;
                    }
                    b"c" => {
                        let pos = cell_position(&e).unwrap_or((row, next_col));
                        next_col = pos.1 + 1;
                    }
                    _ => {}
                },
                Event::Text(te) if in_value => match te.unescape() {
                    Ok(text) => {
                        if let Some(cell) = pending.as_mut() {
                            cell.value.push_str(&text);
                            cell.has_value = true;
                        }
                    }
                    Err(e) => {
                        scan.error = Some(format!("{} (at byte {})", e, reader.buffer_position()));
                        break;
                    }
                },
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    match e.local_name().as_ref() {
                        b"v" | b"t" => in_value = false,
                        b"c" => {
                            if let Some(cell) = pending.take() {
                                if cell.has_value && cell.pos.0 > 0 {
                                    scan.cells.insert(
                                        cell.pos,
                                        RawCell {
                                            kind: cell.kind,
                                            value: cell.value,
                                        },
                                    );
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => {
                    if !saw_root {
                        scan.error = Some("missing <worksheet> root element".to_string());
                    } else if depth != 0 {
                        scan.error = Some("unexpected end of worksheet XML".to_string());
                    }
                    break;
                }
                _ => {}
            }
            buf.clear();
        }
        scan
    }

    /// Largest occupied `(row, col)`, or `(0, 0)` when there are no cells.
    pub fn occupied_extent(&self) -> (u32, u32) {
        self.cells.keys().fold((0, 0), |(rows, cols), &(r, c)| {
            (rows.max(r), cols.max(c))
        })
    }
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == local {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn row_number(e: &BytesStart<'_>) -> Option<u32> {
    attr(e, b"r")?
        .parse::<u32>()
        .ok()
        .filter(|r| (1..=MAX_ROW).contains(r))
}

fn cell_position(e: &BytesStart<'_>) -> Option<(u32, u32)> {
    parse_cell_ref(&attr(e, b"r")?)
}

/// Extent of a `<dimension ref="A1:C10">`: the bottom-right corner.
fn declared_extent(e: &BytesStart<'_>) -> Option<(u32, u32)> {
    let range = attr(e, b"ref")?;
    let corner = range.rsplit(':').next()?;
    parse_cell_ref(corner)
}

/// Parses an A1-style reference into 1-based `(row, col)`.
pub(crate) fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim().replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || letters.len() > 3 || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .chars()
        .map(|c| c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
        .fold(0u32, |acc, d| acc * 26 + d);
    let row = digits.parse::<u32>().ok()?;
    if row == 0 || row > MAX_ROW || col > MAX_COL {
        return None;
    }
    Some((row, col))
}

/// Column letters for a 1-based column index (1 → A, 27 → AA).
pub(crate) fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub(crate) fn cell_label(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row)
}
