//! Workbook-opening engines.
//!
//! Engines are tried in [`SpreadsheetEngine::ORDER`]; the first one that can
//! open the package and list its sheets handles the whole file.

use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::extract::{read_zip_entry_bounded, MAX_XML_ENTRY_BYTES};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetEngine {
    /// Reads the workbook manifest: real sheet names, relationship-resolved
    /// parts, strict shared strings.
    OpenXml,
    /// Enumerates `xl/worksheets/sheetN.xml` parts directly. Survives a
    /// missing or corrupt manifest, at the cost of real sheet names.
    PartScan,
}

impl SpreadsheetEngine {
    pub const ORDER: [SpreadsheetEngine; 2] = [SpreadsheetEngine::OpenXml, SpreadsheetEngine::PartScan];

    pub fn name(&self) -> &'static str {
        match self {
            SpreadsheetEngine::OpenXml => "openxml",
            SpreadsheetEngine::PartScan => "part-scan",
        }
    }

    /// Only the manifest-based engine can fall back to a manual cell walk.
    pub fn supports_cell_walk(&self) -> bool {
        matches!(self, SpreadsheetEngine::OpenXml)
    }

    pub(crate) fn open<'a>(&self, bytes: &'a [u8]) -> Result<Workbook<'a>, String> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a zip package: {}", e))?;
        let (sheets, shared_strings) = match self {
            SpreadsheetEngine::OpenXml => open_manifest(&mut archive)?,
            SpreadsheetEngine::PartScan => open_part_scan(&mut archive)?,
        };
        Ok(Workbook {
            engine: *self,
            archive,
            sheets,
            shared_strings,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SheetEntry {
    pub name: String,
    /// Archive path of the worksheet XML; `None` when the manifest points nowhere.
    pub part: Option<String>,
}

pub(crate) struct Workbook<'a> {
    engine: SpreadsheetEngine,
    archive: ZipArchive<Cursor<&'a [u8]>>,
    sheets: Vec<SheetEntry>,
    shared_strings: Vec<String>,
}

impl Workbook<'_> {
    pub fn engine(&self) -> SpreadsheetEngine {
        self.engine
    }

    pub fn sheets(&self) -> &[SheetEntry] {
        &self.sheets
    }

    pub fn shared_strings(&self) -> &[String] {
        &self.shared_strings
    }

    pub fn read_sheet(&mut self, sheet: &SheetEntry) -> Result<Vec<u8>, String> {
        let part = sheet
            .part
            .as_deref()
            .ok_or_else(|| format!("no worksheet part is linked to sheet '{}'", sheet.name))?;
        read_zip_entry_bounded(&mut self.archive, part, MAX_XML_ENTRY_BYTES).map_err(|e| e.to_string())
    }
}

fn has_entry(archive: &ZipArchive<Cursor<&[u8]>>, name: &str) -> bool {
    archive.file_names().any(|n| n == name)
}

fn read_part(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Vec<u8>, String> {
    read_zip_entry_bounded(archive, name, MAX_XML_ENTRY_BYTES).map_err(|e| e.to_string())
}

fn open_manifest(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
) -> Result<(Vec<SheetEntry>, Vec<String>), String> {
    let declared = parse_workbook_sheets(&read_part(archive, WORKBOOK_PART)?)?;
    if declared.is_empty() {
        return Err("workbook declares no sheets".to_string());
    }
    let rels = parse_relationships(&read_part(archive, WORKBOOK_RELS_PART)?)?;

    let sheets = declared
        .into_iter()
        .map(|(name, rel_id)| SheetEntry {
            part: rel_id
                .and_then(|id| rels.get(&id))
                .map(|target| resolve_target(target)),
            name,
        })
        .collect();

    let shared_strings = if has_entry(archive, SHARED_STRINGS_PART) {
        parse_shared_strings(&read_part(archive, SHARED_STRINGS_PART)?)?
    } else {
        Vec::new()
    };

    Ok((sheets, shared_strings))
}

fn open_part_scan(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
) -> Result<(Vec<SheetEntry>, Vec<String>), String> {
    let parts = list_worksheet_parts(archive);
    if parts.is_empty() {
        return Err("no worksheet parts found".to_string());
    }

    let shared_strings = if has_entry(archive, SHARED_STRINGS_PART) {
        match read_part(archive, SHARED_STRINGS_PART).and_then(|xml| parse_shared_strings(&xml)) {
            Ok(strings) => strings,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unreadable shared strings");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let sheets = parts
        .into_iter()
        .map(|part| SheetEntry {
            name: part
                .trim_start_matches("xl/worksheets/")
                .trim_end_matches(".xml")
                .to_string(),
            part: Some(part),
        })
        .collect();

    Ok((sheets, shared_strings))
}

/// Worksheet parts sorted by their numeric suffix.
fn list_worksheet_parts(archive: &ZipArchive<Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(WORKSHEET_PREFIX) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(WORKSHEET_PREFIX)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{}", target)
    }
}

fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == local {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// `(sheet name, relationship id)` pairs in workbook order.
fn parse_workbook_sheets(xml: &[u8]) -> Result<Vec<(String, Option<String>)>, String> {
    let mut sheets = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    let name = attr_value(&e, b"name")
                        .ok_or_else(|| "sheet entry without a name".to_string())?;
                    sheets.push((name, attr_value(&e, b"id")));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("{}: {}", WORKBOOK_PART, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, String>, String> {
    let mut rels = HashMap::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    if let (Some(id), Some(target)) =
                        (attr_value(&e, b"Id"), attr_value(&e, b"Target"))
                    {
                        rels.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("{}: {}", WORKBOOK_RELS_PART, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// One entry per `<si>`; rich-text runs are concatenated, phonetic hints skipped.
fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, String> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(String::new());
                }
            }
            Ok(Event::Text(te)) if in_t && !in_phonetic => {
                let text = te
                    .unescape()
                    .map_err(|e| format!("{}: {}", SHARED_STRINGS_PART, e))?;
                if let Some(s) = current.as_mut() {
                    s.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => {
                    if let Some(s) = current.take() {
                        strings.push(s);
                    }
                }
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("{}: {}", SHARED_STRINGS_PART, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}
