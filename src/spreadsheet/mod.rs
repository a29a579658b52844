//! Spreadsheet (`.xlsx`) extraction with layered fallbacks.
//!
//! Real-world workbooks are often damaged: missing manifests, dangling shared
//! strings, truncated worksheet XML, absent dimension metadata. Extraction is
//! therefore a fixed protocol where every step is a `Result` and the first
//! success wins:
//!
//! 1. **Engine**: [`SpreadsheetEngine::ORDER`]; the first engine that opens the
//!    package and lists its sheets handles the whole file.
//! 2. **Read method** per sheet: [`ReadMethod::CASCADE`], strictest first.
//! 3. **Manual cell walk** (manifest engine only): salvages cells from broken
//!    worksheet XML, probing for the extent when none is declared.
//! 4. A sheet that defeats all of the above becomes an inline
//!    `[Error: ...]` marker; the other sheets are unaffected.
//!
//! Only a package no engine can open is a [`ExtractionStatus::Failure`].

mod cell_walk;
mod engine;
mod read_method;
mod sheet;

pub use engine::SpreadsheetEngine;
pub use read_method::ReadMethod;

use tracing::{debug, info, warn};

use crate::config::SpreadsheetConfig;
use crate::models::{ExtractionResult, ExtractionStatus};

use engine::{SheetEntry, Workbook};
use sheet::SheetScan;

/// Failure reason when no engine can open the file.
pub const UNREADABLE_WORKBOOK: &str = "unsupported or corrupted spreadsheet";

pub struct SpreadsheetExtractor {
    limits: SpreadsheetConfig,
}

impl SpreadsheetExtractor {
    pub fn new(limits: SpreadsheetConfig) -> Self {
        Self { limits }
    }

    pub fn extract(&self, bytes: &[u8], filename: &str) -> ExtractionResult {
        for engine in SpreadsheetEngine::ORDER {
            match engine.open(bytes) {
                Ok(workbook) => return self.extract_workbook(workbook, filename),
                Err(reason) => {
                    debug!(file = filename, engine = engine.name(), %reason, "engine cannot open workbook");
                }
            }
        }
        warn!(file = filename, "no spreadsheet engine could open the file");
        ExtractionResult::failure(filename, UNREADABLE_WORKBOOK)
    }

    fn extract_workbook(&self, mut workbook: Workbook<'_>, filename: &str) -> ExtractionResult {
        let engine = workbook.engine();
        let all_sheets = workbook.sheets().to_vec();
        let sheets = &all_sheets[..all_sheets.len().min(self.limits.max_sheets)];
        info!(file = filename, engine = engine.name(), sheets = all_sheets.len(), "reading workbook");

        let mut text = format!(
            "Excel File: {}\nEngine: {}\nNumber of sheets: {}\nSheet names: {}\n\n",
            filename,
            engine.name(),
            all_sheets.len(),
            all_sheets
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut blocks = Vec::with_capacity(sheets.len() + 1);
        let mut failed = Vec::new();
        for sheet in sheets {
            match self.read_sheet(&mut workbook, sheet) {
                Ok(block) => blocks.push(block),
                Err(reason) => {
                    warn!(file = filename, sheet = %sheet.name, %reason, "sheet unreadable");
                    blocks.push(format!("--- Sheet: {} --- [Error: {}]", sheet.name, reason));
                    failed.push(sheet.name.clone());
                }
            }
        }
        if sheets.len() < all_sheets.len() {
            blocks.push(format!(
                "[Note: only the first {} of {} sheets were read]",
                sheets.len(),
                all_sheets.len()
            ));
        }
        text.push_str(&blocks.join("\n\n"));

        let status = if failed.is_empty() {
            ExtractionStatus::Ok
        } else {
            ExtractionStatus::PartialFailure(format!(
                "{} of {} sheets failed: {}",
                failed.len(),
                sheets.len(),
                failed.join(", ")
            ))
        };
        ExtractionResult::new(filename, text, status)
    }

    fn read_sheet(&self, workbook: &mut Workbook<'_>, sheet: &SheetEntry) -> Result<String, String> {
        let xml = workbook.read_sheet(sheet)?;
        let scan = SheetScan::parse(&xml);
        let shared = workbook.shared_strings();

        let mut last_error = String::new();
        for method in ReadMethod::CASCADE {
            match method.read(&scan, shared, &self.limits) {
                Ok(table) => {
                    debug!(sheet = %sheet.name, method = method.label(), "sheet read");
                    return Ok(table.render(&sheet.name, method, &self.limits));
                }
                Err(e) => {
                    debug!(sheet = %sheet.name, method = method.label(), error = %e, "read method failed");
                    last_error = e;
                }
            }
        }

        if workbook.engine().supports_cell_walk() {
            cell_walk::walk(&sheet.name, &scan, shared, &self.limits)
        } else {
            Err(format!("failed to read with all methods: {}", last_error))
        }
    }
}

impl Default for SpreadsheetExtractor {
    fn default() -> Self {
        Self::new(SpreadsheetConfig::default())
    }
}
