//! Per-format text extraction.
//!
//! [`Extractor::extract`] turns one [`UploadedDocument`] into an
//! [`ExtractionResult`]. Failures are returned as values with the underlying
//! parser message preserved; nothing here panics or aborts a batch.
//! Spreadsheets are delegated to [`crate::spreadsheet`].

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::config::SpreadsheetConfig;
use crate::models::{DocumentFormat, ExtractionResult, UploadedDocument};
use crate::spreadsheet::SpreadsheetExtractor;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
pub(crate) const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY_PART: &str = "word/document.xml";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("decode-error")]
    Decode,
    #[error("{0}")]
    Pdf(String),
    #[error("{0}")]
    Ooxml(String),
}

/// Dispatches uploads to the extractor for their format.
pub struct Extractor {
    spreadsheet: SpreadsheetExtractor,
}

impl Extractor {
    pub fn new(spreadsheet: &SpreadsheetConfig) -> Self {
        Self {
            spreadsheet: SpreadsheetExtractor::new(spreadsheet.clone()),
        }
    }

    pub fn extract(&self, doc: &UploadedDocument) -> ExtractionResult {
        let name = doc.filename();
        debug!(file = name, format = %doc.format(), bytes = doc.bytes().len(), "extracting");

        let text = match doc.format() {
            DocumentFormat::Xlsx => return self.spreadsheet.extract(doc.bytes(), name),
            DocumentFormat::Txt => extract_plain_text(doc.bytes()),
            DocumentFormat::Pdf => extract_pdf(doc.bytes()),
            DocumentFormat::Docx => extract_docx(doc.bytes()),
        };

        match text {
            Ok(text) => ExtractionResult::ok(name, text),
            Err(e) => {
                warn!(file = name, error = %e, "extraction failed");
                ExtractionResult::failure(name, e.to_string())
            }
        }
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&SpreadsheetConfig::default())
    }
}

pub fn extract_plain_text(bytes: &[u8]) -> Result<String, ExtractError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| ExtractError::Decode)
}

/// Text of every page, in page order.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("PDF parser panicked on malformed input".to_string())),
    }
}

pub(crate) fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Paragraph texts of a Word document, joined with single newlines.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let doc_xml = read_zip_entry_bounded(&mut archive, DOCX_BODY_PART, MAX_XML_ENTRY_BYTES)?;
    let paragraphs = docx_paragraphs(&doc_xml)?;
    Ok(paragraphs.join("\n"))
}

fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\t');
                    }
                }
                b"br" | b"cr" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                if let Some(p) = current.as_mut() {
                    p.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionStatus;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.start_file(DOCX_BODY_PART, zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn plain_text_is_decoded() {
        let doc = UploadedDocument::new("a.txt", "héllo\nworld".as_bytes().to_vec()).unwrap();
        let result = Extractor::default().extract(&doc);
        assert_eq!(result.status, ExtractionStatus::Ok);
        assert_eq!(result.text, "héllo\nworld");
        assert_eq!(result.byte_length, "héllo\nworld".len());
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let doc = UploadedDocument::new("bad.txt", vec![0x66, 0xff, 0xfe]).unwrap();
        let result = Extractor::default().extract(&doc);
        assert_eq!(
            result.status,
            ExtractionStatus::Failure("decode-error".to_string())
        );
    }

    #[test]
    fn invalid_pdf_is_reported_not_salvaged() {
        let doc = UploadedDocument::new("x.pdf", b"not a pdf".to_vec()).unwrap();
        let result = Extractor::default().extract(&doc);
        assert!(result.status.is_failure());
        assert!(result.text.starts_with("[Error processing x.pdf:"));
    }

    #[test]
    fn docx_paragraphs_are_joined_with_newlines() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>First </w:t></w:r><w:r><w:t>line</w:t></w:r></w:p>\
             <w:p/>\
             <w:p><w:r><w:t>Tab</w:t><w:tab/><w:t>bed &amp; done</w:t></w:r></w:p>",
        );
        let text = extract_docx(&bytes).unwrap();
        assert_eq!(text, "First line\n\nTab\tbed & done");
    }

    #[test]
    fn docx_that_is_not_a_zip_fails_with_message() {
        let doc = UploadedDocument::new("x.docx", b"not a zip".to_vec()).unwrap();
        let result = Extractor::default().extract(&doc);
        match result.status {
            ExtractionStatus::Failure(reason) => assert!(!reason.is_empty()),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn docx_without_body_part_fails() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.start_file("word/other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_docx(&buf).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn docx_with_broken_xml_fails() {
        let bytes = docx_with_body("<w:p><w:r><w:t>open</w:r></w:p>");
        assert!(matches!(extract_docx(&bytes), Err(ExtractError::Ooxml(_))));
    }
}
