//! The ingested-document store.
//!
//! [`CorpusStore`] owns the ordered [`ProcessedFileRecord`]s and the combined
//! corpus derived from them. The corpus and its [`ProvenanceIndex`] are never
//! patched: every mutation rebuilds both from the records, so each
//! [`Span`] always addresses the current corpus string.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::info;

use crate::extract::Extractor;
use crate::models::{ExtractionStatus, ProcessedFileRecord, UploadedDocument};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, SilentProgress};

/// Byte range of one document's text inside the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

pub type ProvenanceIndex = BTreeMap<String, Span>;

/// What one `add_files` call did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub added: Vec<String>,
    /// Filenames already present (or repeated in the batch); not re-extracted.
    pub skipped: Vec<String>,
    pub partial: Vec<String>,
    pub failed: Vec<String>,
}

pub struct CorpusStore {
    extractor: Extractor,
    records: Vec<ProcessedFileRecord>,
    corpus: String,
    provenance: ProvenanceIndex,
}

impl CorpusStore {
    pub fn new(extractor: Extractor) -> Self {
        Self {
            extractor,
            records: Vec::new(),
            corpus: String::new(),
            provenance: ProvenanceIndex::new(),
        }
    }

    pub fn add_files(&mut self, documents: impl IntoIterator<Item = UploadedDocument>) -> IngestSummary {
        self.add_files_with_progress(documents, &SilentProgress)
    }

    /// Extracts each not-yet-seen document in order and appends its record.
    ///
    /// Deduplication is by filename only: a re-upload under a known name is
    /// skipped even when its bytes differ.
    pub fn add_files_with_progress(
        &mut self,
        documents: impl IntoIterator<Item = UploadedDocument>,
        reporter: &dyn IngestProgressReporter,
    ) -> IngestSummary {
        let mut seen: HashSet<String> = self.records.iter().map(|r| r.name().to_string()).collect();
        let mut summary = IngestSummary::default();

        let mut fresh = Vec::new();
        for doc in documents {
            if seen.insert(doc.filename().to_string()) {
                fresh.push(doc);
            } else {
                reporter.report(IngestProgressEvent::Skipped {
                    name: doc.filename().to_string(),
                });
                summary.skipped.push(doc.filename().to_string());
            }
        }

        let total = fresh.len() as u64;
        for (i, doc) in fresh.iter().enumerate() {
            reporter.report(IngestProgressEvent::Extracting {
                name: doc.filename().to_string(),
                n: i as u64 + 1,
                total,
            });

            let result = self.extractor.extract(doc);
            reporter.report(IngestProgressEvent::Finished {
                name: result.source_name.clone(),
                status: result.status.clone(),
                bytes: result.byte_length as u64,
            });

            match &result.status {
                ExtractionStatus::Ok => {}
                ExtractionStatus::PartialFailure(_) => summary.partial.push(result.source_name.clone()),
                ExtractionStatus::Failure(_) => summary.failed.push(result.source_name.clone()),
            }
            summary.added.push(result.source_name.clone());

            let display_index = self.records.len() + 1;
            self.records.push(ProcessedFileRecord {
                result,
                display_index,
            });
        }

        if !summary.added.is_empty() {
            self.rebuild();
        }
        info!(
            added = summary.added.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            records = self.records.len(),
            "ingested documents"
        );
        summary
    }

    /// Recomputes the corpus and provenance index from the records.
    pub fn rebuild(&mut self) -> (&str, &ProvenanceIndex) {
        let (corpus, provenance) = build_corpus(&self.records);
        self.corpus = corpus;
        self.provenance = provenance;
        (&self.corpus, &self.provenance)
    }

    /// Drops every record together with the corpus and index.
    pub fn clear(&mut self) {
        self.records = Vec::new();
        self.corpus = String::new();
        self.provenance = ProvenanceIndex::new();
        info!("cleared all documents");
    }

    pub fn records(&self) -> &[ProcessedFileRecord] {
        &self.records
    }

    pub fn corpus(&self) -> &str {
        &self.corpus
    }

    pub fn provenance(&self) -> &ProvenanceIndex {
        &self.provenance
    }

    pub fn span(&self, name: &str) -> Option<Span> {
        self.provenance.get(name).copied()
    }

    /// The slice of the corpus holding `name`'s text.
    pub fn source_text(&self, name: &str) -> Option<&str> {
        let span = self.span(name)?;
        self.corpus.get(span.start..span.end)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn total_chars(&self) -> usize {
        self.corpus.chars().count()
    }
}

impl Default for CorpusStore {
    fn default() -> Self {
        Self::new(Extractor::default())
    }
}

/// Concatenates records in order, each behind a `--- DOCUMENT n: name ---`
/// header, recording where each text lands.
pub fn build_corpus(records: &[ProcessedFileRecord]) -> (String, ProvenanceIndex) {
    let mut corpus = String::with_capacity(records.iter().map(|r| r.text().len() + 64).sum());
    let mut provenance = ProvenanceIndex::new();
    for (idx, record) in records.iter().enumerate() {
        corpus.push_str(&format!("\n--- DOCUMENT {}: {} ---\n", idx + 1, record.name()));
        let start = corpus.len();
        corpus.push_str(record.text());
        provenance.insert(
            record.name().to_string(),
            Span {
                start,
                end: corpus.len(),
            },
        );
    }
    (corpus, provenance)
}
