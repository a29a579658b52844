//! Command implementations behind the `docchat` binary.
//!
//! Each `run_*` function loads what it needs, drives an
//! [`ApplicationSession`] or [`CorpusStore`], and prints results to stdout.
//! Diagnostics go to stderr.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::app::ApplicationSession;
use crate::config::Config;
use crate::corpus::{CorpusStore, IngestSummary};
use crate::extract::Extractor;
use crate::gateway::{AnalysisMode, CompletionGateway};
use crate::models::{DocumentFormat, UploadedDocument};
use crate::progress::ProgressMode;

/// Reads `paths` into uploads. Files with an unsupported suffix are reported
/// on stderr and skipped; unreadable files are an error.
pub fn read_documents(paths: &[PathBuf]) -> Result<Vec<UploadedDocument>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("not a file path: {}", path.display()))?;
        if DocumentFormat::from_filename(&filename).is_none() {
            eprintln!(
                "skipping {}: unsupported file type (expected .pdf, .docx, .xlsx or .txt)",
                path.display()
            );
            continue;
        }
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        match UploadedDocument::new(filename, bytes) {
            Ok(doc) => documents.push(doc),
            Err(e) => eprintln!("skipping {}: {}", path.display(), e),
        }
    }
    Ok(documents)
}

/// The processed-file listing: one block per record, oldest first.
pub fn format_listing(store: &CorpusStore) -> String {
    let mut out = String::new();
    if store.is_empty() {
        out.push_str("No documents processed.\n");
        return out;
    }
    let _ = writeln!(
        out,
        "{} document(s) with a total of {} characters",
        store.len(),
        store.total_chars()
    );
    for record in store.records() {
        let status = &record.result.status;
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{}. {} [{}] {} bytes, processed {}",
            record.display_index,
            record.name(),
            status.label(),
            record.result.byte_length,
            record.processed_at()
        );
        if let Some(reason) = status.reason() {
            let _ = writeln!(out, "   reason: {}", reason);
        }
        for line in record.preview().lines() {
            let _ = writeln!(out, "   {}", line);
        }
    }
    out
}

pub fn format_summary(summary: &IngestSummary) -> String {
    let mut parts = vec![format!("{} added", summary.added.len())];
    if !summary.skipped.is_empty() {
        parts.push(format!("{} already processed", summary.skipped.len()));
    }
    if !summary.partial.is_empty() {
        parts.push(format!("{} partially read", summary.partial.len()));
    }
    if !summary.failed.is_empty() {
        parts.push(format!("{} failed", summary.failed.len()));
    }
    parts.join(", ")
}

/// `docchat extract`: ingest files and print the listing, the corpus, or
/// the records as JSON.
pub fn run_extract(
    cfg: &Config,
    files: &[PathBuf],
    corpus: bool,
    json: bool,
    progress: Option<ProgressMode>,
) -> Result<()> {
    let documents = read_documents(files)?;
    if documents.is_empty() {
        bail!("no supported documents given");
    }

    let progress = progress.unwrap_or(if json {
        ProgressMode::Off
    } else {
        ProgressMode::default_for_tty()
    });
    let mut store = CorpusStore::new(Extractor::new(&cfg.spreadsheet));
    store.add_files_with_progress(documents, progress.reporter().as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(store.records())?);
    } else if corpus {
        print!("{}", store.corpus());
        if !store.corpus().ends_with('\n') {
            println!();
        }
    } else {
        print!("{}", format_listing(&store));
    }
    Ok(())
}

/// `docchat ask`: one question about the given files.
pub async fn run_ask(cfg: &Config, files: &[PathBuf], query: &str, mode: &str) -> Result<()> {
    let mut app = open_session(cfg, files)?;
    app.set_mode(AnalysisMode::from_label(mode));

    let outcome = app.ask(query).await?;
    println!("{}", outcome.reply);
    if let Some(e) = outcome.failure {
        bail!("analysis did not complete: {}", short_reason(&e.to_string()));
    }
    Ok(())
}

/// Builds a session with a live gateway and the given files ingested.
pub fn open_session(cfg: &Config, files: &[PathBuf]) -> Result<ApplicationSession> {
    let gateway = CompletionGateway::from_config(&cfg.gateway)?;
    let mut app = ApplicationSession::new(cfg, Box::new(gateway));
    if !files.is_empty() {
        let documents = read_documents(files)?;
        let summary = app.ingest(documents, ProgressMode::default_for_tty().reporter().as_ref());
        eprintln!("{}", format_summary(&summary));
    }
    Ok(app)
}

pub fn run_modes() {
    for mode in AnalysisMode::ALL {
        let marker = if mode == AnalysisMode::default() {
            " (default)"
        } else {
            ""
        };
        println!("{}{}", mode.label(), marker);
    }
}

fn short_reason(message: &str) -> &str {
    message.split(". ").next().unwrap_or(message)
}
