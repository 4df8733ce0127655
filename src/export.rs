//! Durable CSV mirror of the interaction history.
//!
//! The history itself lives in memory; this writer keeps an append-only
//! CSV copy on disk so already-processed interactions survive a restart.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::history::InteractionRecord;

/// Header row written once when the file is created or found empty.
pub const CSV_HEADER: [&str; 4] = ["Transcription", "Sentiment", "Tone", "Feedback"];

/// Append-only CSV writer, one row per interaction record.
///
/// The file and any missing parent directories are created on the first
/// append rather than at startup, so a run that never produces a record
/// leaves no artifact behind.
pub struct CsvExporter {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, opening the file (and writing the header) on
    /// first use. Every row is flushed immediately.
    pub fn append(&mut self, record: &InteractionRecord) -> Result<()> {
        if self.writer.is_none() {
            self.writer = Some(open_csv_writer(&self.path)?);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer
                .write_record([
                    &record.transcript,
                    &record.sentiment,
                    &record.tone,
                    &record.feedback,
                ])
                .with_context(|| {
                    format!("Failed to append record {} to {}", record.sequence, self.path.display())
                })?;
            writer
                .flush()
                .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        }
        Ok(())
    }
}

fn open_csv_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create data directory {}", parent.display())
            })?;
        }
    }

    // A previous run may have left a populated file behind; only a new
    // or empty file gets the header row.
    let needs_header = match fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open transcription log {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);

    if needs_header {
        writer
            .write_record(CSV_HEADER)
            .context("Failed to write transcription log header")?;
        writer
            .flush()
            .context("Failed to write transcription log header")?;
        info!("Created transcription log at {}", path.display());
    }

    Ok(writer)
}
