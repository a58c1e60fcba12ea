//! Streaming sink: one product row per line

use crate::feed::ProductRecord;
use crate::storage::{product_rows, RunContext, StorageMode, StorageResult, StorageSink};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends each saved record as a JSON line, the way a message queue
/// consumer would receive them
#[derive(Debug)]
pub struct JsonLinesStorage {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl JsonLinesStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far
    pub fn written(&self) -> usize {
        self.written
    }

    fn writer(&mut self) -> StorageResult<&mut BufWriter<File>> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                BufWriter::new(file)
            }
        };
        Ok(self.writer.insert(writer))
    }
}

impl StorageSink for JsonLinesStorage {
    fn mode(&self) -> StorageMode {
        StorageMode::Streaming
    }

    fn save_feed(&mut self, run: &RunContext, records: &[ProductRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let rows = product_rows(run, records)?;
        let writer = self.writer()?;
        for row in &rows {
            serde_json::to_writer(&mut *writer, row)?;
            writer.write_all(b"\n")?;
        }
        self.written += rows.len();
        tracing::debug!("Streamed {} rows to {}", rows.len(), self.path.display());
        Ok(())
    }

    fn shutdown(&mut self) -> StorageResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        tracing::info!("Streamed {} rows in total", self.written);
        Ok(())
    }
}
