//! Storage traits and error types
//!
//! This module defines the trait interface for feed sinks and the associated
//! error type.

use crate::feed::ProductRecord;
use crate::storage::RunContext;
use thiserror::Error;

/// Errors that can occur while persisting a feed
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported storage: {0}")]
    Unsupported(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// How a sink wants to receive records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// All records at once after the crawl
    Batch,
    /// One record at a time as soon as it is parsed and merged
    Streaming,
}

impl StorageMode {
    /// Parses the CLI name of a mode (`file` or `stream`)
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "file" => Some(Self::Batch),
            "stream" => Some(Self::Streaming),
            _ => None,
        }
    }
}

/// Destination of finished records
pub trait StorageSink: Send {
    fn mode(&self) -> StorageMode;

    /// Persists a record set
    ///
    /// Batch sinks receive the whole feed once; streaming sinks receive one
    /// record per call. An empty set writes nothing.
    fn save_feed(&mut self, run: &RunContext, records: &[ProductRecord]) -> StorageResult<()>;

    /// Flushes and releases resources; called once, even after errors
    fn shutdown(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
