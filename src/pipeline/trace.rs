// Pipeline progress tracing
// Append-only JSONL record of stage starts and completions

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pipeline stages that report progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Align,
    Warp,
    Correspondence,
    Velocity,
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Started,
    Completed,

    /// Completed from a cached artifact
    Cached,
    Failed,
}

/// One line of the trace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,

    pub stage: Stage,
    pub status: StageStatus,
    pub message: String,

    /// Stage-specific counts and timings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(stage: Stage, status: StageStatus, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            stage,
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries to a JSONL file, creating it on first write
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Trace sink that does nothing when no trace file was requested
pub struct Tracer {
    writer: Option<TraceWriter>,
}

impl Tracer {
    pub fn new(path: Option<PathBuf>) -> Self {
        Tracer {
            writer: path.map(TraceWriter::new),
        }
    }

    pub fn disabled() -> Self {
        Tracer { writer: None }
    }

    pub fn record(&self, entry: TraceEntry) -> Result<(), TraceError> {
        match &self.writer {
            Some(writer) => writer.write(&entry),
            None => Ok(()),
        }
    }

    pub fn started(&self, stage: Stage, message: impl Into<String>) -> Result<(), TraceError> {
        self.record(TraceEntry::new(stage, StageStatus::Started, message))
    }

    pub fn completed(
        &self,
        stage: Stage,
        cached: bool,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<(), TraceError> {
        let status = if cached {
            StageStatus::Cached
        } else {
            StageStatus::Completed
        };
        self.record(TraceEntry::new(stage, status, message).with_data(data))
    }

    pub fn failed(&self, stage: Stage, message: impl Into<String>) -> Result<(), TraceError> {
        self.record(TraceEntry::new(stage, StageStatus::Failed, message))
    }
}

/// Read every entry of a trace file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}
