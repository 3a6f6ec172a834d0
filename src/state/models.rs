// Data models for the run registry
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One comparison of a reference and a target recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,

    /// Caller-chosen identifier, e.g. a roll number plus a tag
    pub label: String,
    pub modality: String,
    pub reference_path: String,
    pub reference_sha256: String,
    pub target_path: String,
    pub target_sha256: String,
    pub pipeline_version: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "processing" => Some(RunStatus::Processing),
            "complete" => Some(RunStatus::Complete),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// A derived file recorded against a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub kind: ArtifactKind,

    /// Content key the artifact was computed under
    pub cache_key: String,
    pub path: String,
    pub sha256: String,
    pub bytes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Alignment,
    WarpPath,
    Correspondence,
    Report,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Alignment => "alignment",
            ArtifactKind::WarpPath => "warp_path",
            ArtifactKind::Correspondence => "correspondence",
            ArtifactKind::Report => "report",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "alignment" => Some(ArtifactKind::Alignment),
            "warp_path" => Some(ArtifactKind::WarpPath),
            "correspondence" => Some(ArtifactKind::Correspondence),
            "report" => Some(ArtifactKind::Report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWithArtifacts {
    pub run: Run,
    pub artifacts: Vec<Artifact>,
}
