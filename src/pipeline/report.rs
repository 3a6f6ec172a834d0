// Comparison report
// JSON export of the correspondence, velocity samples, filter history and fits

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correspondence::{Correspondence, MatchSummary};
use crate::state::calculate_sha256;
use crate::velocity::VelocityProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub label: String,
    pub generated_at: DateTime<Utc>,
    pub modality: String,
    pub reference: String,
    pub target: String,

    /// Reference ticks between velocity samples
    pub sample_interval: u64,

    pub summary: MatchSummary,
    pub correspondence: Correspondence,

    /// Absent when too few samples could be taken
    pub velocity: Option<VelocityProfile>,

    /// Why `velocity` is absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_skipped: Option<String>,
}

impl Report {
    /// One-line description for terminals and logs
    pub fn headline(&self) -> String {
        match &self.velocity {
            Some(v) => format!(
                "{}: {} matches, speed {:.3} -> trend slope {:.4} per time unit (r² {:.3}), median {:.3}",
                self.label,
                self.summary.matched,
                v.smoothed_fit.intercept,
                v.acceleration(),
                v.smoothed_fit.r_squared,
                v.stats.median
            ),
            None => format!(
                "{}: {} matches, no velocity estimate ({})",
                self.label,
                self.summary.matched,
                self.velocity_skipped.as_deref().unwrap_or("unknown reason")
            ),
        }
    }
}

/// Write a report as pretty JSON, returning its path and SHA-256
pub fn write_report(report: &Report, path: &Path) -> Result<(PathBuf, String), std::io::Error> {
    let bytes = serde_json::to_vec_pretty(report)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, &bytes)?;
    log::info!("Wrote report to {}", path.display());
    Ok((path.to_path_buf(), calculate_sha256(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        Report {
            run_id: Uuid::new_v4(),
            label: "roll".to_string(),
            generated_at: Utc::now(),
            modality: "symbolic".to_string(),
            reference: "a.mid".to_string(),
            target: "b.mid".to_string(),
            sample_interval: 3600,
            summary: MatchSummary::default(),
            correspondence: Correspondence::default(),
            velocity: None,
            velocity_skipped: Some("not enough velocity samples".to_string()),
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");

        let (written, sha) = write_report(&report(), &path).unwrap();

        let bytes = std::fs::read(&written).unwrap();
        assert_eq!(calculate_sha256(&bytes), sha);
        let back: Report = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.label, "roll");
        assert!(back.velocity.is_none());
    }

    #[test]
    fn test_headline_names_skip_reason() {
        assert!(report().headline().contains("not enough velocity samples"));
    }
}
