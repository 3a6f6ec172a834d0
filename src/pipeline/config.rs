// Pipeline configuration
// Every tunable of a comparison run, loadable from a JSON file

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::ChromaConfig;
use crate::velocity::{FilterConfig, VelocityConfig};

/// Reference ticks per second of audio when the reference has no ticks of its own
pub const DEFAULT_REFERENCE_TICKS_PER_SECOND: f64 = 433.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Label the run is registered under; derived from the reference file
    /// name when absent
    pub run_id: Option<String>,

    /// Replaces every MIDI tempo event (microseconds per beat)
    pub tempo_override: Option<u32>,

    /// Replaces the MIDI files' ticks per beat
    pub ticks_per_beat_override: Option<u16>,

    /// Tick rate assigned to an audio reference
    pub reference_ticks_per_second: f64,

    pub chroma: ChromaConfig,
    pub velocity: VelocityConfig,
    pub filter: FilterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            run_id: None,
            tempo_override: None,
            ticks_per_beat_override: None,
            reference_ticks_per_second: DEFAULT_REFERENCE_TICKS_PER_SECOND,
            chroma: ChromaConfig::default(),
            velocity: VelocityConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: PipelineConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: display, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no stage can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)))
            }
        };

        positive("reference_ticks_per_second", self.reference_ticks_per_second)?;
        positive("velocity.ticks_per_distance_unit", self.velocity.ticks_per_distance_unit)?;
        positive("velocity.time_unit_seconds", self.velocity.time_unit_seconds)?;
        positive("filter.measurement_variance", self.filter.measurement_variance)?;
        positive("filter.initial_covariance", self.filter.initial_covariance)?;

        if self.filter.process_variance < 0.0 || !self.filter.process_variance.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "filter.process_variance must be non-negative, got {}",
                self.filter.process_variance
            )));
        }
        if self.chroma.n_fft < 2 || self.chroma.hop_length == 0 {
            return Err(ConfigError::Invalid(format!(
                "chroma n_fft {} / hop_length {} out of range",
                self.chroma.n_fft, self.chroma.hop_length
            )));
        }
        if self.ticks_per_beat_override == Some(0) || self.tempo_override == Some(0) {
            return Err(ConfigError::Invalid("MIDI overrides must be positive".to_string()));
        }

        Ok(())
    }
}
