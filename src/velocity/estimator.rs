// Velocity estimation
// Samples speed ratios from a correspondence, smooths them and fits a trend

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::kalman::{smooth, FilterConfig, FilterState};
use super::regression::{describe, fit_line, LinearFit, SeriesStats};
use crate::correspondence::Correspondence;

/// Reference ticks between samples when none is configured
pub const DEFAULT_SAMPLE_INTERVAL: u64 = 3600;

#[derive(Debug, Error, PartialEq)]
pub enum VelocityError {
    #[error("not enough velocity samples: found {found}, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("sample positions have zero variance, cannot fit a trend")]
    DegenerateFit,

    #[error("{positions} sample positions for {values} values")]
    LengthMismatch { positions: usize, values: usize },
}

/// Sampling and unit parameters for velocity estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Minimum reference ticks between two samples; `None` uses the
    /// modality default (or `DEFAULT_SAMPLE_INTERVAL` outside a pipeline)
    pub sample_interval: Option<u64>,

    /// Reference ticks per distance unit (3600 ticks per foot of roll)
    pub ticks_per_distance_unit: f64,

    /// Seconds per time unit of the reported speeds (60 for per minute)
    pub time_unit_seconds: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        VelocityConfig {
            sample_interval: None,
            ticks_per_distance_unit: 3600.0,
            time_unit_seconds: 60.0,
        }
    }
}

impl VelocityConfig {
    pub fn effective_interval(&self) -> u64 {
        self.sample_interval.unwrap_or(DEFAULT_SAMPLE_INTERVAL)
    }
}

/// One observed speed of the target against the reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocitySample {
    /// Reference tick the sample was taken at
    pub tick: u64,

    pub reference_time: f64,
    pub target_time: f64,

    /// Target time in time units; the x coordinate of the trend fit
    pub elapsed: f64,

    /// Distance per time unit in the target since the previous sample
    pub instantaneous_speed_ratio: f64,

    /// Distance per time unit in the target since the start
    pub cumulative_speed_ratio: f64,

    /// Distance per time unit in the reference since the previous sample
    pub reference_speed: f64,
}

/// Everything derived from one correspondence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityProfile {
    pub samples: Vec<VelocitySample>,

    /// Filtered instantaneous speeds, one per sample
    pub smoothed: Vec<f64>,

    /// Filter state after each sample
    pub filter_history: Vec<FilterState>,

    /// Trend of the raw instantaneous speeds
    pub raw_fit: LinearFit,

    /// Trend of the smoothed speeds
    pub smoothed_fit: LinearFit,

    /// Statistics of the raw instantaneous speeds
    pub stats: SeriesStats,
}

impl VelocityProfile {
    /// Change in target speed per time unit, from the smoothed trend
    pub fn acceleration(&self) -> f64 {
        self.smoothed_fit.slope
    }
}

/// Walk the correspondence in tick order and emit speed samples
///
/// A tick is considered once it is at least `sample_interval` past the last
/// considered tick. It yields a sample only when both recordings moved
/// forward in time since then; the markers advance either way.
pub fn sample_velocities(correspondence: &Correspondence, config: &VelocityConfig) -> Vec<VelocitySample> {
    let interval = config.effective_interval();
    let per_unit = config.ticks_per_distance_unit;
    let time_unit = config.time_unit_seconds;

    let mut samples = Vec::new();
    let mut last_tick = 0u64;
    let mut last_reference_time = 0.0;
    let mut last_target_time = 0.0;
    let mut last_unit = 0u64;

    for (tick, pair) in correspondence.first_pairs() {
        if tick - last_tick < interval {
            continue;
        }

        let distance = tick as f64 / per_unit;
        let distance_delta = (tick - last_tick) as f64 / per_unit;
        let reference_delta = pair.reference_time - last_reference_time;
        let target_delta = pair.target_time - last_target_time;

        if reference_delta > 0.0 && target_delta > 0.0 {
            let sample = VelocitySample {
                tick,
                reference_time: pair.reference_time,
                target_time: pair.target_time,
                elapsed: pair.target_time / time_unit,
                instantaneous_speed_ratio: distance_delta / target_delta * time_unit,
                cumulative_speed_ratio: distance / pair.target_time * time_unit,
                reference_speed: distance_delta / reference_delta * time_unit,
            };

            let unit = distance as u64;
            if last_unit < unit {
                log::info!(
                    "{:.4} units ({} ticks): reference at {:.4}s, target at {:.4}s",
                    distance,
                    tick,
                    pair.reference_time,
                    pair.target_time
                );
                log::info!(
                    "Delta {:.4} units: reference recent {:.4}, overall {:.4}; target recent {:.4}, overall {:.4}",
                    distance_delta,
                    sample.reference_speed,
                    distance / pair.reference_time * time_unit,
                    sample.instantaneous_speed_ratio,
                    sample.cumulative_speed_ratio
                );
            }

            samples.push(sample);
        } else {
            log::debug!(
                "Skipping tick {}: elapsed reference {:.4}s, target {:.4}s",
                tick,
                reference_delta,
                target_delta
            );
        }

        last_tick = tick;
        last_reference_time = pair.reference_time;
        last_target_time = pair.target_time;
        last_unit = distance as u64;
    }

    samples
}

/// Sample, smooth and fit the target's speed over the correspondence
pub fn estimate(
    correspondence: &Correspondence,
    config: &VelocityConfig,
    filter: &FilterConfig,
) -> Result<VelocityProfile, VelocityError> {
    log::info!(
        "Estimating velocity over {} ticks, sample interval {}",
        correspondence.len(),
        config.effective_interval()
    );

    let samples = sample_velocities(correspondence, config);
    if samples.len() < 2 {
        return Err(VelocityError::InsufficientData {
            found: samples.len(),
            required: 2,
        });
    }

    let xs: Vec<f64> = samples.iter().map(|s| s.elapsed).collect();
    let raw: Vec<f64> = samples.iter().map(|s| s.instantaneous_speed_ratio).collect();

    let (smoothed, filter_history) = smooth(&xs, &raw, filter)?;
    let raw_fit = fit_line(&xs, &raw)?;
    let smoothed_fit = fit_line(&xs, &smoothed)?;
    let stats = describe(&raw).ok_or(VelocityError::InsufficientData {
        found: 0,
        required: 2,
    })?;

    log::info!(
        "Raw speed: slope {:.4}, intercept {:.4}, r² {:.4}",
        raw_fit.slope,
        raw_fit.intercept,
        raw_fit.r_squared
    );
    log::info!(
        "Smoothed speed: slope {:.4}, intercept {:.4}, r² {:.4}",
        smoothed_fit.slope,
        smoothed_fit.intercept,
        smoothed_fit.r_squared
    );
    log::info!(
        "Speed over {} samples: median {:.4}, mean {:.4}, trimmed mean {:.4}, std dev {:.4}",
        stats.count,
        stats.median,
        stats.mean,
        stats.trimmed_mean,
        stats.std_dev
    );

    Ok(VelocityProfile {
        samples,
        smoothed,
        filter_history,
        raw_fit,
        smoothed_fit,
        stats,
    })
}
