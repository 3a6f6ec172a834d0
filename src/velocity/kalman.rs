// Constant-velocity Kalman filter
// Smooths a noisy speed series with a two-state (position, velocity) model

use nalgebra::{Matrix2, RowVector2, Vector2};
use serde::{Deserialize, Serialize};

use super::estimator::VelocityError;

/// How the transition step between two samples is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStep {
    /// One unit per sample, regardless of spacing
    PerSample,

    /// Elapsed x between consecutive samples
    Elapsed,
}

/// Noise parameters for the speed filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Variance of the white-noise process model
    pub process_variance: f64,

    /// Time step used to discretize the process noise
    pub process_dt: f64,

    /// Variance of each speed measurement
    pub measurement_variance: f64,

    /// Initial state covariance (scaled identity)
    pub initial_covariance: f64,

    /// Transition step between samples
    pub step: FilterStep,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            process_variance: 0.1,
            process_dt: 0.1,
            measurement_variance: 5.0,
            initial_covariance: 1000.0,
            step: FilterStep::PerSample,
        }
    }
}

/// Snapshot of the filter after one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// Smoothed speed
    pub position: f64,

    /// Rate of change of the smoothed speed
    pub velocity: f64,

    /// State covariance, row-major
    pub covariance: [[f64; 2]; 2],
}

/// Two-state filter over a measured speed
///
/// The measured speed is the first state component; the second is its
/// rate of change. Transition is `[[1, dt], [0, 1]]`, measurement `[1, 0]`.
pub struct SpeedFilter {
    x: Vector2<f64>,
    p: Matrix2<f64>,
    q: Matrix2<f64>,
    r: f64,
}

impl SpeedFilter {
    /// Start at `initial` speed with zero rate of change
    pub fn new(initial: f64, config: &FilterConfig) -> Self {
        SpeedFilter {
            x: Vector2::new(initial, 0.0),
            p: Matrix2::identity() * config.initial_covariance,
            q: white_noise(config.process_dt, config.process_variance),
            r: config.measurement_variance,
        }
    }

    pub fn predict(&mut self, dt: f64) {
        let f = Matrix2::new(1.0, dt, 0.0, 1.0);
        self.x = f * self.x;
        self.p = f * self.p * f.transpose() + self.q;
    }

    pub fn update(&mut self, measurement: f64) {
        let h = RowVector2::new(1.0, 0.0);
        let residual = measurement - (h * self.x)[(0, 0)];
        let s = (h * self.p * h.transpose())[(0, 0)] + self.r;
        let k = self.p * h.transpose() / s;

        self.x += k * residual;

        // Joseph form keeps P symmetric positive semi-definite
        let i_kh = Matrix2::identity() - k * h;
        self.p = i_kh * self.p * i_kh.transpose() + k * self.r * k.transpose();
    }

    pub fn state(&self) -> FilterState {
        FilterState {
            position: self.x[0],
            velocity: self.x[1],
            covariance: [
                [self.p[(0, 0)], self.p[(0, 1)]],
                [self.p[(1, 0)], self.p[(1, 1)]],
            ],
        }
    }
}

/// Discrete white-noise process covariance for a two-state model
fn white_noise(dt: f64, variance: f64) -> Matrix2<f64> {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let dt4 = dt3 * dt;
    Matrix2::new(dt4 / 4.0, dt3 / 2.0, dt3 / 2.0, dt2) * variance
}

/// Smooth `values` sampled at `xs`
///
/// The first value seeds the filter and is returned unchanged; every later
/// value goes through predict and update. Returns the smoothed series and
/// the filter state after each sample. `xs` and `values` must have the
/// same length.
pub fn smooth(
    xs: &[f64],
    values: &[f64],
    config: &FilterConfig,
) -> Result<(Vec<f64>, Vec<FilterState>), VelocityError> {
    if xs.len() != values.len() {
        return Err(VelocityError::LengthMismatch {
            positions: xs.len(),
            values: values.len(),
        });
    }

    let Some(&first) = values.first() else {
        return Ok((Vec::new(), Vec::new()));
    };

    let mut filter = SpeedFilter::new(first, config);
    let mut smoothed = Vec::with_capacity(values.len());
    let mut history = Vec::with_capacity(values.len());
    smoothed.push(first);
    history.push(filter.state());

    for i in 1..values.len() {
        let dt = match config.step {
            FilterStep::PerSample => 1.0,
            FilterStep::Elapsed => xs[i] - xs[i - 1],
        };

        filter.predict(dt);
        filter.update(values[i]);

        let state = filter.state();
        log::debug!(
            "Filter at x={:.4}: measured {:.4}, smoothed {:.4}, rate {:.4}",
            xs[i],
            values[i],
            state.position,
            state.velocity
        );
        smoothed.push(state.position);
        history.push(state);
    }

    Ok((smoothed, history))
}
