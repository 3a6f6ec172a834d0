// Velocity module
// Speed sampling, Kalman smoothing and trend fitting over a correspondence

pub mod estimator;
pub mod kalman;
pub mod regression;

pub use estimator::{
    estimate, sample_velocities, VelocityConfig, VelocityError, VelocityProfile, VelocitySample,
    DEFAULT_SAMPLE_INTERVAL,
};
pub use kalman::{smooth, FilterConfig, FilterState, FilterStep, SpeedFilter};
pub use regression::{describe, fit_line, LinearFit, SeriesStats};
