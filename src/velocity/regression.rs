// Regression and summary statistics
// Ordinary least-squares line fit and robust descriptive statistics

use serde::{Deserialize, Serialize};

use super::estimator::VelocityError;

/// Least-squares line `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,

    /// Coefficient of determination; 1.0 for a constant series
    pub r_squared: f64,

    /// Number of points in the fit
    pub points: usize,
}

/// Fit a straight line through (xs, ys)
pub fn fit_line(xs: &[f64], ys: &[f64]) -> Result<LinearFit, VelocityError> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return Err(VelocityError::InsufficientData {
            found: n,
            required: 2,
        });
    }

    let xs = &xs[..n];
    let ys = &ys[..n];
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut ss_xx = 0.0;
    let mut ss_xy = 0.0;
    let mut ss_yy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        ss_xx += dx * dx;
        ss_xy += dx * dy;
        ss_yy += dy * dy;
    }

    if ss_xx <= f64::EPSILON * n as f64 {
        return Err(VelocityError::DegenerateFit);
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;
    let r_squared = if ss_yy == 0.0 {
        1.0
    } else {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_squared,
        points: n,
    })
}

/// Descriptive statistics of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,

    /// Mean after cutting a quarter of the values from each end
    pub trimmed_mean: f64,

    /// Sample standard deviation (n - 1); 0.0 for a single value
    pub std_dev: f64,
}

const TRIM_PROPORTION: f64 = 0.25;

/// Summarize a series, or `None` when it is empty
pub fn describe(values: &[f64]) -> Option<SeriesStats> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };

    let cut = (TRIM_PROPORTION * n as f64) as usize;
    let kept = &sorted[cut..n - cut];
    let trimmed_mean = kept.iter().sum::<f64>() / kept.len() as f64;

    let std_dev = if n > 1 {
        let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };

    Some(SeriesStats {
        count: n,
        min: sorted[0],
        max: sorted[n - 1],
        mean,
        median,
        trimmed_mean,
        std_dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];

        let fit = fit_line(&xs, &ys).unwrap();

        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert_eq!(fit.points, 4);
    }

    #[test]
    fn test_flat_series_has_zero_slope() {
        let fit = fit_line(&[0.0, 1.0, 2.0], &[5.0, 5.0, 5.0]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 5.0);
        assert_eq!(fit.r_squared, 1.0);
    }

    #[test]
    fn test_fit_needs_two_points() {
        assert_eq!(
            fit_line(&[1.0], &[2.0]),
            Err(VelocityError::InsufficientData {
                found: 1,
                required: 2
            })
        );
    }

    #[test]
    fn test_constant_x_is_degenerate() {
        assert_eq!(
            fit_line(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(VelocityError::DegenerateFit)
        );
    }

    #[test]
    fn test_describe_odd_series() {
        let stats = describe(&[4.0, 1.0, 3.0, 2.0, 100.0]).unwrap();

        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 100.0);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.mean, 22.0);
        // Cuts one value from each end: [2, 3, 4]
        assert_eq!(stats.trimmed_mean, 3.0);
    }

    #[test]
    fn test_describe_even_series_and_std_dev() {
        let stats = describe(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();

        assert_eq!(stats.median, 4.5);
        assert_eq!(stats.mean, 5.0);
        // Cuts two from each end: [4, 4, 5, 5]
        assert_eq!(stats.trimmed_mean, 4.5);
        assert!((stats.std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_describe_single_and_empty() {
        let stats = describe(&[7.5]).unwrap();
        assert_eq!(stats.median, 7.5);
        assert_eq!(stats.trimmed_mean, 7.5);
        assert_eq!(stats.std_dev, 0.0);

        assert!(describe(&[]).is_none());
    }
}
