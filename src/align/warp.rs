// Continuous time-warp alignment
// Dynamic time warping between two fixed-rate feature matrices

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use super::error::{AlignError, Side};

/// Multi-channel features sampled at a fixed time step
///
/// Shape is `channels x bins`; each column covers `bin_duration` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    values: Array2<f32>,
    bin_duration: f64,
}

impl FeatureMatrix {
    /// Wrap a `channels x bins` array, validating the time step and values
    pub fn new(values: Array2<f32>, bin_duration: f64) -> Result<Self, AlignError> {
        if !bin_duration.is_finite() || bin_duration <= 0.0 {
            return Err(AlignError::InvalidBinDuration(bin_duration));
        }

        if let Some(((channel, bin), _)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(AlignError::NonFiniteFeature { channel, bin });
        }

        Ok(FeatureMatrix {
            values,
            bin_duration,
        })
    }

    pub fn channels(&self) -> usize {
        self.values.nrows()
    }

    pub fn total_bins(&self) -> usize {
        self.values.ncols()
    }

    pub fn bin_duration(&self) -> f64 {
        self.bin_duration
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Feature vector of one time bin
    pub fn column(&self, bin: usize) -> ArrayView1<'_, f32> {
        self.values.column(bin)
    }

    /// Start time of a bin in seconds
    pub fn bin_time(&self, bin: usize) -> f64 {
        bin as f64 * self.bin_duration
    }
}

/// Monotone path of matched (reference_bin, target_bin) pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpPath {
    /// Index pairs in forward order, from (0, 0) to (m-1, n-1)
    pub steps: Vec<(usize, usize)>,

    /// Accumulated cost at the final cell
    pub cost: f64,
}

impl WarpPath {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every step advances one or both indices by exactly one
    pub fn is_monotone(&self) -> bool {
        self.steps.windows(2).all(|w| {
            let di = w[1].0.checked_sub(w[0].0);
            let dj = w[1].1.checked_sub(w[0].1);
            matches!((di, dj), (Some(0), Some(1)) | (Some(1), Some(0)) | (Some(1), Some(1)))
        })
    }

    /// Convert index pairs to (reference_seconds, target_seconds)
    pub fn times(&self, reference_bin_duration: f64, target_bin_duration: f64) -> Vec<(f64, f64)> {
        self.steps
            .iter()
            .map(|&(i, j)| (i as f64 * reference_bin_duration, j as f64 * target_bin_duration))
            .collect()
    }
}

/// Align two feature matrices with dynamic time warping
///
/// Local cost is the Euclidean distance between columns; allowed steps are
/// (+1,+1), (+1,0) and (0,+1). Time and memory are O(m*n).
pub fn warp(reference: &FeatureMatrix, target: &FeatureMatrix) -> Result<WarpPath, AlignError> {
    if reference.total_bins() == 0 {
        return Err(AlignError::EmptyFeatures {
            side: Side::Reference,
        });
    }
    if target.total_bins() == 0 {
        return Err(AlignError::EmptyFeatures { side: Side::Target });
    }
    if reference.channels() != target.channels() {
        return Err(AlignError::ChannelMismatch {
            reference: reference.channels(),
            target: target.channels(),
        });
    }

    log::info!(
        "Running time warp over {} x {} bins ({} channels)",
        reference.total_bins(),
        target.total_bins(),
        reference.channels()
    );

    let cost = accumulated_cost(reference, target);
    let steps = trace_back(&cost);
    let total = cost[[reference.total_bins() - 1, target.total_bins() - 1]];

    log::info!("Warp path has {} steps, total cost {:.4}", steps.len(), total);

    Ok(WarpPath { steps, cost: total })
}

fn column_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn accumulated_cost(reference: &FeatureMatrix, target: &FeatureMatrix) -> Array2<f64> {
    let m = reference.total_bins();
    let n = target.total_bins();
    let mut d = Array2::from_elem((m, n), f64::INFINITY);

    for i in 0..m {
        let ref_column = reference.column(i);
        for j in 0..n {
            let local = column_distance(ref_column, target.column(j));

            let previous = if i == 0 && j == 0 {
                0.0
            } else {
                let mut best = f64::INFINITY;
                if i > 0 && j > 0 {
                    best = best.min(d[[i - 1, j - 1]]);
                }
                if i > 0 {
                    best = best.min(d[[i - 1, j]]);
                }
                if j > 0 {
                    best = best.min(d[[i, j - 1]]);
                }
                best
            };

            d[[i, j]] = local + previous;
        }
    }

    d
}

/// Walk back from the last cell; ties prefer diagonal, then reference step
fn trace_back(d: &Array2<f64>) -> Vec<(usize, usize)> {
    let (rows, cols) = d.dim();
    let mut i = rows - 1;
    let mut j = cols - 1;
    let mut path = Vec::with_capacity(rows + cols);
    path.push((i, j));

    while i > 0 || j > 0 {
        if i == 0 {
            j -= 1;
        } else if j == 0 {
            i -= 1;
        } else {
            let diag = d[[i - 1, j - 1]];
            let up = d[[i - 1, j]];
            let left = d[[i, j - 1]];

            if diag <= up && diag <= left {
                i -= 1;
                j -= 1;
            } else if up <= left {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        path.push((i, j));
    }

    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// One-hot pitch-class columns, one column per entry of `classes`
    fn one_hot(classes: &[usize], bin_duration: f64) -> FeatureMatrix {
        let mut values = Array2::<f32>::zeros((12, classes.len()));
        for (bin, &class) in classes.iter().enumerate() {
            values[[class, bin]] = 1.0;
        }
        FeatureMatrix::new(values, bin_duration).unwrap()
    }

    #[test]
    fn test_identical_matrices_give_diagonal_path() {
        let a = one_hot(&[0, 4, 7, 0], 0.1);
        let path = warp(&a, &a).unwrap();

        assert_eq!(path.steps, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
        assert_eq!(path.cost, 0.0);
    }

    #[test]
    fn test_five_by_seven_path_bounds() {
        let reference = one_hot(&[0, 2, 4, 5, 7], 0.1);
        let target = one_hot(&[0, 2, 4, 5, 7, 9, 11], 0.1);

        let path = warp(&reference, &target).unwrap();

        assert!(path.len() >= 7 && path.len() <= 11);
        assert!(path.is_monotone());
        assert_eq!(path.steps.first(), Some(&(0, 0)));
        assert_eq!(path.steps.last(), Some(&(4, 6)));
        // The shared prefix is matched one-to-one
        assert_eq!(&path.steps[..5], &[(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)]);
    }

    #[test]
    fn test_stretched_target_repeats_reference_bins() {
        let reference = one_hot(&[0, 4, 7], 0.1);
        let target = one_hot(&[0, 0, 4, 4, 7, 7], 0.05);

        let path = warp(&reference, &target).unwrap();

        assert!(path.is_monotone());
        assert_eq!(path.cost, 0.0);
        assert_eq!(path.len(), 6);
        for &(i, j) in &path.steps {
            assert_eq!(i, j / 2);
        }
    }

    #[test]
    fn test_times_use_each_bin_duration() {
        let path = WarpPath {
            steps: vec![(0, 0), (1, 2), (2, 4)],
            cost: 0.0,
        };
        let times = path.times(0.5, 0.25);
        assert_eq!(times, vec![(0.0, 0.0), (0.5, 0.5), (1.0, 1.0)]);
    }

    #[test]
    fn test_warp_is_idempotent() {
        let reference = one_hot(&[0, 3, 3, 7, 1, 9], 0.1);
        let target = one_hot(&[0, 3, 7, 7, 1, 1, 9, 2], 0.1);

        let first = warp(&reference, &target).unwrap();
        let second = warp(&reference, &target).unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn test_input_validation() {
        let empty = FeatureMatrix::new(Array2::zeros((12, 0)), 0.1).unwrap();
        let a = one_hot(&[0], 0.1);
        assert_eq!(
            warp(&empty, &a),
            Err(AlignError::EmptyFeatures { side: Side::Reference })
        );

        let narrow = FeatureMatrix::new(Array2::zeros((3, 2)), 0.1).unwrap();
        assert_eq!(
            warp(&a, &narrow),
            Err(AlignError::ChannelMismatch { reference: 12, target: 3 })
        );

        assert_eq!(
            FeatureMatrix::new(Array2::zeros((1, 1)), 0.0),
            Err(AlignError::InvalidBinDuration(0.0))
        );

        let mut values = Array2::<f32>::zeros((2, 2));
        values[[1, 0]] = f32::NAN;
        assert_eq!(
            FeatureMatrix::new(values, 0.1),
            Err(AlignError::NonFiniteFeature { channel: 1, bin: 0 })
        );
    }
}
