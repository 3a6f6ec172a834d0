// Alignment module
// Discrete (sequence) and continuous (time-warp) alignment of two recordings

pub mod error;
pub mod sequence;
pub mod warp;

pub use error::{AlignError, Side};
pub use sequence::{align_sequences, align_timelines, Alignment};
pub use warp::{warp, FeatureMatrix, WarpPath};
