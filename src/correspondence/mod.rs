// Correspondence module
// Converts alignments and warp paths into a tick-keyed time correspondence

pub mod builder;
pub mod types;

pub use builder::{from_alignment, from_warp_path, CorrespondenceError};
pub use types::{Correspondence, MatchSummary, TimePair};
