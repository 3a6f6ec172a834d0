// Event timeline module
// Uniform (category, tick, time) timelines shared by every alignment modality

pub mod normalize;
pub mod types;

pub use normalize::{normalize, NormalizeError, RawObservation};
pub use types::{Alphabet, Category, Event, Timeline};
