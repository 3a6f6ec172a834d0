// Event normalization
// Turns adapter observations into a validated, (tick, category)-ordered timeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Alphabet, Category, Event, Timeline};

/// Errors raised while normalizing or validating a timeline
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("gap sentinel {gap} collides with the category alphabet 0..{size}")]
    AlphabetCollision { gap: Category, size: u16 },

    #[error("category {category} at observation {index} is outside the alphabet 0..{size}")]
    CategoryOutOfRange {
        index: usize,
        category: Category,
        size: u16,
    },

    #[error("observation {index} has invalid time {time}")]
    InvalidTime { index: usize, time: f64 },

    #[error("timeline is not monotone at event {index} (tick {tick}, time {time}s)")]
    NonMonotoneTimeline { index: usize, tick: u64, time: f64 },
}

/// A raw observation as produced by a timing or feature adapter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub category: Category,
    pub tick: u64,
    pub time: f64,
}

impl RawObservation {
    pub fn new(category: Category, tick: u64, time: f64) -> Self {
        RawObservation {
            category,
            tick,
            time,
        }
    }
}

/// Normalize raw observations into a timeline
///
/// Observations are stably sorted by (tick, category). Sorting never
/// repairs time order: if time decreases once ticks are ordered, the
/// adapter's tempo model is broken and the timeline is rejected.
pub fn normalize(
    raw: Vec<RawObservation>,
    alphabet: Alphabet,
    label: impl Into<String>,
) -> Result<Timeline, NormalizeError> {
    if alphabet.gap_collides() {
        return Err(NormalizeError::AlphabetCollision {
            gap: alphabet.gap,
            size: alphabet.size,
        });
    }

    for (index, obs) in raw.iter().enumerate() {
        if !alphabet.contains(obs.category) {
            return Err(NormalizeError::CategoryOutOfRange {
                index,
                category: obs.category,
                size: alphabet.size,
            });
        }
        if !obs.time.is_finite() || obs.time < 0.0 {
            return Err(NormalizeError::InvalidTime {
                index,
                time: obs.time,
            });
        }
    }

    let mut events: Vec<Event> = raw
        .into_iter()
        .map(|obs| Event::new(obs.category, obs.tick, obs.time))
        .collect();
    events.sort_by_key(|e| e.order_key());

    let timeline = Timeline {
        label: label.into(),
        alphabet,
        events,
    };
    timeline.validate()?;

    log::debug!(
        "Normalized {} events for {} (alphabet size {})",
        timeline.len(),
        timeline.label,
        alphabet.size
    );

    Ok(timeline)
}
