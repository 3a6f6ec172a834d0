// Event timeline types
// Defines categories, alphabets, events, and the ordered timelines built from them

use serde::{Deserialize, Serialize};

use super::normalize::NormalizeError;

/// Small-integer event category (MIDI note number or pitch class)
pub type Category = u16;

/// Bounded category alphabet with an explicit gap sentinel
///
/// Valid categories lie in `0..size`. The gap sentinel marks unmatched
/// positions in an alignment and must never be a valid category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alphabet {
    /// Number of valid categories
    pub size: u16,

    /// Value used as the alignment gap marker
    pub gap: Category,
}

impl Alphabet {
    /// MIDI note numbers 0-127
    pub const MIDI_NOTE: Alphabet = Alphabet {
        size: 128,
        gap: u16::MAX,
    };

    /// Pitch classes 0-11 (C = 0)
    pub const PITCH_CLASS: Alphabet = Alphabet {
        size: 12,
        gap: u16::MAX,
    };

    /// True if `category` is a valid, non-gap member of this alphabet
    pub fn contains(&self, category: Category) -> bool {
        category < self.size && category != self.gap
    }

    /// True if the gap sentinel falls inside the valid range
    pub fn gap_collides(&self) -> bool {
        self.gap < self.size
    }
}

/// A single timed observation on one timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Category of the observation (note number or pitch class)
    pub category: Category,

    /// Native integer time unit of the timeline
    pub tick: u64,

    /// Seconds from the start of the recording
    pub time: f64,
}

impl Event {
    pub fn new(category: Category, tick: u64, time: f64) -> Self {
        Event {
            category,
            tick,
            time,
        }
    }

    /// Sort key: tick first, then category
    pub fn order_key(&self) -> (u64, Category) {
        (self.tick, self.category)
    }
}

/// An ordered sequence of events for one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Source identity (file name, adapter tag) used in logs and cache keys
    pub label: String,

    /// Alphabet every event category belongs to
    pub alphabet: Alphabet,

    /// Events ordered by (tick, category)
    pub events: Vec<Event>,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Category sequence in timeline order, the input of discrete alignment
    pub fn categories(&self) -> Vec<Category> {
        self.events.iter().map(|e| e.category).collect()
    }

    /// Re-check the ordering and alphabet invariants
    ///
    /// Timelines built by the normalizer always pass; this guards timelines
    /// reloaded from disk or assembled by hand.
    pub fn validate(&self) -> Result<(), NormalizeError> {
        if self.alphabet.gap_collides() {
            return Err(NormalizeError::AlphabetCollision {
                gap: self.alphabet.gap,
                size: self.alphabet.size,
            });
        }

        for (index, event) in self.events.iter().enumerate() {
            if !self.alphabet.contains(event.category) {
                return Err(NormalizeError::CategoryOutOfRange {
                    index,
                    category: event.category,
                    size: self.alphabet.size,
                });
            }
            if !event.time.is_finite() || event.time < 0.0 {
                return Err(NormalizeError::InvalidTime {
                    index,
                    time: event.time,
                });
            }
        }

        for (index, pair) in self.events.windows(2).enumerate() {
            if pair[1].tick < pair[0].tick || pair[1].time < pair[0].time {
                return Err(NormalizeError::NonMonotoneTimeline {
                    index: index + 1,
                    tick: pair[1].tick,
                    time: pair[1].time,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(events: Vec<Event>) -> Timeline {
        Timeline {
            label: "test".to_string(),
            alphabet: Alphabet::MIDI_NOTE,
            events,
        }
    }

    #[test]
    fn test_alphabet_presets_do_not_collide() {
        assert!(!Alphabet::MIDI_NOTE.gap_collides());
        assert!(!Alphabet::PITCH_CLASS.gap_collides());
        assert!(Alphabet::PITCH_CLASS.contains(11));
        assert!(!Alphabet::PITCH_CLASS.contains(12));
    }

    #[test]
    fn test_validate_accepts_ordered_timeline() {
        let t = timeline(vec![
            Event::new(60, 0, 0.0),
            Event::new(64, 0, 0.0),
            Event::new(67, 480, 0.5),
        ]);
        assert!(t.validate().is_ok());
        assert_eq!(t.categories(), vec![60, 64, 67]);
    }

    #[test]
    fn test_validate_rejects_time_going_backwards() {
        let t = timeline(vec![Event::new(60, 0, 1.0), Event::new(62, 10, 0.5)]);
        assert!(matches!(
            t.validate(),
            Err(NormalizeError::NonMonotoneTimeline { index: 1, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_alphabet_category() {
        let mut t = timeline(vec![Event::new(3, 0, 0.0)]);
        t.alphabet = Alphabet { size: 2, gap: 99 };
        assert!(matches!(
            t.validate(),
            Err(NormalizeError::CategoryOutOfRange { category: 3, .. })
        ));
    }
}
