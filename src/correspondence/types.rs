// Correspondence types
// Tick-keyed mapping of matched reference/target times

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One matched observation: the same musical moment in both recordings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePair {
    /// Seconds into the reference recording
    pub reference_time: f64,

    /// Seconds into the target recording
    pub target_time: f64,
}

impl TimePair {
    pub fn new(reference_time: f64, target_time: f64) -> Self {
        TimePair {
            reference_time,
            target_time,
        }
    }
}

/// Mapping from reference tick to the matched time pairs seen at that tick
///
/// Pairs sharing a tick keep their arrival order. The map is filled by the
/// builder in one pass and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    entries: BTreeMap<u64, Vec<TimePair>>,
}

impl Correspondence {
    pub(crate) fn new() -> Self {
        Correspondence::default()
    }

    pub(crate) fn record(&mut self, tick: u64, pair: TimePair) {
        self.entries.entry(tick).or_default().push(pair);
    }

    /// Number of distinct reference ticks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of recorded pairs across all ticks
    pub fn observation_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// All pairs recorded at a tick, in arrival order
    pub fn get(&self, tick: u64) -> Option<&[TimePair]> {
        self.entries.get(&tick).map(Vec::as_slice)
    }

    /// The pair downstream stages use for a tick
    pub fn first_at(&self, tick: u64) -> Option<TimePair> {
        self.entries.get(&tick).and_then(|pairs| pairs.first().copied())
    }

    /// Ticks in increasing order
    pub fn ticks(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    /// (tick, pairs) in increasing tick order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[TimePair])> + '_ {
        self.entries.iter().map(|(&tick, pairs)| (tick, pairs.as_slice()))
    }

    /// (tick, first pair) in increasing tick order
    pub fn first_pairs(&self) -> impl Iterator<Item = (u64, TimePair)> + '_ {
        self.entries
            .iter()
            .filter_map(|(&tick, pairs)| pairs.first().map(|&p| (tick, p)))
    }
}

/// Bookkeeping from one correspondence pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Pairs recorded in the correspondence
    pub matched: usize,

    /// Reference events left without a counterpart
    pub unmatched_reference: usize,

    /// Target events left without a counterpart
    pub unmatched_target: usize,

    /// Warp steps dropped because one index did not advance
    pub skipped_steps: usize,
}
