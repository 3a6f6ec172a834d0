// Correspondence construction
// Walks an alignment or warp path and records matched reference/target times

use thiserror::Error;

use super::types::{Correspondence, MatchSummary, TimePair};
use crate::align::{Alignment, Side, WarpPath};
use crate::events::{Category, Event, Timeline};

#[derive(Debug, Error, PartialEq)]
pub enum CorrespondenceError {
    #[error("alignment is inconsistent with its source timelines at position {position}: {reason}")]
    AlignmentConsistency { position: usize, reason: String },

    #[error("{name} must be positive and finite, got {value}")]
    InvalidScale { name: &'static str, value: f64 },
}

fn inconsistency(position: usize, reason: String) -> CorrespondenceError {
    CorrespondenceError::AlignmentConsistency { position, reason }
}

/// Build a correspondence from a discrete alignment
///
/// Cursors into the two timelines advance only on non-gap symbols. Any
/// disagreement between the aligned symbols and the events under the
/// cursors means the alignment was not computed from these timelines and
/// aborts the pass.
pub fn from_alignment(
    alignment: &Alignment,
    reference: &Timeline,
    target: &Timeline,
) -> Result<(Correspondence, MatchSummary), CorrespondenceError> {
    if alignment.reference.len() != alignment.target.len() {
        return Err(inconsistency(
            0,
            format!(
                "aligned sequences differ in length ({} vs {})",
                alignment.reference.len(),
                alignment.target.len()
            ),
        ));
    }

    let mut correspondence = Correspondence::new();
    let mut summary = MatchSummary::default();
    let mut ref_cursor = 0usize;
    let mut target_cursor = 0usize;

    for (position, (ref_symbol, target_symbol)) in alignment.pairs().enumerate() {
        match (ref_symbol, target_symbol) {
            (Some(ref_category), Some(target_category)) => {
                let ref_event = event_at(reference, ref_cursor, ref_category, position, Side::Reference)?;
                let target_event =
                    event_at(target, target_cursor, target_category, position, Side::Target)?;

                if ref_category != target_category {
                    return Err(inconsistency(
                        position,
                        format!(
                            "matched categories differ (reference {}, target {})",
                            ref_category, target_category
                        ),
                    ));
                }

                correspondence.record(
                    ref_event.tick,
                    TimePair::new(ref_event.time, target_event.time),
                );
                summary.matched += 1;
                ref_cursor += 1;
                target_cursor += 1;
            }
            (Some(ref_category), None) => {
                let event = event_at(reference, ref_cursor, ref_category, position, Side::Reference)?;
                log::debug!(
                    "Unmatched reference event: category {} at tick {} ({:.4}s)",
                    event.category,
                    event.tick,
                    event.time
                );
                summary.unmatched_reference += 1;
                ref_cursor += 1;
            }
            (None, Some(target_category)) => {
                let event = event_at(target, target_cursor, target_category, position, Side::Target)?;
                log::debug!(
                    "Unmatched target event: category {} at tick {} ({:.4}s)",
                    event.category,
                    event.tick,
                    event.time
                );
                summary.unmatched_target += 1;
                target_cursor += 1;
            }
            (None, None) => {
                return Err(inconsistency(position, "gap on both sides".to_string()));
            }
        }
    }

    if ref_cursor != reference.len() || target_cursor != target.len() {
        return Err(inconsistency(
            alignment.len(),
            format!(
                "alignment consumed {}/{} reference and {}/{} target events",
                ref_cursor,
                reference.len(),
                target_cursor,
                target.len()
            ),
        ));
    }

    log::info!(
        "Correspondence: {} matched pairs over {} ticks; {} reference and {} target events unmatched",
        summary.matched,
        correspondence.len(),
        summary.unmatched_reference,
        summary.unmatched_target
    );

    Ok((correspondence, summary))
}

/// Event under a cursor, checked against the aligned symbol
fn event_at(
    timeline: &Timeline,
    cursor: usize,
    symbol: Category,
    position: usize,
    side: Side,
) -> Result<Event, CorrespondenceError> {
    let event = timeline.events.get(cursor).copied().ok_or_else(|| {
        inconsistency(
            position,
            format!("{} cursor {} runs past {} events", side, cursor, timeline.len()),
        )
    })?;

    if event.category != symbol {
        return Err(inconsistency(
            position,
            format!(
                "{} symbol {} does not match event {} category {}",
                side, symbol, cursor, event.category
            ),
        ));
    }

    Ok(event)
}

/// Build a correspondence from a warp path
///
/// A step is recorded only when both indices differ from the previous step
/// (the walk starts from (0, 0)); steps that hold either index are treated
/// as redundant. The reference tick is the reference time scaled by
/// `ticks_per_second` and truncated.
pub fn from_warp_path(
    path: &WarpPath,
    reference_bin_duration: f64,
    target_bin_duration: f64,
    ticks_per_second: f64,
) -> Result<(Correspondence, MatchSummary), CorrespondenceError> {
    check_scale("reference bin duration", reference_bin_duration)?;
    check_scale("target bin duration", target_bin_duration)?;
    check_scale("ticks per second", ticks_per_second)?;

    let mut correspondence = Correspondence::new();
    let mut summary = MatchSummary::default();
    let mut last = (0usize, 0usize);

    let times = path.times(reference_bin_duration, target_bin_duration);
    for (&(ref_index, target_index), &(reference_time, target_time)) in path.steps.iter().zip(&times) {
        if ref_index != last.0 && target_index != last.1 {
            let tick = (reference_time * ticks_per_second).floor() as u64;
            correspondence.record(tick, TimePair::new(reference_time, target_time));
            summary.matched += 1;
        } else {
            summary.skipped_steps += 1;
        }

        last = (ref_index, target_index);
    }

    log::info!(
        "Correspondence: {} warp steps recorded over {} ticks, {} redundant steps skipped",
        summary.matched,
        correspondence.len(),
        summary.skipped_steps
    );

    Ok((correspondence, summary))
}

fn check_scale(name: &'static str, value: f64) -> Result<(), CorrespondenceError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CorrespondenceError::InvalidScale { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align_timelines;
    use crate::events::{normalize, Alphabet, RawObservation};

    const GAP: Category = u16::MAX;

    fn timeline(label: &str, events: &[(Category, u64, f64)]) -> Timeline {
        let raw = events
            .iter()
            .map(|&(c, tick, time)| RawObservation::new(c, tick, time))
            .collect();
        normalize(raw, Alphabet::PITCH_CLASS, label).unwrap()
    }

    #[test]
    fn test_missing_target_event_is_orphaned() {
        let reference = timeline("ref", &[(0, 0, 0.0), (1, 100, 1.0), (2, 200, 2.0)]);
        let target = timeline("tgt", &[(0, 0, 0.0), (2, 50, 1.5)]);

        let alignment = align_timelines(&reference, &target).unwrap();
        let (c, summary) = from_alignment(&alignment, &reference, &target).unwrap();

        assert_eq!(c.ticks().collect::<Vec<_>>(), vec![0, 200]);
        assert_eq!(c.first_at(200), Some(TimePair::new(2.0, 1.5)));
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.unmatched_reference, 1);
        assert_eq!(summary.unmatched_target, 0);
    }

    #[test]
    fn test_chord_events_share_a_tick() {
        let reference = timeline("ref", &[(0, 0, 0.0), (4, 0, 0.0), (7, 480, 0.5)]);
        let target = timeline("tgt", &[(0, 0, 0.1), (4, 0, 0.1), (7, 10, 0.6)]);

        let alignment = align_timelines(&reference, &target).unwrap();
        let (c, _) = from_alignment(&alignment, &reference, &target).unwrap();

        assert_eq!(c.get(0).map(|p| p.len()), Some(2));
        assert_eq!(c.first_at(480), Some(TimePair::new(0.5, 0.6)));

        let ticks: Vec<u64> = c.ticks().collect();
        assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_symbol_not_matching_event_is_fatal() {
        let reference = timeline("ref", &[(0, 0, 0.0), (1, 100, 1.0)]);
        let target = timeline("tgt", &[(0, 0, 0.0), (1, 100, 1.0)]);
        let alignment = Alignment {
            gap: GAP,
            reference: vec![0, 2],
            target: vec![0, 2],
        };

        let result = from_alignment(&alignment, &reference, &target);
        assert!(matches!(
            result,
            Err(CorrespondenceError::AlignmentConsistency { position: 1, .. })
        ));
    }

    #[test]
    fn test_differing_matched_categories_are_fatal() {
        let reference = timeline("ref", &[(3, 0, 0.0)]);
        let target = timeline("tgt", &[(5, 0, 0.0)]);
        let alignment = Alignment {
            gap: GAP,
            reference: vec![3],
            target: vec![5],
        };

        assert!(matches!(
            from_alignment(&alignment, &reference, &target),
            Err(CorrespondenceError::AlignmentConsistency { position: 0, .. })
        ));
    }

    #[test]
    fn test_alignment_overrunning_timeline_is_fatal() {
        let reference = timeline("ref", &[(0, 0, 0.0)]);
        let target = timeline("tgt", &[(0, 0, 0.0)]);
        let alignment = Alignment {
            gap: GAP,
            reference: vec![0, 0],
            target: vec![0, GAP],
        };

        assert!(matches!(
            from_alignment(&alignment, &reference, &target),
            Err(CorrespondenceError::AlignmentConsistency { position: 1, .. })
        ));
    }

    #[test]
    fn test_alignment_not_consuming_timeline_is_fatal() {
        let reference = timeline("ref", &[(0, 0, 0.0), (1, 10, 0.1)]);
        let target = timeline("tgt", &[(0, 0, 0.0)]);
        let alignment = Alignment {
            gap: GAP,
            reference: vec![0],
            target: vec![0],
        };

        assert!(matches!(
            from_alignment(&alignment, &reference, &target),
            Err(CorrespondenceError::AlignmentConsistency { .. })
        ));
    }

    #[test]
    fn test_warp_path_skips_steps_holding_an_index() {
        let path = WarpPath {
            steps: vec![(0, 0), (1, 1), (1, 2), (2, 3), (3, 3), (4, 4)],
            cost: 0.0,
        };

        let (c, summary) = from_warp_path(&path, 0.5, 0.25, 10.0).unwrap();

        // (0,0) holds both, (1,2) holds the reference, (3,3) holds the target
        assert_eq!(summary.matched, 3);
        assert_eq!(summary.skipped_steps, 3);
        assert_eq!(c.ticks().collect::<Vec<_>>(), vec![5, 10, 20]);
        assert_eq!(c.first_at(10), Some(TimePair::new(1.0, 0.75)));
        assert_eq!(c.first_at(20), Some(TimePair::new(2.0, 1.0)));
    }

    #[test]
    fn test_warp_ticks_truncate_and_can_collide() {
        let path = WarpPath {
            steps: vec![(0, 0), (1, 1), (2, 2)],
            cost: 0.0,
        };

        // 0.1s bins at 4 ticks/s: 0.4 -> 0, 0.8 -> 0
        let (c, _) = from_warp_path(&path, 0.1, 0.1, 4.0).unwrap();

        assert_eq!(c.len(), 1);
        assert_eq!(c.get(0).map(|p| p.len()), Some(2));
        assert!((c.first_at(0).unwrap().reference_time - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_warp_scale_validation() {
        let path = WarpPath {
            steps: vec![(0, 0)],
            cost: 0.0,
        };
        assert!(matches!(
            from_warp_path(&path, 0.1, 0.1, 0.0),
            Err(CorrespondenceError::InvalidScale { name: "ticks per second", .. })
        ));
    }
}
