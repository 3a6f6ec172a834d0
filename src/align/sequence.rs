// Discrete sequence alignment
// Global alignment of two category sequences with gaps (Needleman-Wunsch)

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::error::{AlignError, Side};
use crate::events::{Category, Timeline};

/// Two equal-length aligned sequences over {category, gap}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    /// Sentinel marking an unmatched position
    pub gap: Category,

    /// Aligned reference sequence
    pub reference: Vec<Category>,

    /// Aligned target sequence
    pub target: Vec<Category>,
}

impl Alignment {
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    /// Aligned positions as optional symbols (None = gap)
    pub fn pairs(&self) -> impl Iterator<Item = (Option<Category>, Option<Category>)> + '_ {
        let gap = self.gap;
        let symbol = move |c: Category| if c == gap { None } else { Some(c) };
        self.reference
            .iter()
            .zip(self.target.iter())
            .map(move |(&r, &t)| (symbol(r), symbol(t)))
    }

    /// Positions where both sides carry a category
    pub fn matched(&self) -> usize {
        self.pairs()
            .filter(|(r, t)| r.is_some() && t.is_some())
            .count()
    }

    /// Reference events with no counterpart in the target
    pub fn unmatched_reference(&self) -> usize {
        self.pairs()
            .filter(|(r, t)| r.is_some() && t.is_none())
            .count()
    }

    /// Target events with no counterpart in the reference
    pub fn unmatched_target(&self) -> usize {
        self.pairs()
            .filter(|(r, t)| r.is_none() && t.is_some())
            .count()
    }

    /// Equal side lengths and no position gapped on both sides
    pub fn is_well_formed(&self) -> bool {
        self.reference.len() == self.target.len()
            && self.pairs().all(|(r, t)| r.is_some() || t.is_some())
    }
}

/// Align two timelines over their shared alphabet
pub fn align_timelines(reference: &Timeline, target: &Timeline) -> Result<Alignment, AlignError> {
    if reference.alphabet != target.alphabet {
        return Err(AlignError::AlphabetMismatch {
            reference: reference.alphabet,
            target: target.alphabet,
        });
    }

    log::info!(
        "Aligning {} reference events ({}) with {} target events ({})",
        reference.len(),
        reference.label,
        target.len(),
        target.label
    );

    let alignment = align_sequences(
        &reference.categories(),
        &target.categories(),
        reference.alphabet.gap,
    )?;

    log::info!(
        "Alignment: {} matched, {} unmatched in reference, {} unmatched in target",
        alignment.matched(),
        alignment.unmatched_reference(),
        alignment.unmatched_target()
    );

    Ok(alignment)
}

/// Globally align two category sequences
///
/// Scoring: match = 1, gap = 0. A mismatch would also score 0, the same as
/// a pair of gaps, so the diagonal is only offered for equal categories and
/// the alignment never pairs two different categories.
///
/// Backtracking prefers, in order: diagonal match, gap in the reference
/// (consumes a target symbol), gap in the target (consumes a reference
/// symbol). The result is fully determined by the inputs.
pub fn align_sequences(
    reference: &[Category],
    target: &[Category],
    gap: Category,
) -> Result<Alignment, AlignError> {
    check_encoding(reference, gap, Side::Reference)?;
    check_encoding(target, gap, Side::Target)?;

    let score = score_matrix(reference, target);
    let (aligned_reference, aligned_target) = trace_back(&score, reference, target, gap);

    Ok(Alignment {
        gap,
        reference: aligned_reference,
        target: aligned_target,
    })
}

/// Refuse inputs where the gap sentinel is already a category value
fn check_encoding(sequence: &[Category], gap: Category, side: Side) -> Result<(), AlignError> {
    match sequence.iter().position(|&c| c == gap) {
        Some(position) => Err(AlignError::InputEncoding {
            side,
            position,
            gap,
        }),
        None => Ok(()),
    }
}

/// Fill the (m+1) x (n+1) best-score matrix
fn score_matrix(reference: &[Category], target: &[Category]) -> Array2<u32> {
    let m = reference.len();
    let n = target.len();
    let mut score = Array2::<u32>::zeros((m + 1, n + 1));

    for i in 1..=m {
        for j in 1..=n {
            let mut best = score[[i - 1, j]].max(score[[i, j - 1]]);
            if reference[i - 1] == target[j - 1] {
                best = best.max(score[[i - 1, j - 1]] + 1);
            }
            score[[i, j]] = best;
        }
    }

    score
}

fn trace_back(
    score: &Array2<u32>,
    reference: &[Category],
    target: &[Category],
    gap: Category,
) -> (Vec<Category>, Vec<Category>) {
    let mut i = reference.len();
    let mut j = target.len();
    let mut aligned_reference = Vec::with_capacity(i + j);
    let mut aligned_target = Vec::with_capacity(i + j);

    while i > 0 || j > 0 {
        let current = score[[i, j]];

        if i > 0
            && j > 0
            && reference[i - 1] == target[j - 1]
            && score[[i - 1, j - 1]] + 1 == current
        {
            aligned_reference.push(reference[i - 1]);
            aligned_target.push(target[j - 1]);
            i -= 1;
            j -= 1;
        } else if j > 0 && score[[i, j - 1]] == current {
            aligned_reference.push(gap);
            aligned_target.push(target[j - 1]);
            j -= 1;
        } else {
            // Only the step up can reproduce the score here, so i > 0
            aligned_reference.push(reference[i - 1]);
            aligned_target.push(gap);
            i -= 1;
        }
    }

    aligned_reference.reverse();
    aligned_target.reverse();
    (aligned_reference, aligned_target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{normalize, Alphabet, RawObservation};

    const GAP: Category = u16::MAX;
    const A: Category = 0;
    const B: Category = 1;
    const C: Category = 2;

    #[test]
    fn test_missing_middle_symbol() {
        let alignment = align_sequences(&[A, B, C], &[A, C], GAP).unwrap();

        assert_eq!(alignment.reference, vec![A, B, C]);
        assert_eq!(alignment.target, vec![A, GAP, C]);
        assert_eq!(alignment.matched(), 2);
        assert_eq!(alignment.unmatched_reference(), 1);
        assert_eq!(alignment.unmatched_target(), 0);
    }

    #[test]
    fn test_extra_symbol_in_target() {
        let alignment = align_sequences(&[A, C], &[A, B, C], GAP).unwrap();

        assert_eq!(alignment.reference, vec![A, GAP, C]);
        assert_eq!(alignment.target, vec![A, B, C]);
        assert_eq!(alignment.unmatched_target(), 1);
    }

    #[test]
    fn test_never_pairs_different_categories() {
        let alignment = align_sequences(&[A, B], &[A, C], GAP).unwrap();

        assert!(alignment.is_well_formed());
        for (r, t) in alignment.pairs() {
            if let (Some(r), Some(t)) = (r, t) {
                assert_eq!(r, t);
            }
        }
        assert_eq!(alignment.matched(), 1);
        assert_eq!(alignment.len(), 3);
    }

    #[test]
    fn test_reordered_symbols_keep_length_invariant() {
        let reference = [A, B, C, A, B, C, C, A];
        let target = [B, A, C, C, B, A, A];
        let alignment = align_sequences(&reference, &target, GAP).unwrap();

        assert!(alignment.is_well_formed());
        assert_eq!(alignment.reference.len(), alignment.target.len());

        let ref_symbols: Vec<_> = alignment.reference.iter().copied().filter(|&c| c != GAP).collect();
        let tgt_symbols: Vec<_> = alignment.target.iter().copied().filter(|&c| c != GAP).collect();
        assert_eq!(ref_symbols, reference.to_vec());
        assert_eq!(tgt_symbols, target.to_vec());
    }

    #[test]
    fn test_empty_inputs() {
        let alignment = align_sequences(&[], &[A, B], GAP).unwrap();
        assert_eq!(alignment.reference, vec![GAP, GAP]);
        assert_eq!(alignment.target, vec![A, B]);

        let alignment = align_sequences(&[], &[], GAP).unwrap();
        assert!(alignment.is_empty());
    }

    #[test]
    fn test_gap_sentinel_in_input_is_refused() {
        let result = align_sequences(&[A, GAP], &[A], GAP);
        assert_eq!(
            result,
            Err(AlignError::InputEncoding {
                side: Side::Reference,
                position: 1,
                gap: GAP,
            })
        );

        let result = align_sequences(&[A], &[GAP], GAP);
        assert!(matches!(
            result,
            Err(AlignError::InputEncoding { side: Side::Target, .. })
        ));
    }

    #[test]
    fn test_alignment_is_idempotent() {
        let reference = [3, 5, 7, 5, 3, 1, 8, 8, 2];
        let target = [3, 7, 5, 3, 9, 1, 8, 2, 2];

        let first = align_sequences(&reference, &target, GAP).unwrap();
        let second = align_sequences(&reference, &target, GAP).unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn test_alphabet_mismatch_between_timelines() {
        let reference = normalize(vec![RawObservation::new(1, 0, 0.0)], Alphabet::MIDI_NOTE, "r").unwrap();
        let target = normalize(vec![RawObservation::new(1, 0, 0.0)], Alphabet::PITCH_CLASS, "t").unwrap();

        assert!(matches!(
            align_timelines(&reference, &target),
            Err(AlignError::AlphabetMismatch { .. })
        ));
    }
}
