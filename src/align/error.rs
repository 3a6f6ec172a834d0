// Alignment errors shared by the discrete and continuous aligners

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{Alphabet, Category};

/// Which of the two recordings an input or error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Reference,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Reference => write!(f, "reference"),
            Side::Target => write!(f, "target"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AlignError {
    #[error("gap sentinel {gap} occurs as a category in the {side} sequence at position {position}")]
    InputEncoding {
        side: Side,
        position: usize,
        gap: Category,
    },

    #[error("timelines use different alphabets ({reference:?} vs {target:?})")]
    AlphabetMismatch {
        reference: Alphabet,
        target: Alphabet,
    },

    #[error("{side} feature matrix has no time bins")]
    EmptyFeatures { side: Side },

    #[error("feature matrices have different channel counts ({reference} vs {target})")]
    ChannelMismatch { reference: usize, target: usize },

    #[error("bin duration must be positive and finite, got {0}")]
    InvalidBinDuration(f64),

    #[error("feature matrix contains a non-finite value at channel {channel}, bin {bin}")]
    NonFiniteFeature { channel: usize, bin: usize },
}
