//!
//! Closed enumerations of single-mark features and chromatin states
//!
//! The position of a variant in `Feature::ALL` / `State::ALL` is its row
//! (resp. column) offset everywhere in the crate. Both tables are constant;
//! the name lookup maps are built once and never mutated.
//!
use crate::error::{Error, Result};
use fnv::FnvHashMap;
use once_cell::sync::Lazy;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::str::FromStr;

///
/// Single-mark assay
///
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub enum Feature {
    Atac,
    H3k27ac,
    H3k27me3,
    H3k4me1,
    H3k4me3,
    H3k9me3,
    Rna,
    RnaLow,
    Control,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Feature::Atac,
        Feature::H3k27ac,
        Feature::H3k27me3,
        Feature::H3k4me1,
        Feature::H3k4me3,
        Feature::H3k9me3,
        Feature::Rna,
        Feature::RnaLow,
        Feature::Control,
    ];
    const NAMES: [&'static str; 9] = [
        "atac", "h3k27ac", "h3k27me3", "h3k4me1", "h3k4me3", "h3k9me3", "rna", "rna-low",
        "control",
    ];
    ///
    /// Features whose absence is tolerated; a flat track replaces them.
    ///
    const OPTIONAL: [bool; 9] = [false, false, false, false, false, true, false, true, true];

    pub fn index(self) -> usize {
        self as usize
    }
    pub fn name(self) -> &'static str {
        Self::NAMES[self.index()]
    }
    pub fn is_optional(self) -> bool {
        Self::OPTIONAL[self.index()]
    }
    ///
    /// offset of the peak-probability row of this mark in a PositionMatrix.
    /// The no-peak row follows at `row() + 1`.
    ///
    pub fn row(self) -> usize {
        2 * self.index()
    }
}

///
/// Multi-mark chromatin state
///
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub enum State {
    /// active promoter
    PA,
    /// active enhancer
    EA,
    /// bivalent region
    BI,
    /// primed enhancer
    PR,
    /// transcribed
    TR,
    /// low transcription
    TL,
    /// H3K27me3 repressed
    R1,
    /// H3K9me3 repressed
    R2,
    /// control signal (artifact)
    CL,
    /// no signal
    NS,
}

impl State {
    pub const ALL: [State; 10] = [
        State::PA,
        State::EA,
        State::BI,
        State::PR,
        State::TR,
        State::TL,
        State::R1,
        State::R2,
        State::CL,
        State::NS,
    ];
    const NAMES: [&'static str; 10] = ["PA", "EA", "BI", "PR", "TR", "TL", "R1", "R2", "CL", "NS"];

    pub fn index(self) -> usize {
        self as usize
    }
    pub fn name(self) -> &'static str {
        Self::NAMES[self.index()]
    }
    /// canonical state that receives the whole mass of degenerate loci
    pub fn fallback() -> State {
        State::NS
    }
}

static FEATURE_BY_NAME: Lazy<FnvHashMap<&'static str, Feature>> = Lazy::new(|| {
    Feature::ALL
        .iter()
        .map(|&feature| (feature.name(), feature))
        .collect()
});

static STATE_BY_NAME: Lazy<FnvHashMap<&'static str, State>> = Lazy::new(|| {
    State::ALL
        .iter()
        .map(|&state| (state.name(), state))
        .collect()
});

impl FromStr for Feature {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        FEATURE_BY_NAME
            .get(s.to_lowercase().as_str())
            .copied()
            .ok_or_else(|| Error::UnknownName {
                kind: "feature",
                name: s.to_string(),
            })
    }
}

impl FromStr for State {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        STATE_BY_NAME
            .get(s.to_uppercase().as_str())
            .copied()
            .ok_or_else(|| Error::UnknownName {
                kind: "state",
                name: s.to_string(),
            })
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

///
/// Parse a list of names from the command line.
/// An empty list selects every variant.
///
pub fn parse_features(names: &[String]) -> Result<Vec<Feature>> {
    if names.is_empty() {
        Ok(Feature::ALL.to_vec())
    } else {
        names.iter().map(|name| name.parse()).collect()
    }
}

/// `parse_features` for states
pub fn parse_states(names: &[String]) -> Result<Vec<State>> {
    if names.is_empty() {
        Ok(State::ALL.to_vec())
    } else {
        names.iter().map(|name| name.parse()).collect()
    }
}
