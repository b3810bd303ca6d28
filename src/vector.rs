//! Distance primitives for track comparison.
//!
//! Everything the selector scores with lives here: Euclidean/Manhattan
//! distance between timbre vectors, circular distance between musical keys
//! on the circle of fifths, and scalar loudness distance.

use anyhow::{bail, Result};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Distance formula used when comparing timbre vectors.
///
/// Resolved once from the settings file; an unknown formula name is a
/// configuration error at startup, never at selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceFormula {
    Euclidean,
    Manhattan,
}

impl FromStr for DistanceFormula {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "manhattan" => Ok(Self::Manhattan),
            other => bail!(
                "Invalid distance formula '{other}': expected 'euclidean' or 'manhattan'"
            ),
        }
    }
}

impl fmt::Display for DistanceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Euclidean => write!(f, "euclidean"),
            Self::Manhattan => write!(f, "manhattan"),
        }
    }
}

/// Calculate the distance between two equal-length vectors.
///
/// A length mismatch indicates an upstream data-integrity bug (a partially
/// analyzed track leaking into comparison), so it fails hard instead of
/// returning a sentinel value that could silently rank tracks.
///
/// # Errors
///
/// Returns an error if the vectors differ in dimensionality.
pub fn distance(a: &[f64], b: &[f64], formula: DistanceFormula) -> Result<f64> {
    if a.len() != b.len() {
        bail!(
            "Vector distance requires equal dimensionality: got {} and {}",
            a.len(),
            b.len()
        );
    }

    let total = match formula {
        DistanceFormula::Euclidean => a
            .iter()
            .zip(b)
            .map(|(p, q)| (q - p).powi(2))
            .sum::<f64>()
            .sqrt(),
        DistanceFormula::Manhattan => a.iter().zip(b).map(|(p, q)| (p - q).abs()).sum(),
    };

    Ok(total)
}

/// Absolute difference between two loudness values.
///
/// Loudness is a normalized RMS scalar; an unknown value on either side
/// contributes nothing rather than skewing the combined distance.
#[must_use]
pub fn loudness_distance(a: Option<f64>, b: Option<f64>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs(),
        _ => 0.0,
    }
}

/// The 12 pitch classes, normalized to sharp spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

/// The 12-cycle of keys ordered by ascending fifths. Adjacent keys are
/// harmonically compatible; opposite keys (distance 6) clash the most.
pub const CIRCLE_OF_FIFTHS: [PitchClass; 12] = [
    PitchClass::C,
    PitchClass::G,
    PitchClass::D,
    PitchClass::A,
    PitchClass::E,
    PitchClass::B,
    PitchClass::Fs,
    PitchClass::Cs,
    PitchClass::Gs,
    PitchClass::Ds,
    PitchClass::As,
    PitchClass::F,
];

/// Distance returned when either key is unknown: the diameter of the
/// 12-cycle, i.e. "maximally dissimilar".
pub const MAX_KEY_DISTANCE: f64 = 6.0;

lazy_static! {
    /// Accepted key spellings. Flats are normalized to their sharp
    /// equivalents so tags written by different taggers compare equal.
    static ref KEY_SPELLINGS: HashMap<&'static str, PitchClass> = {
        let mut m = HashMap::new();
        m.insert("C", PitchClass::C);
        m.insert("C#", PitchClass::Cs);
        m.insert("Db", PitchClass::Cs);
        m.insert("D", PitchClass::D);
        m.insert("D#", PitchClass::Ds);
        m.insert("Eb", PitchClass::Ds);
        m.insert("E", PitchClass::E);
        m.insert("F", PitchClass::F);
        m.insert("F#", PitchClass::Fs);
        m.insert("Gb", PitchClass::Fs);
        m.insert("G", PitchClass::G);
        m.insert("G#", PitchClass::Gs);
        m.insert("Ab", PitchClass::Gs);
        m.insert("A", PitchClass::A);
        m.insert("A#", PitchClass::As);
        m.insert("Bb", PitchClass::As);
        m.insert("B", PitchClass::B);
        m
    };
}

impl PitchClass {
    /// Position of this pitch class on [`CIRCLE_OF_FIFTHS`].
    #[must_use]
    pub fn fifths_position(self) -> usize {
        // The cycle is tiny; a linear scan beats maintaining a second table.
        CIRCLE_OF_FIFTHS
            .iter()
            .position(|&pc| pc == self)
            .unwrap_or(0)
    }

    /// Sharp-normalized display name, e.g. `"C#"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::Cs => "C#",
            Self::D => "D",
            Self::Ds => "D#",
            Self::E => "E",
            Self::F => "F",
            Self::Fs => "F#",
            Self::G => "G",
            Self::Gs => "G#",
            Self::A => "A",
            Self::As => "A#",
            Self::B => "B",
        }
    }
}

impl FromStr for PitchClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        KEY_SPELLINGS
            .get(s.trim())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Unrecognized key '{s}'"))
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Circular distance between two keys on the circle of fifths.
///
/// The result is always in `[0, 6]`. An unknown key on either side yields
/// [`MAX_KEY_DISTANCE`] - with no key information the safest assumption is
/// a full clash.
#[must_use]
pub fn circle_of_fifths_distance(a: Option<PitchClass>, b: Option<PitchClass>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return MAX_KEY_DISTANCE;
    };

    let raw = a.fifths_position().abs_diff(b.fifths_position());
    // The cycle wraps at 12, so anything past the diameter folds back.
    let wrapped = if raw > 6 { 12 - raw } else { raw };
    wrapped as f64
}
