//! Track data model.
//!
//! A track carries the metadata the selector scores on: tempo, loudness,
//! key, genre, and a 64-dimensional timbre fingerprint produced by an
//! external feature extractor. Analysis happens outside this tool; tracks
//! arrive here already carrying their features (see `selekta ingest`).

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::vector::PitchClass;

/// Dimensionality of one summary sub-vector: centroid, rolloff, flux and
/// 13 MFCC coefficients.
pub const SUMMARY_DIMS: usize = 16;

/// Dimensionality of the full timbre fingerprint: four concatenated
/// summary sub-vectors.
pub const TIMBRE_DIMS: usize = 64;

/// Progress of a track through the external analysis pipeline.
///
/// Transitions are monotonic (`ToDo` -> `InProgress` -> `Complete`) and
/// driven entirely by the analyzer; the selector only ever reads this.
/// Only `Complete` tracks are eligible for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    ToDo,
    InProgress,
    Complete,
}

impl AnalysisState {
    /// Integer encoding used in the database column.
    #[must_use]
    pub fn to_i64(self) -> i64 {
        match self {
            Self::ToDo => 0,
            Self::InProgress => 1,
            Self::Complete => 2,
        }
    }

    /// Decode the database column. Unknown values are treated as `ToDo`
    /// so a corrupt row can never pass the completeness filter.
    #[must_use]
    pub fn from_i64(v: i64) -> Self {
        match v {
            2 => Self::Complete,
            1 => Self::InProgress,
            _ => Self::ToDo,
        }
    }
}

/// The four statistical aggregations the feature extractor applies to
/// framewise features, in the order they appear in its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    MeanOfMeans,
    MeanOfStdDevs,
    StdDevOfMeans,
    StdDevOfStdDevs,
}

/// One 16-dimensional summary sub-vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimbreSummary {
    pub centroid: f64,
    pub rolloff: f64,
    pub flux: f64,
    pub mfcc: [f64; 13],
}

impl TimbreSummary {
    /// Build a summary from one 16-value slice of extractor output.
    fn from_features(features: &[f64]) -> Self {
        let mut mfcc = [0.0; 13];
        mfcc.copy_from_slice(&features[3..SUMMARY_DIMS]);
        Self {
            centroid: features[0],
            rolloff: features[1],
            flux: features[2],
            mfcc,
        }
    }

    fn extend_flat(&self, out: &mut Vec<f64>) {
        out.push(self.centroid);
        out.push(self.rolloff);
        out.push(self.flux);
        out.extend_from_slice(&self.mfcc);
    }
}

/// The full timbre fingerprint: one summary per [`SummaryType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimbreVector {
    pub mean_of_means: TimbreSummary,
    pub mean_of_stddevs: TimbreSummary,
    pub stddev_of_means: TimbreSummary,
    pub stddev_of_stddevs: TimbreSummary,
}

impl TimbreVector {
    /// Parse the flat 64-value layout emitted by the feature extractor
    /// (summaries in [`SummaryType`] order).
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly [`TIMBRE_DIMS`] values are given.
    pub fn from_flat(values: &[f64]) -> Result<Self> {
        if values.len() != TIMBRE_DIMS {
            bail!(
                "Timbre vector must have exactly {TIMBRE_DIMS} dimensions, got {}",
                values.len()
            );
        }

        Ok(Self {
            mean_of_means: TimbreSummary::from_features(&values[0..16]),
            mean_of_stddevs: TimbreSummary::from_features(&values[16..32]),
            stddev_of_means: TimbreSummary::from_features(&values[32..48]),
            stddev_of_stddevs: TimbreSummary::from_features(&values[48..64]),
        })
    }

    /// Flatten back to the 64-dimensional comparison vector.
    #[must_use]
    pub fn to_flat(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(TIMBRE_DIMS);
        self.mean_of_means.extend_flat(&mut out);
        self.mean_of_stddevs.extend_flat(&mut out);
        self.stddev_of_means.extend_flat(&mut out);
        self.stddev_of_stddevs.extend_flat(&mut out);
        out
    }

    /// Access one summary sub-vector by type.
    #[must_use]
    pub fn summary(&self, kind: SummaryType) -> &TimbreSummary {
        match kind {
            SummaryType::MeanOfMeans => &self.mean_of_means,
            SummaryType::MeanOfStdDevs => &self.mean_of_stddevs,
            SummaryType::StdDevOfMeans => &self.stddev_of_means,
            SummaryType::StdDevOfStdDevs => &self.stddev_of_stddevs,
        }
    }
}

/// One track in the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Stable identifier; used for equality and exclusion, never ordering.
    pub id: i64,
    pub title: String,
    pub artist: String,
    /// Free-form genre tag, equality-compared only.
    pub genre: Option<String>,
    /// Tempo in BPM. `None` means unknown (the analyzer reports 0 when it
    /// cannot estimate a tempo; that is normalized away on ingest).
    pub tempo: Option<u32>,
    /// Normalized RMS loudness.
    pub loudness: Option<f64>,
    pub key: Option<PitchClass>,
    pub analyzed: AnalysisState,
    /// Set once the track has been suggested or played this set.
    pub played: bool,
    pub timbre: Option<TimbreVector>,
}

impl Track {
    /// The flat 64-dimensional comparison vector, available only for
    /// fully-analyzed tracks. A zero-filled stand-in is never produced:
    /// comparing against one would silently rank unanalyzed tracks.
    #[must_use]
    pub fn timbre_64(&self) -> Option<Vec<f64>> {
        if self.analyzed != AnalysisState::Complete {
            return None;
        }
        self.timbre.as_ref().map(TimbreVector::to_flat)
    }

    /// Tempo usable for windowing: known and non-zero.
    #[must_use]
    pub fn usable_tempo(&self) -> Option<u32> {
        self.tempo.filter(|&bpm| bpm > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_vector() -> Vec<f64> {
        (0..64).map(f64::from).collect()
    }

    #[test]
    fn test_timbre_vector_roundtrip() {
        let flat = flat_vector();
        let vector = TimbreVector::from_flat(&flat).unwrap();
        assert_eq!(vector.to_flat(), flat);
    }

    #[test]
    fn test_timbre_vector_layout() {
        let vector = TimbreVector::from_flat(&flat_vector()).unwrap();
        assert_eq!(vector.mean_of_means.centroid, 0.0);
        assert_eq!(vector.mean_of_means.mfcc[12], 15.0);
        assert_eq!(vector.mean_of_stddevs.centroid, 16.0);
        assert_eq!(vector.stddev_of_means.rolloff, 33.0);
        assert_eq!(vector.stddev_of_stddevs.flux, 50.0);
        assert_eq!(
            vector.summary(SummaryType::StdDevOfStdDevs).mfcc[12],
            63.0
        );
    }

    #[test]
    fn test_timbre_vector_rejects_wrong_length() {
        assert!(TimbreVector::from_flat(&[0.0; 16]).is_err());
        assert!(TimbreVector::from_flat(&[0.0; 65]).is_err());
        assert!(TimbreVector::from_flat(&[]).is_err());
    }

    #[test]
    fn test_timbre_64_requires_complete_analysis() {
        let mut track = Track {
            id: 1,
            title: "Test".into(),
            artist: "Test".into(),
            genre: None,
            tempo: Some(128),
            loudness: Some(0.4),
            key: None,
            analyzed: AnalysisState::InProgress,
            played: false,
            timbre: Some(TimbreVector::from_flat(&flat_vector()).unwrap()),
        };

        // Vector present but analysis incomplete: must not be comparable.
        assert!(track.timbre_64().is_none());

        track.analyzed = AnalysisState::Complete;
        assert_eq!(track.timbre_64().unwrap().len(), TIMBRE_DIMS);

        track.timbre = None;
        assert!(track.timbre_64().is_none());
    }

    #[test]
    fn test_analysis_state_encoding() {
        for state in [
            AnalysisState::ToDo,
            AnalysisState::InProgress,
            AnalysisState::Complete,
        ] {
            assert_eq!(AnalysisState::from_i64(state.to_i64()), state);
        }
        // Corrupt values degrade to ToDo, never to Complete.
        assert_eq!(AnalysisState::from_i64(99), AnalysisState::ToDo);
        assert_eq!(AnalysisState::from_i64(-1), AnalysisState::ToDo);
    }

    #[test]
    fn test_usable_tempo_filters_zero() {
        let mut track = Track {
            id: 1,
            title: "T".into(),
            artist: "A".into(),
            genre: None,
            tempo: Some(0),
            loudness: None,
            key: None,
            analyzed: AnalysisState::ToDo,
            played: false,
            timbre: None,
        };
        assert_eq!(track.usable_tempo(), None);
        track.tempo = Some(124);
        assert_eq!(track.usable_tempo(), Some(124));
    }
}
